use std::{
    error::Error,
    fmt::{Display, Formatter},
};
use proc_macro::TokenStream;
use syn::{parse_macro_input, LitStr};
use once_cell::sync::Lazy;
use regex::Regex;
use quote::quote;

// Same rules as `Path::try_from_str` in the main crate. A proc-macro crate
// can't depend on the crate it generates code for, so they live here twice.
#[derive(Debug,PartialEq,Eq)]
enum PathFromStrError {
    DoubleSlash,
    InvalidChar,
    EscapedRoot,
}

impl Display for PathFromStrError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
	match *self {
	    PathFromStrError::DoubleSlash
		=> write!(fmt, "double slash in path"),
	    PathFromStrError::InvalidChar
		=> write!(fmt, "invalid char in path"),
	    PathFromStrError::EscapedRoot
		=> write!(fmt, "path tried to denote root's parent (too many \
				\"..\")"),
	}
    }
}

impl Error for PathFromStrError {}

static INVALID_PATH_CHAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\x00-\x1F\x7F\u{0080}-\u{009F}]"#)
	.unwrap()
});

fn canonical(s: &str) -> Result<String, PathFromStrError> {
    let s = s.replace('\\', "/");
    if s == "" || s == "/" || s == "." {
	return Ok(String::new())
    }
    let subset = s.strip_prefix('/').unwrap_or(&s);
    let subset = subset.strip_suffix('/').unwrap_or(subset);
    // `s.len()` will usually be exactly enough
    let mut ret = String::with_capacity(s.len());
    for component in subset.split('/') {
	if component == "" {
	    return Err(PathFromStrError::DoubleSlash)
	}
	else if component == "." { continue }
	else if component == ".." {
	    if ret == "" {
		return Err(PathFromStrError::EscapedRoot)
	    }
	    let cut = ret.rfind('/').unwrap_or(0);
	    ret.truncate(cut);
	}
	else if INVALID_PATH_CHAR_PATTERN.is_match(component) {
	    return Err(PathFromStrError::InvalidChar)
	}
	else {
	    if ret.len() > 0 { ret.push('/') }
	    ret.push_str(component);
	}
    }
    Ok(ret)
}

#[proc_macro]
pub fn p(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as LitStr);
    let value = match canonical(&input.value()) {
	Ok(x) => x,
	Err(x) => {
	    return proc_macro::TokenStream::from(syn::parse::Error::new_spanned(input, x.to_string()).to_compile_error())
	},
    };
    (quote!{
	::psilo_bundle::Path::from_str_preverified(#value)
    }).into()
}
