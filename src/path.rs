use std::{
    borrow::{Borrow, Cow},
    fmt::{Debug, Display, Formatter},
    ops::Deref,
    path::Component,
    str,
};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use unicode_normalization::{
    IsNormalized,
    UnicodeNormalization,
    is_nfd_quick,
};

#[derive(Debug,PartialEq,Eq,Clone,Copy,Error)]
pub enum PathFromStrError {
    /// There were two or more consecutive slashes in the path.
    #[error("double slash in path")]
    DoubleSlash,
    /// You used a control character in a name.
    #[error("invalid char in path")]
    InvalidChar,
    /// Your path tried to escape the root directory with ".."
    #[error("path tried to denote root's parent (too many \"..\")")]
    EscapedRoot,
    /// A native path contained something that wasn't valid UTF-8.
    #[error("path is not valid Unicode")]
    NotUnicode,
    /// A native path had a root or a drive prefix where a relative path was
    /// needed.
    #[error("path is not relative")]
    NotRelative,
}

static INVALID_PATH_CHAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\x00-\x1F\x7F\u{0080}-\u{009F}]"#)
	.unwrap()
});

/// Analogous to the `Path` struct in the standard library, this is a
/// non-owned slice over a bundle path.
///
/// # Canonical form
///
/// - A path is zero or more components separated by `/`.
/// - Every path is relative to the root of the bundle. The root itself is
///   the empty path.
/// - There is no leading or trailing `/`, and no component is empty, `.` or
///   `..`.
/// - No component contains a C0 or C1 control character, or DEL.
///
/// Whether a path denotes a file or a directory is *not* part of the path.
/// That's recorded in the bundle, next to the path.
///
/// [`Path::try_from_str`] accepts a little more than that and normalizes it
/// away: `\` is treated as `/` (so paths collected on Windows come out the
/// same as everywhere else), a leading or trailing `/` is dropped, `.`
/// components vanish and `..` components eat their predecessor. A `..` that
/// would climb above the root is an error; bundles have no outside.
///
/// Names are kept exactly as they were spelled, code point for code point.
/// "resumé" written with six code points and "resumé" written with seven are
/// different paths, just as they are different names on most real
/// filesystems. [`Path::spelling_key`] folds that difference away for
/// lookups that want it. No case folding takes place.
#[repr(transparent)]
#[derive(PartialEq,Eq,PartialOrd,Ord,Hash)]
pub struct Path {
    inner: str
}

impl Path {
    /// Internal use only. Takes a `&str` and transmutes it into a `&Path`,
    /// without rechecking.
    ///
    /// Used by the `p!` macro.
    #[doc(hidden)]
    pub const fn from_str_preverified(s: &str) -> &Path {
	// This is `unsafe`, but sound. It's sound because `Path` is a
	// transparent wrapper around `str`.
	unsafe { std::mem::transmute(s) }
    }
    /// The root of the bundle, the empty path.
    pub const fn root() -> &'static Path {
	Path::from_str_preverified("")
    }
    /// Creates a new `Path` or `PathBuf` from a `&str`. If the passed string
    /// is already canonical, no copying will take place. Panics if the passed
    /// path is invalid in any way. Convenient, but fragile.
    pub fn from_str(s: &str) -> Cow<'_, Path> {
	Path::try_from_str(s).expect("Invalid path")
    }
    /// Creates a new `Path` or `PathBuf` from a `&str`. If the passed string
    /// is already canonical, no copying will take place. Returns an error if
    /// the passed path is invalid in any way.
    pub fn try_from_str(s: &str) -> Result<Cow<'_, Path>, PathFromStrError> {
	if s == "" || s == "/" || s == "." {
	    return Ok(Cow::Borrowed(Path::root()))
	}
	let subset = s.strip_prefix('/').unwrap_or(s);
	let subset = subset.strip_suffix('/').unwrap_or(subset);
	// First, check that all components are valid.
	let mut need_edit = subset.len() != s.len() || s.contains('\\');
	for component in subset.split(is_separator) {
	    if component == "" {
		return Err(PathFromStrError::DoubleSlash)
	    }
	    else if component == "." || component == ".." {
		need_edit = true;
	    }
	    else if INVALID_PATH_CHAR_PATTERN.is_match(component) {
		return Err(PathFromStrError::InvalidChar)
	    }
	}
	if !need_edit {
	    return Ok(Cow::Borrowed(Path::from_str_preverified(s)))
	}
	let mut ret = String::with_capacity(s.len());
	for component in subset.split(is_separator) {
	    if component == "." { continue }
	    if component == ".." {
		if ret == "" {
		    return Err(PathFromStrError::EscapedRoot)
		}
		let cut = ret.rfind('/').unwrap_or(0);
		ret.truncate(cut);
	    }
	    else {
		if ret.len() > 0 { ret.push('/') }
		ret.push_str(component);
	    }
	}
	if ret == "" {
	    Ok(Cow::Borrowed(Path::root()))
	}
	else {
	    Ok(Cow::Owned(PathBuf { inner: ret }))
	}
    }
    /// Returns the path as a `&str`.
    pub fn as_str(&self) -> &str { &self.inner }
    /// Returns true if this is the root of the bundle (the empty path).
    pub fn is_root(&self) -> bool { self.inner.is_empty() }
    /// Returns the components of this path. The root has no components.
    pub fn components(&self) -> PathComponents<'_> {
	if self.is_root() {
	    let mut iter = self.inner.split('/');
	    iter.next();
	    PathComponents::new(iter)
	}
	else { PathComponents::new(self.inner.split('/')) }
    }
    /// Returns the path to the directory containing this path, or `None` if
    /// this is the root.
    pub fn parent(&self) -> Option<&Path> {
	if self.is_root() { return None }
	Some(match self.inner.rfind('/') {
	    Some(i) => Path::from_str_preverified(&self.inner[..i]),
	    None => Path::root(),
	})
    }
    /// Returns the last component of the path. The root's name is empty.
    pub fn file_name(&self) -> &str {
	self.inner.rsplit('/').next().unwrap_or("")
    }
    /// Returns `Some(...)` if the last component of this `Path` has a "dot
    /// extension", `None` if it does not. If multiple extensions are present,
    /// only the *last* is returned. A leading dot (as in `.gitignore`) does
    /// not start an extension.
    pub fn extension(&self) -> Option<&str> {
	match self.file_name().rsplit_once('.') {
	    Some((stem, ext)) if stem != "" => Some(ext),
	    _ => None,
	}
    }
    /// If `base` is this path or one of its ancestors, returns the rest of
    /// this path relative to `base`. For example:
    ///
    /// ```
    /// # use psilo_bundle::p;
    /// assert_eq!(p!("foo/bar/baz").relative_to(p!("foo")),
    ///            Some(p!("bar/baz")));
    /// assert_eq!(p!("foobar").relative_to(p!("foo")), None);
    /// ```
    pub fn relative_to(&self, base: &Path) -> Option<&Path> {
	if base.is_root() { return Some(self) }
	match self.inner.strip_prefix(&base.inner) {
	    Some("") => Some(Path::root()),
	    Some(x) => x.strip_prefix('/').map(Path::from_str_preverified),
	    None => None,
	}
    }
    /// This path in Unicode normal form D. Two paths that differ only in how
    /// their accents are composed have the same spelling key. Borrows if the
    /// path is already in form D.
    pub fn spelling_key(&self) -> Cow<'_, str> {
	if is_nfd_quick(self.inner.chars()) == IsNormalized::Yes {
	    Cow::Borrowed(&self.inner)
	}
	else { Cow::Owned(self.inner.nfd().collect()) }
    }
    /// Makes a new `PathBuf` out of this path with `moar` appended.
    pub fn join(&self, moar: &Path) -> PathBuf {
	let mut ret = self.to_owned();
	ret.push(moar);
	ret
    }
}

fn is_separator(c: char) -> bool { c == '/' || c == '\\' }

impl Display for Path {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
	// control characters are forbidden in paths, so we can just print the
	// path out and have no ambiguity.
	Display::fmt(&self.inner, fmt)
    }
}

impl Debug for Path {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
	write!(fmt, "\"{}\"", &self.inner)
    }
}

impl<'a> From<&'a Path> for &'a str {
    fn from(x: &Path) -> &str { &x.inner }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str { &self.inner }
}

impl ToOwned for Path {
    type Owned = PathBuf;
    fn to_owned(&self) -> PathBuf {
	PathBuf { inner: self.inner.to_string() }
    }
}

impl Deref for Path {
    type Target = str;
    fn deref(&self) -> &str {
        &self.inner
    }
}

impl PartialEq<str> for Path {
    fn eq(&self, other: &str) -> bool {
        &self.inner == other
    }
}

impl PartialEq<&str> for Path {
    fn eq(&self, other: &&str) -> bool {
        &self.inner == *other
    }
}

/// An iterator over the components of a `Path`.
pub struct PathComponents<'a> {
    inner: str::Split<'a, char>,
}

impl<'a> PathComponents<'a> {
    fn new(inner: str::Split<'a, char>) -> PathComponents<'a> {
        PathComponents { inner }
    }
}

impl<'a> Iterator for PathComponents<'a> {
    type Item = &'a Path;
    fn next(&mut self) -> Option<&'a Path> {
        self.inner.next().map(Path::from_str_preverified)
    }
}

impl<'a> DoubleEndedIterator for PathComponents<'a> {
    fn next_back(&mut self) -> Option<&'a Path> {
        self.inner.next_back().map(Path::from_str_preverified)
    }
}

/// Analogous to the `PathBuf` struct in the standard library, this is an
/// owned bundle path on the heap.
///
/// See [`Path`](struct.Path.html) for more information on how bundle paths
/// work, and what restrictions they have.
#[repr(transparent)]
#[derive(PartialEq,Eq,PartialOrd,Ord,Hash,Clone,Default)]
pub struct PathBuf {
    inner: String
}

impl PathBuf {
    /// Creates a new `PathBuf` pointing at the root.
    pub fn new() -> PathBuf {
	PathBuf { inner: String::new() }
    }
    /// Creates a new `PathBuf` from a `&str`. Panics if the passed path is
    /// invalid in any way. Convenient, but fragile.
    pub fn from_str(s: &str) -> PathBuf {
	PathBuf::try_from_str(s).expect("Invalid path")
    }
    /// Creates a new `PathBuf` from a `&str`. Returns an error if the passed
    /// path is invalid in any way.
    pub fn try_from_str(s: &str) -> Result<PathBuf, PathFromStrError> {
	Path::try_from_str(s).map(Cow::into_owned)
    }
    /// Converts a relative path from the standard library into a bundle
    /// path, one component at a time. `..` is resolved lexically.
    pub fn from_native(native: &std::path::Path)
		       -> Result<PathBuf, PathFromStrError> {
	let mut ret = PathBuf::new();
	for component in native.components() {
	    match component {
		Component::CurDir => (),
		Component::ParentDir => {
		    if !ret.pop() {
			return Err(PathFromStrError::EscapedRoot)
		    }
		},
		Component::Normal(x) => {
		    let x = x.to_str().ok_or(PathFromStrError::NotUnicode)?;
		    ret.push(&Path::try_from_str(x)?);
		},
		Component::RootDir | Component::Prefix(..) =>
		    return Err(PathFromStrError::NotRelative),
	    }
	}
	Ok(ret)
    }
    /// Borrows this `PathBuf`'s contents as a `&Path`.
    pub fn as_path(&self) -> &Path {
	self.as_ref()
    }
    /// Appends `moar` to this path. Both are canonical, so this can't fail.
    pub fn push(&mut self, moar: &Path) -> &mut Self {
	if moar.is_root() { return self }
	if !self.is_root() { self.inner.push('/') }
	self.inner.push_str(&moar.inner);
	self
    }
    /// Removes the innermost component of the path. Returns true if there was
    /// a component to remove, false if this was already the root.
    pub fn pop(&mut self) -> bool {
	if self.inner == "" { return false }
	let cut = self.inner.rfind('/').unwrap_or(0);
	self.inner.truncate(cut);
	true
    }
    /// Invokes `shrink_to_fit` on the internal `String`.
    pub fn shrink_to_fit(&mut self) { self.inner.shrink_to_fit() }
}

impl Borrow<Path> for PathBuf {
    fn borrow(&self) -> &Path {
	Path::from_str_preverified(self.inner.as_str())
    }
}

impl AsRef<Path> for PathBuf {
    fn as_ref(&self) -> &Path {
	self.borrow()
    }
}

impl AsRef<str> for PathBuf {
    fn as_ref(&self) -> &str {
	self.inner.as_str()
    }
}

impl Deref for PathBuf {
    type Target = Path;
    fn deref(&self) -> &Path {
	self.as_ref()
    }
}

impl Display for PathBuf {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
	Display::fmt(self.as_path(), fmt)
    }
}

impl Debug for PathBuf {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
	Debug::fmt(self.as_path(), fmt)
    }
}

impl PartialEq<str> for PathBuf {
    fn eq(&self, other: &str) -> bool {
        self.inner == other
    }
}

impl PartialEq<&str> for PathBuf {
    fn eq(&self, other: &&str) -> bool {
        self.inner == *other
    }
}

#[cfg(test)]
mod test {
    use super::*;
    fn is_borrowed(wat: &Cow<Path>) -> bool {
	match wat {
	    &Cow::Borrowed(_) => true,
	    _ => false,
	}
    }
    #[test] fn components() {
	assert_eq!(Path::from_str_preverified("foo/bar/baz").components()
		   .collect::<Vec<_>>(),
		   &["foo", "bar", "baz"]);
	assert_eq!(Path::root().components().count(), 0);
	assert_eq!(Path::from_str_preverified("x").components()
		   .rev().collect::<Vec<_>>(),
		   &["x"]);
    }
    #[test] fn normalize_good() {
	const PAIRS_TO_CHECK: &[(&str, &str)] = &[
	    ("foo/./bar", "foo/bar"),
	    ("foo/../bar", "bar"),
	    ("/foo/./bar", "foo/bar"),
	    ("/foo/../bar", "bar"),
	    ("./testdata", "testdata"),
	    ("testdata/", "testdata"),
	    ("testdata\\html\\index.html", "testdata/html/index.html"),
	    ("a/..", ""),
	    ("/", ""),
	    (".", ""),
	    ("tesuto/COM0", "tesuto/COM0"),
	    (".gitignore", ".gitignore"),
	];
	for (big, small) in PAIRS_TO_CHECK.iter() {
	    assert_eq!(&Path::from_str(big).inner, *small, "{:?}", big);
	}
    }
    #[test] fn normalize_bad() {
	const PAIRS_TO_CHECK: &[(&str, PathFromStrError)] = &[
	    ("foo/../../bar", PathFromStrError::EscapedRoot),
	    ("../bar", PathFromStrError::EscapedRoot),
	    ("foo//bar", PathFromStrError::DoubleSlash),
	    ("//", PathFromStrError::DoubleSlash),
	    ("asdf/tab\there", PathFromStrError::InvalidChar),
	    ("nul\0byte", PathFromStrError::InvalidChar),
	];
	for (big, small) in PAIRS_TO_CHECK.iter() {
	    match Path::try_from_str(big) {
		Ok(x) => panic!("try_from_str on {:?} should fail, got {:?}",
				big, x),
		Err(x) => {
		    if x != *small {
			panic!("try_from_str on {:?} should fail with {:?}, \
				got {:?} instead", big, small, x);
		    }
		},
	    }
	}
    }
    #[test] fn copies_vs_keeps() {
	const PATHS_TO_CHECK: &[(&str, bool)] = &[
	    ("asdf", true),
	    ("asdf/truth", true),
	    ("", true),
	    ("/", true),
	    ("/asdf", false),
	    ("asdf/../foxes", false),
	    ("resume\u{0301}", true),
	    ("resum\u{00e9}", true),
	    ("win\\dows", false),
	];
	for (src, kept) in PATHS_TO_CHECK.iter() {
	    let result = Path::from_str(src);
	    if is_borrowed(&result) != *kept {
		if *kept {
		    panic!("{:?} is supposed to be borrowed but is copied.",
			   src);
		}
		else {
		    panic!("{:?} is supposed to be copied but is borrowed.",
			   src);
		}
	    }
	}
    }
    #[test] fn accent() {
	let composed = Path::from_str("resum\u{00e9}");
	let decomposed = Path::from_str("resume\u{0301}");
	// spelled as given
	assert_eq!(composed.as_str(), "resum\u{00e9}");
	assert_ne!(composed, decomposed);
	assert_eq!(composed.spelling_key(), decomposed.spelling_key());
	assert!(matches!(decomposed.spelling_key(), Cow::Borrowed(_)));
	assert_eq!(Path::from_str("/caf\u{00e9}\\men\u{00fc}.txt").as_str(),
		   "caf\u{00e9}/men\u{00fc}.txt");
    }
    #[test] fn family() {
	let p = Path::from_str("testdata/html/page.min.js");
	assert_eq!(p.file_name(), "page.min.js");
	assert_eq!(p.extension(), Some("js"));
	assert_eq!(p.parent().unwrap(), "testdata/html");
	assert_eq!(p.parent().unwrap().parent().unwrap(), "testdata");
	assert!(p.parent().unwrap().parent().unwrap().parent().unwrap()
		.is_root());
	assert_eq!(Path::root().parent(), None);
	assert_eq!(Path::from_str(".gitignore").extension(), None);
	assert_eq!(Path::from_str("Makefile").extension(), None);
    }
    #[test] fn relative_to() {
	let p = Path::from_str("testdata/html/index.html");
	assert_eq!(p.relative_to(&Path::from_str("testdata")).unwrap(),
		   "html/index.html");
	assert_eq!(p.relative_to(Path::root()).unwrap(), &*p);
	assert!(p.relative_to(&p).unwrap().is_root());
	assert_eq!(p.relative_to(&Path::from_str("test")), None);
	assert_eq!(p.relative_to(&Path::from_str("testdata/html/index")),
		   None);
    }
    #[test] fn push_and_pop() {
	let mut buf = PathBuf::new();
	buf.push(&Path::from_str("testdata"));
	buf.push(Path::root());
	buf.push(&Path::from_str("html/index.html"));
	assert_eq!(buf, "testdata/html/index.html");
	assert!(buf.pop());
	assert_eq!(buf, "testdata/html");
	assert!(buf.pop());
	assert!(buf.pop());
	assert!(buf.is_root());
	assert!(!buf.pop());
    }
    #[test] fn native() {
	let native = std::path::Path::new("testdata/./html/../index.html");
	assert_eq!(PathBuf::from_native(native).unwrap(),
		   "testdata/index.html");
	assert_eq!(PathBuf::from_native(std::path::Path::new("../x")),
		   Err(PathFromStrError::EscapedRoot));
	assert_eq!(PathBuf::from_native(std::path::Path::new("/abs")),
		   Err(PathFromStrError::NotRelative));
	assert_eq!(PathBuf::from_native(std::path::Path::new("t/\u{e9}.txt"))
		   .unwrap(), "t/\u{e9}.txt");
    }
}
