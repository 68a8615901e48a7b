//! Serving a bundle over HTTP.
//!
//! [`FileServer`] is the part that knows about bundles: given a
//! [`Request`], it decides on a [`Response`]. It's a [`Handler`], which is
//! all [`serve`] and [`serve_connection`] need, so it can be wrapped or
//! replaced by anything else that implements [`Handler`]. The server
//! itself is a minimal HTTP/1.1 server on Tokio: one request per
//! connection, no keep-alive, no request bodies.
//!
//! ```no_run
//! # use psilo_bundle::*;
//! # async fn example(fs: VirtualFs) -> std::io::Result<()> {
//! let server = std::sync::Arc::new(fs.serve("site")?);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! serve(listener, server).await
//! # }
//! ```

use crate::*;

use std::{
    fmt,
    fmt::Write as _,
    io,
    sync::Arc,
};
use async_trait::async_trait;
use percent_encoding::{
    AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode,
};
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite,
        AsyncWriteExt, BufReader,
    },
    net::TcpListener,
};

/// Escaped in the links of a directory listing: everything but RFC 3986's
/// unreserved characters.
const PATH_SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Request heads bigger than this are refused.
const MAX_HEAD_LEN: usize = 16 * 1024;

/// The method, target and headers of one HTTP request.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Request {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new<M: Into<String>, T: Into<String>>(method: M, target: T)
                                                 -> Request {
        Request { method: method.into(), target: target.into(),
                  headers: vec![] }
    }
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N,
                                                          value: V)
                                                          -> Request {
        self.headers.push((name.into(), value.into()));
        self
    }
    pub fn method(&self) -> &str { &self.method }
    /// The request target exactly as sent, query string and all.
    pub fn target(&self) -> &str { &self.target }
    /// The target without its query string or fragment. Still
    /// percent-encoded.
    pub fn path(&self) -> &str {
        match self.target.find(|c: char| c == '?' || c == '#') {
            Some(i) => &self.target[..i],
            None => &self.target,
        }
    }
    /// The query string, without its `?`.
    pub fn query(&self) -> Option<&str> {
        let rest = &self.target[self.path().len()..];
        let query = rest.strip_prefix('?')?;
        Some(query.split('#').next().unwrap_or(""))
    }
    /// The first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(x, _)| x.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
}

fn malformed(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

async fn read_head_line<R: AsyncBufRead + Unpin>(reader: &mut R,
                                                  line: &mut String,
                                                  total: &mut usize)
                                                  -> io::Result<usize> {
    let allowance = (MAX_HEAD_LEN - *total) as u64 + 1;
    let amount = (&mut *reader).take(allowance).read_line(line).await?;
    *total += amount;
    if *total > MAX_HEAD_LEN {
        return Err(malformed("request head too large"))
    }
    if amount > 0 && !line.ends_with('\n') {
        return Err(malformed("connection closed mid-line"))
    }
    Ok(amount)
}

/// Reads one request head (request line and headers). Returns `Ok(None)` if
/// the stream ends before anything is sent, and an `InvalidData` error if
/// what's sent isn't HTTP/1.x.
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R)
                                                   -> io::Result<Option<Request>> {
    let mut line = String::new();
    let mut total = 0;
    if read_head_line(reader, &mut line, &mut total).await? == 0 {
        return Ok(None)
    }
    let mut parts = line.trim_end().split(' ');
    let mut request = match (parts.next(), parts.next(), parts.next(),
                             parts.next()) {
        (Some(method), Some(target), Some(version), None)
            if !method.is_empty() && target.starts_with('/')
            && version.starts_with("HTTP/1.")
            => Request::new(method, target),
        _ => return Err(malformed("bad request line")),
    };
    loop {
        line.clear();
        if read_head_line(reader, &mut line, &mut total).await? == 0 {
            return Err(malformed("connection closed mid-head"))
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() { break }
        let (name, value) = header.split_once(':')
            .ok_or_else(|| malformed("bad header line"))?;
        request.headers.push((name.trim().to_string(),
                              value.trim().to_string()));
    }
    Ok(Some(request))
}

/// What follows the head of a response.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from an open file.
    File(FileHandle),
}

impl fmt::Debug for Body {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Body::Empty => write!(fmt, "Body::Empty"),
            Body::Bytes(data) => write!(fmt, "Body::Bytes({} bytes)",
                                        data.len()),
            Body::File(file) => write!(fmt, "Body::File({:?})", file),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response { status, headers: vec![], body: Body::Empty }
    }
    /// A plain text response, such as an error page.
    pub fn text(status: u16, message: &str) -> Response {
        Response::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_header("Content-Length", message.len().to_string())
            .with_body(Body::Bytes(message.as_bytes().to_vec()))
    }
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N,
                                                          value: V)
                                                          -> Response {
        self.headers.push((name.into(), value.into()));
        self
    }
    pub fn with_body(mut self, body: Body) -> Response {
        self.body = body;
        self
    }
    pub fn status(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    /// The first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(x, _)| x.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
    pub fn body(&self) -> &Body { &self.body }
    pub fn into_body(self) -> Body { self.body }
    /// Writes the whole response, then flushes. Always says
    /// `Connection: close`.
    pub async fn write_to<W: AsyncWrite + Unpin>(self, writer: &mut W)
                                                 -> io::Result<()> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status,
                               status_text(self.status));
        for (name, value) in &self.headers {
            // can't fail, writing to a String
            let _ = write!(head, "{}: {}\r\n", name, value);
        }
        head.push_str("Connection: close\r\n\r\n");
        writer.write_all(head.as_bytes()).await?;
        match self.body {
            Body::Empty => (),
            Body::Bytes(data) => writer.write_all(&data).await?,
            Body::File(mut file) => {
                tokio::io::copy(&mut file, writer).await?;
            },
        }
        writer.flush().await
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Something that turns requests into responses.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &Request) -> Response;
}

#[derive(Clone,Debug,PartialEq,Eq)]
pub struct ServeOptions {
    /// Served in place of a directory that contains it.
    pub index_file: Option<String>,
    /// Whether a directory with no index file gets an HTML listing (or
    /// `403 Forbidden`).
    pub list_directories: bool,
}

impl Default for ServeOptions {
    fn default() -> ServeOptions {
        ServeOptions {
            index_file: Some("index.html".to_string()),
            list_directories: true,
        }
    }
}

/// Serves the files under one directory of a [`VirtualFs`].
///
/// - Only `GET` and `HEAD` are allowed.
/// - The request path is percent-decoded and normalized, then looked up
///   relative to the root. A path that's invalid, or that climbs above the
///   bundle root, gets `400 Bad Request`.
/// - A file gets `200 OK` with its content, `Content-Length`,
///   `Content-Type` (guessed from the extension) and `Last-Modified`.
/// - A directory requested without a trailing slash is redirected to the
///   same path with one. Otherwise, it's served as its index file if it has
///   one, as a listing if listings are enabled, or not at all.
/// - A file whose payload is corrupt gets `500 Internal Server Error`. The
///   rest of the bundle is served as usual.
#[derive(Clone,Debug)]
pub struct FileServer {
    fs: VirtualFs,
    root: PathBuf,
    options: ServeOptions,
}

impl FileServer {
    /// Fails if `root` doesn't exist or isn't a directory.
    pub fn new<P: AsRef<str>>(fs: VirtualFs, root: P) -> Result<FileServer> {
        let meta = fs.stat(root)?;
        if !meta.is_dir() {
            return Err(Error::NotDirectory(meta.path().to_owned()))
        }
        Ok(FileServer {
            root: meta.path().to_owned(),
            fs,
            options: ServeOptions::default(),
        })
    }
    pub fn with_options(mut self, options: ServeOptions) -> FileServer {
        self.options = options;
        self
    }
    pub fn root(&self) -> &Path { &self.root }
    pub fn options(&self) -> &ServeOptions { &self.options }
    /// Decides how to answer `request`. [`Handler::handle`] is this plus a
    /// log line.
    pub fn respond(&self, request: &Request) -> Response {
        let head = match request.method() {
            "GET" => false,
            "HEAD" => true,
            _ => return Response::text(405, "method not allowed\n")
                .with_header("Allow", "GET, HEAD"),
        };
        let decoded = percent_decode_str(request.path()).decode_utf8();
        let decoded = match decoded {
            Ok(x) => x,
            Err(_) => return Response::text(400, "bad request\n"),
        };
        let relative = match Path::try_from_str(&decoded) {
            Ok(x) => x,
            Err(_) => return Response::text(400, "bad request\n"),
        };
        let path = self.root.join(&relative);
        let meta = match self.fs.stat(&path) {
            Ok(x) => x,
            Err(x) => return failure(x),
        };
        if !meta.is_dir() {
            return self.serve_file(&meta, head)
        }
        if !decoded.ends_with('/') {
            let mut location = format!("{}/", request.path());
            if let Some(query) = request.query() {
                location.push('?');
                location.push_str(query);
            }
            return Response::text(301, "moved permanently\n")
                .with_header("Location", location)
        }
        let index = self.options.index_file.as_deref()
            .and_then(|x| Path::try_from_str(x).ok())
            .and_then(|x| self.fs.stat(path.join(&x)).ok())
            .filter(Metadata::is_file);
        if let Some(index) = index {
            self.serve_file(&index, head)
        }
        else if self.options.list_directories {
            self.listing(&meta, head)
        }
        else {
            Response::text(403, "forbidden\n")
        }
    }
    fn serve_file(&self, meta: &Metadata, head: bool) -> Response {
        let file = match self.fs.open(meta.path()) {
            Ok(x) => x,
            Err(x) => return failure(x),
        };
        let mut response = Response::new(200)
            .with_header("Content-Type", content_type(meta.path()))
            .with_header("Content-Length", meta.size().to_string());
        if let Some(date) = http_date(meta.modified_unix()) {
            response = response.with_header("Last-Modified", date);
        }
        if head { response } else { response.with_body(Body::File(file)) }
    }
    fn listing(&self, meta: &Metadata, head: bool) -> Response {
        let children = match self.fs.open(meta.path())
            .and_then(|mut dir| dir.readdir(-1)) {
            Ok(x) => x,
            Err(x) => return failure(x),
        };
        let shown = match meta.path().relative_to(&self.root) {
            Some(x) if !x.is_root() => format!("/{}/", x),
            _ => "/".to_string(),
        };
        let mut html = String::new();
        let _ = write!(html, "<!DOCTYPE html>\n<html>\n<head>\n\
                              <meta charset=\"utf-8\">\n\
                              <title>Index of {0}</title>\n</head>\n<body>\n\
                              <h1>Index of {0}</h1>\n<ul>\n",
                       escape_html(&shown));
        if shown != "/" {
            html.push_str("<li><a href=\"../\">../</a></li>\n");
        }
        for child in children {
            let slash = if child.is_dir() { "/" } else { "" };
            let _ = write!(html, "<li><a href=\"{}{}\">{}{}</a></li>\n",
                           utf8_percent_encode(child.name(), PATH_SEGMENT_SET),
                           slash,
                           escape_html(child.name()), slash);
        }
        html.push_str("</ul>\n</body>\n</html>\n");
        let response = Response::new(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_header("Content-Length", html.len().to_string());
        if head { response }
        else { response.with_body(Body::Bytes(html.into_bytes())) }
    }
}

/// The response for an error hit while serving something that exists (or
/// doesn't).
fn failure(error: Error) -> Response {
    match error {
        Error::NotFound(..) | Error::NotDirectory(..)
            => Response::text(404, "not found\n"),
        Error::PermissionDenied(..) => Response::text(403, "forbidden\n"),
        Error::InvalidPath(..) => Response::text(400, "bad request\n"),
        x => {
            log::error!("{}", x);
            Response::text(500, "internal server error\n")
        },
    }
}

#[async_trait]
impl Handler for FileServer {
    async fn handle(&self, request: &Request) -> Response {
        let response = self.respond(request);
        log::debug!("{} {} -> {}", request.method(), request.target(),
                    response.status());
        response
    }
}

impl VirtualFs {
    /// Makes a [`FileServer`] for the given directory of this filesystem.
    pub fn serve<P: AsRef<str>>(&self, root: P) -> Result<FileServer> {
        FileServer::new(self.clone(), root)
    }
}

/// Reads one request from `stream`, answers it and shuts down the write
/// side. A malformed request gets `400 Bad Request`.
pub async fn serve_connection<S, H>(stream: S, handler: &H) -> io::Result<()>
where S: AsyncRead + AsyncWrite + Unpin,
      H: Handler + ?Sized {
    let mut stream = BufReader::new(stream);
    let response = match read_request(&mut stream).await {
        Ok(Some(request)) => handler.handle(&request).await,
        Ok(None) => return Ok(()),
        Err(x) if x.kind() == io::ErrorKind::InvalidData => {
            log::warn!("malformed request: {}", x);
            Response::text(400, "bad request\n")
        },
        Err(x) => return Err(x),
    };
    response.write_to(&mut stream).await?;
    stream.shutdown().await
}

/// Accepts connections forever, answering each on its own task. Only
/// returns if accepting fails.
pub async fn serve<H: Handler + 'static>(listener: TcpListener,
                                         handler: Arc<H>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(x) = serve_connection(stream, &*handler).await {
                log::debug!("{}: {}", peer, x);
            }
        });
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn content_type(path: &Path) -> &'static str {
    let extension = match path.extension() {
        Some(x) => x.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" | "md" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// RFC 9110 IMF-fixdate.
fn http_date(secs: i64) -> Option<String> {
    let date = chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)?;
    Some(date.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
