//! This crate packs a tree of files into a single compressed blob, which you
//! can embed in your executable, and reads it back at runtime as a
//! read-only virtual filesystem. It's a sibling of Psilo-VFS, and uses the
//! same rules for paths, but it doesn't depend on it (or on any other part
//! of the Psilo engine).
//!
//! Psilo-Bundle tries really hard to be portable and platform-agnostic, but
//! it does require `std`.
//!
//! # Overview
//!
//! At build time (in a build script, a separate tool, or a test), collect
//! [`Entry`]s for the files and directories you want to ship, and [`pack`]
//! them (or let a [`Packer`] do the collecting). Every file is compressed
//! on its own, so opening one file never costs you the rest.
//!
//! At runtime, [`load`] the bundle once and keep the resulting
//! [`VirtualFs`] around:
//!
//! ```rust,ignore
//! use once_cell::sync::Lazy;
//! use psilo_bundle::{VirtualFs, load};
//! static ASSETS: Lazy<VirtualFs> = Lazy::new(|| {
//!     load(&include_bytes!(concat!(env!("OUT_DIR"), "/assets.bundle"))[..])
//! });
//! ```
//!
//! Loading only reads the bundle's index. Each file is inflated the first
//! time it's opened, and kept around for every later open, from any thread.
//!
//! [`VirtualFs::open`] gives you a [`FileHandle`], which works like a file
//! handle on a real, read-only filesystem: it reads, seeks, lists
//! directories and fails in the same ways. It also implements
//! `std::io::{Read, Seek}` and Tokio's `AsyncRead` and `AsyncSeek`.
//!
//! With the `http` feature (on by default), `FileServer` serves a
//! directory of the bundle as static files over HTTP.
//!
//! While developing, `VirtualFs::from_disk` gives you the same interface on
//! top of a directory on disk, so you can edit files without repacking.
//!
//! ## Paths
//!
//! Paths inside a bundle are [`Path`]s and [`PathBuf`]s from this crate, not
//! from the standard library. They are always relative to the root of the
//! bundle and always use `/` as a separator. Names are kept exactly as they
//! were spelled on disk. See the [`Path`] documentation for the whole story.
//!
//! Where an operation takes a path as a plain string, it is normalized
//! first, so `"/index.html"`, `"./index.html"` and `"index.html"` are the
//! same file.
//!
//! ## Features
//!
//! - `fs` (default): `Entry::from_real_path` and `Packer::add_real_path`,
//!   which read entries from the real filesystem, and
//!   `VirtualFs::from_disk`.
//! - `http` (default): `FileServer`, `serve` and the rest of the HTTP
//!   adapter. Pulls in Tokio's networking.

/// Specifies a constant, literal path. Give it a string literal and it will
/// validate it and give you a [`&'static Path`](struct.Path.html), with no
/// runtime overhead.
///
/// ```rust
/// # use psilo_bundle::{Path, p};
/// const SPLASH_PATH: &Path = p!("splash/StartupScreen.png");
/// ```
///
/// Anywhere you're hardcoding a path (or part of a path) in your code, you
/// should use `p!()` to denote it. If you've made some mistake in your path
/// that makes it invalid, this catches it at compile time instead of runtime.
/// And, if canonicalization is needed, this peforms it ahead of time. Nice!
///
/// The sole argument must be a single string literal. If you want to build a
/// path at runtime, just use [`Path`](struct.Path.html) or
/// [`PathBuf`](struct.PathBuf.html) methods as appropriate.
pub use psilo_bundle_pathmacro::p;

// lets `p!` name this crate from inside it, too
extern crate self as psilo_bundle;

mod path;
pub use path::{Path, PathBuf, PathComponents, PathFromStrError};

mod error;
pub use error::{Error, Result};

mod entry;
pub use entry::{Entry, Kind, Metadata, Mode};

mod codec;
pub use codec::{Quality, MAGIC, VERSION};

mod pack;
pub use pack::{Packer, load, pack, try_load};

mod vfs;
pub use vfs::{VirtualFs, Walk};

#[cfg(feature = "fs")]
mod disk;

mod handle;
pub use handle::{FileHandle, Whence};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{
    Body, FileServer, Handler, Request, Response, ServeOptions,
    read_request, serve, serve_connection,
};
