//! A directory on the real filesystem, seen the way a bundle made from it
//! would see it. Nothing is cached; every call goes to the disk.

use crate::*;

use std::{
    borrow::Cow,
    ffi::OsStr,
    fs,
    io::ErrorKind,
};
use walkdir::{DirEntry, FilterEntry, WalkDir};

pub(crate) struct Disk {
    root: std::path::PathBuf,
}

/// Only names that would survive packing unchanged are visible.
fn is_bundle_name(name: &OsStr) -> bool {
    match name.to_str() {
        Some(name) => matches!(Path::try_from_str(name),
                               Ok(Cow::Borrowed(x)) if !x.is_root()),
        None => false,
    }
}

fn keep(entry: &DirEntry) -> bool {
    entry.depth() == 0 || is_bundle_name(entry.file_name())
}

fn walk_error(error: walkdir::Error) -> Error {
    let path = error.path().map(std::path::Path::to_owned)
        .unwrap_or_default();
    Error::Io { path, source: error.into() }
}

impl Disk {
    pub fn new(root: &std::path::Path) -> Result<Disk> {
        let root = fs::canonicalize(root).map_err(|source| {
            Error::Io { path: root.to_owned(), source }
        })?;
        if !root.is_dir() {
            return Err(Error::InvalidArgument("disk root is not a directory"))
        }
        Ok(Disk { root })
    }
    pub fn root(&self) -> &std::path::Path { &self.root }
    /// Refuses to pass through symlinks, special files or files, so that
    /// only what a walk would find can be found.
    pub fn stat(&self, path: &Path) -> Result<Metadata> {
        let mut full = self.root.clone();
        let mut info = fs::symlink_metadata(&full).map_err(|source| {
            Error::Io { path: full.clone(), source }
        })?;
        for component in path.components() {
            if !info.is_dir() {
                return Err(Error::NotFound(path.to_owned()))
            }
            full.push(component.as_str());
            info = match fs::symlink_metadata(&full) {
                Ok(x) => x,
                Err(x) if x.kind() == ErrorKind::NotFound
                    => return Err(Error::NotFound(path.to_owned())),
                Err(source) => return Err(Error::Io { path: full, source }),
            };
        }
        Metadata::from_real(path.to_owned(), &info)
            .ok_or_else(|| Error::NotFound(path.to_owned()))
    }
    /// Reads a whole file. The returned metadata's size is the size of what
    /// was read, even if the file changed since it was last stat'ed.
    pub fn read(&self, path: &Path) -> Result<(Metadata, Vec<u8>)> {
        let meta = self.stat(path)?;
        if meta.is_dir() {
            return Err(Error::PermissionDenied(path.to_owned()))
        }
        let mut full = self.root.clone();
        for component in path.components() {
            full.push(component.as_str());
        }
        let content = match fs::read(&full) {
            Ok(x) => x,
            Err(x) if x.kind() == ErrorKind::NotFound
                => return Err(Error::NotFound(path.to_owned())),
            Err(source) => return Err(Error::Io { path: full, source }),
        };
        let meta = Metadata::new(path.to_owned(), Kind::File,
                                 content.len() as u64, meta.modified_unix());
        Ok((meta, content))
    }
    /// The children of a directory, in name order.
    pub fn children(&self, dir: &Path) -> Result<Vec<Metadata>> {
        if !self.stat(dir)?.is_dir() {
            return Err(Error::NotDirectory(dir.to_owned()))
        }
        self.walk_from(dir, 1).collect()
    }
    /// `start` and everything beneath it, in the same order as a bundle
    /// walk.
    pub fn walk(&self, start: &Path) -> Result<DiskWalk<'_>> {
        self.stat(start)?;
        Ok(self.walk_from(start, usize::MAX))
    }
    fn walk_from(&self, start: &Path, depth: usize) -> DiskWalk<'_> {
        let mut full = self.root.clone();
        for component in start.components() {
            full.push(component.as_str());
        }
        let min_depth = if depth == 1 { 1 } else { 0 };
        let inner = WalkDir::new(full)
            .follow_links(false)
            .min_depth(min_depth)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(keep as fn(&DirEntry) -> bool);
        DiskWalk { disk: self, inner }
    }
    fn convert(&self, entry: walkdir::Result<DirEntry>)
               -> Result<Option<Metadata>> {
        let entry = entry.map_err(walk_error)?;
        let relative = match entry.path().strip_prefix(&self.root) {
            Ok(x) => x,
            Err(_) => return Ok(None),
        };
        let path = match PathBuf::from_native(relative) {
            Ok(x) => x,
            Err(_) => return Ok(None),
        };
        let info = entry.metadata().map_err(walk_error)?;
        Ok(Metadata::from_real(path, &info))
    }
}

pub(crate) struct DiskWalk<'a> {
    disk: &'a Disk,
    inner: FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
}

impl<'a> Iterator for DiskWalk<'a> {
    type Item = Result<Metadata>;
    fn next(&mut self) -> Option<Result<Metadata>> {
        loop {
            let entry = self.inner.next()?;
            if let Some(x) = self.disk.convert(entry).transpose() {
                return Some(x)
            }
        }
    }
}
