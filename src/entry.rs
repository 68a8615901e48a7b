use crate::*;

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Whether an entry is a regular file or a directory. Nothing else can be
/// packed.
#[derive(Clone,Copy,Debug,PartialEq,Eq,Hash)]
pub enum Kind {
    File,
    Directory,
}

/// Unix-style mode bits. Everything in a bundle is read-only.
#[derive(Clone,Copy,PartialEq,Eq,Hash)]
pub struct Mode(u32);

impl Mode {
    /// A read-only regular file.
    pub const FILE: Mode = Mode(0o100444);
    /// A read-only (but listable) directory.
    pub const DIRECTORY: Mode = Mode(0o040555);
    pub fn bits(self) -> u32 { self.0 }
    pub fn permissions(self) -> u32 { self.0 & 0o777 }
    pub fn is_dir(self) -> bool { self.0 & 0o170000 == 0o040000 }
}

impl fmt::Display for Mode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(if self.is_dir() { "d" } else { "-" })?;
        for shift in [6, 3, 0] {
            let bits = (self.0 >> shift) & 7;
            write!(fmt, "{}{}{}",
                   if bits & 4 != 0 { 'r' } else { '-' },
                   if bits & 2 != 0 { 'w' } else { '-' },
                   if bits & 1 != 0 { 'x' } else { '-' })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Mode({:o} {})", self.0, self)
    }
}

/// What you'd get from `stat`: everything about an entry except its
/// content.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Metadata {
    path: PathBuf,
    kind: Kind,
    size: u64,
    mod_time: i64,
}

impl Metadata {
    pub(crate) fn new(path: PathBuf, kind: Kind, size: u64, mod_time: i64)
                      -> Metadata {
        Metadata { path, kind, size, mod_time }
    }
    pub fn path(&self) -> &Path { &self.path }
    /// The last component of the path.
    pub fn name(&self) -> &str { self.path.file_name() }
    pub fn kind(&self) -> Kind { self.kind }
    /// Length of the uncompressed content. Always 0 for directories.
    pub fn size(&self) -> u64 { self.size }
    pub fn mode(&self) -> Mode {
        match self.kind {
            Kind::File => Mode::FILE,
            Kind::Directory => Mode::DIRECTORY,
        }
    }
    pub fn is_dir(&self) -> bool { self.kind == Kind::Directory }
    pub fn is_file(&self) -> bool { self.kind == Kind::File }
    /// Modification time, in whole seconds since the Unix epoch.
    pub fn modified_unix(&self) -> i64 { self.mod_time }
    pub fn mod_time(&self) -> SystemTime { unix_to_system_time(self.mod_time) }
    /// `None` for anything but a regular file or a directory.
    #[cfg(feature = "fs")]
    pub(crate) fn from_real(path: PathBuf, info: &std::fs::Metadata)
                            -> Option<Metadata> {
        let mod_time = info.modified().map(system_time_to_unix).unwrap_or(0);
        if info.is_dir() {
            Some(Metadata::new(path, Kind::Directory, 0, mod_time))
        }
        else if info.is_file() {
            Some(Metadata::new(path, Kind::File, info.len(), mod_time))
        }
        else { None }
    }
}

pub(crate) fn unix_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    }
    else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Truncates to whole seconds, rounding toward the past.
#[cfg_attr(not(feature = "fs"), allow(dead_code))]
pub(crate) fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(x) => i64::try_from(x.as_secs()).unwrap_or(i64::MAX),
        Err(x) => {
            let before = x.duration();
            let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            if before.subsec_nanos() > 0 { -secs - 1 } else { -secs }
        },
    }
}

/// One file or directory, ready to be packed.
///
/// A file always has content (possibly empty) and a directory never does.
/// The constructors are the only way to make an `Entry`, so that can't go
/// wrong.
#[derive(Clone,PartialEq,Eq)]
pub struct Entry {
    meta: Metadata,
    content: Option<Vec<u8>>,
}

impl Entry {
    pub fn file(path: PathBuf, mod_time: i64, content: Vec<u8>) -> Entry {
        Entry {
            meta: Metadata::new(path, Kind::File, content.len() as u64,
                                mod_time),
            content: Some(content),
        }
    }
    pub fn directory(path: PathBuf, mod_time: i64) -> Entry {
        Entry {
            meta: Metadata::new(path, Kind::Directory, 0, mod_time),
            content: None,
        }
    }
    /// Makes an entry out of a file or directory on the real filesystem.
    ///
    /// `path` is resolved against `root` if it's relative, and the entry's
    /// bundle path is its location relative to `root`. Pass the same `root`
    /// for every entry of a bundle and the bundle won't care where on disk
    /// (or on which OS) it was built.
    ///
    /// Symlinks are not followed, and are refused along with every other
    /// kind of special file.
    #[cfg(feature = "fs")]
    pub fn from_real_path(root: &std::path::Path, path: &std::path::Path)
                          -> Result<Entry> {
        use std::{fs, io::ErrorKind};
        let io_error = |path: &std::path::Path| {
            let path = path.to_owned();
            move |source| Error::Io { path, source }
        };
        let root = std::path::absolute(root).map_err(io_error(root))?;
        let full = root.join(path);
        let relative = full.strip_prefix(&root).map_err(|_| {
            Error::InvalidArgument("path is outside the packing root")
        })?;
        let bundle_path = PathBuf::from_native(relative)?;
        if bundle_path.is_root() {
            return Err(Error::InvalidArgument("the packing root can't be \
                                               an entry of its own bundle"))
        }
        let info = match fs::symlink_metadata(&full) {
            Ok(x) => x,
            Err(x) if x.kind() == ErrorKind::NotFound
                => return Err(Error::NotFound(bundle_path)),
            Err(x) => return Err(io_error(&full)(x)),
        };
        let meta = Metadata::from_real(bundle_path, &info).ok_or(
            Error::InvalidArgument("only regular files and directories can \
                                    be packed"))?;
        if meta.is_dir() {
            return Ok(Entry { meta, content: None })
        }
        let content = fs::read(&full).map_err(io_error(&full))?;
        Ok(Entry::file(meta.path, meta.mod_time, content))
    }
    pub fn metadata(&self) -> &Metadata { &self.meta }
    pub fn path(&self) -> &Path { self.meta.path() }
    pub fn name(&self) -> &str { self.meta.name() }
    pub fn kind(&self) -> Kind { self.meta.kind() }
    pub fn size(&self) -> u64 { self.meta.size() }
    pub fn is_dir(&self) -> bool { self.meta.is_dir() }
    pub fn modified_unix(&self) -> i64 { self.meta.modified_unix() }
    /// `None` for directories.
    pub fn content(&self) -> Option<&[u8]> { self.content.as_deref() }
}

impl fmt::Debug for Entry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.content {
            Some(data) => write!(fmt, "Entry::File({:?}, {} bytes)",
                                 self.meta.path, data.len()),
            None => write!(fmt, "Entry::Directory({:?})", self.meta.path),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test] fn modes() {
        assert!(Mode::DIRECTORY.is_dir());
        assert!(!Mode::FILE.is_dir());
        assert_eq!(Mode::FILE.permissions(), 0o444);
        assert_eq!(Mode::FILE.to_string(), "-r--r--r--");
        assert_eq!(Mode::DIRECTORY.to_string(), "dr-xr-xr-x");
    }
    #[test] fn kind_follows_content() {
        let file = Entry::file(PathBuf::from_str("a/b.txt"), 7, vec![]);
        assert!(!file.is_dir());
        assert_eq!(file.content(), Some(&[][..]));
        assert_eq!(file.metadata().mode(), Mode::FILE);
        let dir = Entry::directory(PathBuf::from_str("a"), 7);
        assert!(dir.is_dir());
        assert_eq!(dir.content(), None);
        assert_eq!(dir.size(), 0);
        assert_eq!(dir.name(), "a");
    }
    #[test] fn times() {
        for secs in [0, 1, 1_600_000_000, -1, -86_400] {
            assert_eq!(system_time_to_unix(unix_to_system_time(secs)), secs);
        }
        let just_before = UNIX_EPOCH - Duration::from_millis(500);
        assert_eq!(system_time_to_unix(just_before), -1);
    }
    #[cfg(feature = "fs")]
    #[test] fn real_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/hello.txt"), b"hello").unwrap();
        let entry = Entry::from_real_path(dir.path(),
                                          "sub/hello.txt".as_ref()).unwrap();
        assert_eq!(entry.path(), "sub/hello.txt");
        assert_eq!(entry.name(), "hello.txt");
        assert_eq!(entry.content(), Some(&b"hello"[..]));
        assert_eq!(entry.size(), 5);
        let entry = Entry::from_real_path(dir.path(),
                                          &dir.path().join("sub")).unwrap();
        assert_eq!(entry.path(), "sub");
        assert!(entry.is_dir());
        match Entry::from_real_path(dir.path(), "bad".as_ref()) {
            Err(Error::NotFound(x)) => assert_eq!(x, "bad"),
            x => panic!("expected NotFound, got {:?}", x),
        }
        match Entry::from_real_path(dir.path(), dir.path()) {
            Err(Error::InvalidArgument(..)) => (),
            x => panic!("expected InvalidArgument, got {:?}", x),
        }
        match Entry::from_real_path(&dir.path().join("sub"),
                                    &dir.path().join("elsewhere")) {
            Err(Error::InvalidArgument(..)) => (),
            x => panic!("expected InvalidArgument, got {:?}", x),
        }
    }
}
