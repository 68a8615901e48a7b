use std::io::{self, ErrorKind};
use thiserror::Error;

use crate::{PathBuf, PathFromStrError};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while packing a bundle or reading one back.
///
/// Every variant maps onto the `std::io::ErrorKind` a real filesystem would
/// report for the same situation (see [`Error::kind`]), and `Error`
/// converts into `std::io::Error`, so a [`FileHandle`](crate::FileHandle)
/// can stand in wherever a `Read + Seek` is expected.
#[derive(Debug, Error)]
pub enum Error {
    /// No entry matches the path.
    #[error("{0}: no such file or directory")]
    NotFound(PathBuf),
    /// Directory listing was requested on a file.
    #[error("{0}: not a directory")]
    NotDirectory(PathBuf),
    /// Content access was requested on a directory.
    #[error("{0}: permission denied")]
    PermissionDenied(PathBuf),
    /// The handle has been closed.
    #[error("file already closed")]
    Closed,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathFromStrError),
    /// Two entries handed to the packer had the same path.
    #[error("{0}: duplicate entry")]
    DuplicatePath(PathBuf),
    /// The packer was given nothing to pack.
    #[error("nothing to pack")]
    EmptyInput,
    /// The bundle's header or index couldn't be parsed.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
    /// One entry's payload failed to decompress. Other entries are
    /// unaffected.
    #[error("{path}: corrupt bundle entry: {reason}")]
    CorruptBundle { path: PathBuf, reason: String },
    /// End of file, or end of a directory listing. Not a fault.
    #[error("end of file")]
    Eof,
    /// Reading from the real filesystem failed, while packing or while
    /// reading from disk in place of a bundle.
    #[error("{}: {}", path.display(), source)]
    Io { path: std::path::PathBuf, #[source] source: io::Error },
}

impl Error {
    /// The `std::io::ErrorKind` a real filesystem would use here.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(..) => ErrorKind::NotFound,
            Error::NotDirectory(..) => ErrorKind::NotADirectory,
            Error::PermissionDenied(..) => ErrorKind::PermissionDenied,
            Error::Closed => ErrorKind::Other,
            Error::InvalidArgument(..) | Error::InvalidPath(..)
                | Error::DuplicatePath(..) | Error::EmptyInput
                => ErrorKind::InvalidInput,
            Error::InvalidBundle(..) | Error::CorruptBundle { .. }
                => ErrorKind::InvalidData,
            Error::Eof => ErrorKind::UnexpectedEof,
            Error::Io { source, .. } => source.kind(),
        }
    }
    /// True for [`Error::Eof`], the normal end of a read or listing.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> io::Error {
        match error {
            Error::Io { source, .. } => source,
            other => io::Error::new(other.kind(), other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test] fn kinds() {
        let nf = Error::NotFound(PathBuf::from_str("bad"));
        assert_eq!(nf.kind(), ErrorKind::NotFound);
        assert_eq!(nf.to_string(), "bad: no such file or directory");
        let io: io::Error = nf.into();
        assert_eq!(io.kind(), ErrorKind::NotFound);
        assert_eq!(Error::InvalidArgument("seek: bad whence").to_string(),
                   "invalid argument: seek: bad whence");
        assert_eq!(io::Error::from(Error::Closed).to_string(),
                   "file already closed");
        assert!(Error::Eof.is_eof());
        assert!(!Error::Closed.is_eof());
    }
}
