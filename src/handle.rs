use crate::*;

use std::{
    fmt,
    io::{self, SeekFrom},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::SystemTime,
};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::vfs::Bundle;
#[cfg(feature = "fs")]
use crate::disk::Disk;

/// Where a seek offset is measured from.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;
    /// The classic `SEEK_SET`, `SEEK_CUR` and `SEEK_END` values.
    fn try_from(whence: i32) -> Result<Whence> {
        match whence {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => Err(Error::InvalidArgument("seek: bad whence")),
        }
    }
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
enum State {
    Closed,
    /// `cursor` is the read position (files), `listed` is how many children
    /// have been returned by `readdir` (directories).
    Open { cursor: u64, listed: usize },
}

/// What a handle is open on.
enum Target {
    /// Shares the node's inflated content with every other handle.
    Packed { bundle: Arc<Bundle>, node: usize },
    /// Has its own copy of what was on disk when it was opened.
    #[cfg(feature = "fs")]
    Disk {
        disk: Arc<Disk>,
        meta: Metadata,
        content: Vec<u8>,
        children: Vec<Metadata>,
    },
}

/// An open file or directory in a [`VirtualFs`].
///
/// Every handle has its own cursor; any number of handles can be open on
/// the same file at once. A handle can be sent to another thread, but not
/// shared between threads without a lock.
pub struct FileHandle {
    target: Target,
    state: State,
}

impl FileHandle {
    pub(crate) fn packed(bundle: Arc<Bundle>, node: usize) -> FileHandle {
        FileHandle {
            target: Target::Packed { bundle, node },
            state: State::Open { cursor: 0, listed: 0 },
        }
    }
    #[cfg(feature = "fs")]
    pub(crate) fn on_disk(disk: Arc<Disk>, path: &Path) -> Result<FileHandle> {
        let (meta, content, children) = read_from_disk(&disk, path)?;
        Ok(FileHandle {
            target: Target::Disk { disk, meta, content, children },
            state: State::Open { cursor: 0, listed: 0 },
        })
    }
    pub fn metadata(&self) -> &Metadata {
        match &self.target {
            Target::Packed { bundle, node } => &bundle.node(*node).meta,
            #[cfg(feature = "fs")]
            Target::Disk { meta, .. } => meta,
        }
    }
    pub fn path(&self) -> &Path { self.metadata().path() }
    pub fn name(&self) -> &str { self.metadata().name() }
    pub fn size(&self) -> u64 { self.metadata().size() }
    pub fn mode(&self) -> Mode { self.metadata().mode() }
    pub fn mod_time(&self) -> SystemTime { self.metadata().mod_time() }
    pub fn is_dir(&self) -> bool { self.metadata().is_dir() }
    pub fn is_open(&self) -> bool { self.state != State::Closed }
    /// The current read position. `None` once closed.
    pub fn position(&self) -> Option<u64> {
        match self.state {
            State::Open { cursor, .. } => Some(cursor),
            State::Closed => None,
        }
    }
    /// Returns the cursor of an open file handle, or the error for whatever
    /// this handle isn't.
    fn file_cursor(&mut self) -> Result<&mut u64> {
        if self.state == State::Closed {
            return Err(Error::Closed)
        }
        if self.is_dir() {
            return Err(Error::PermissionDenied(self.path().to_owned()))
        }
        match &mut self.state {
            State::Open { cursor, .. } => Ok(cursor),
            State::Closed => Err(Error::Closed),
        }
    }
    /// Reads from the cursor into `buf`, and advances the cursor past what
    /// was read.
    ///
    /// Returns `Err(Eof)` if the cursor is already at the end and `buf`
    /// isn't empty.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        // the cursor never exceeds the size, which came from a `usize`
        let start = *self.file_cursor()? as usize;
        if buf.is_empty() { return Ok(0) }
        let content = self.content()?;
        if start >= content.len() {
            return Err(Error::Eof)
        }
        let amount = buf.len().min(content.len() - start);
        buf[..amount].copy_from_slice(&content[start .. start + amount]);
        if let State::Open { cursor, .. } = &mut self.state {
            *cursor += amount as u64;
        }
        Ok(amount)
    }
    fn content(&self) -> Result<&[u8]> {
        match &self.target {
            Target::Packed { bundle, node } => bundle.content(*node),
            #[cfg(feature = "fs")]
            Target::Disk { content, .. } => Ok(content),
        }
    }
    /// Moves the cursor and returns its new position. Positions before the
    /// start or past the end of the file are refused.
    ///
    /// `Whence::End` counts from the end the way `lseek` and
    /// `std::io::SeekFrom::End` do: the new position is the size plus
    /// `offset`, so `offset` must be zero or negative.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let size = self.size();
        let cursor = self.file_cursor()?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => *cursor,
            Whence::End => size,
        };
        let target = i128::from(base) + i128::from(offset);
        if target < 0 || target > i128::from(size) {
            return Err(Error::InvalidArgument("seek: bad offset"))
        }
        *cursor = target as u64;
        Ok(*cursor)
    }
    /// Lists the directory, in name order.
    ///
    /// If `count` is positive, returns up to `count` children that haven't
    /// been returned yet, and returns `Err(Eof)` once there are none left.
    /// Otherwise, returns every child that hasn't been returned yet and
    /// leaves the listing where it was.
    pub fn readdir(&mut self, count: isize) -> Result<Vec<Metadata>> {
        let listed = match &mut self.state {
            State::Closed => return Err(Error::Closed),
            State::Open { listed, .. } => listed,
        };
        let children = match &self.target {
            Target::Packed { bundle, node } => {
                let node = bundle.node(*node);
                if !node.meta.is_dir() {
                    return Err(Error::NotDirectory(node.meta.path()
                                                   .to_owned()))
                }
                Children::Packed(bundle, &node.children)
            },
            #[cfg(feature = "fs")]
            Target::Disk { meta, children, .. } => {
                if !meta.is_dir() {
                    return Err(Error::NotDirectory(meta.path().to_owned()))
                }
                Children::Disk(children)
            },
        };
        let total = children.len();
        let start = (*listed).min(total);
        let remaining = total - start;
        let take = if count <= 0 {
            remaining
        }
        else if remaining == 0 {
            return Err(Error::Eof)
        }
        else {
            let take = remaining.min(count as usize);
            *listed += take;
            take
        };
        Ok((start .. start + take).map(|i| children.get(i)).collect())
    }
    /// Closes the handle. Everything but the accessors fails with `Closed`
    /// from now on, including closing it again.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed => Err(Error::Closed),
            State::Open { .. } => {
                self.state = State::Closed;
                Ok(())
            },
        }
    }
    /// Opens the same file again, with the cursor back at 0. Works whether
    /// or not the handle is closed. Directory handles can't be reopened.
    ///
    /// A handle on a disk-backed filesystem rereads the file.
    pub fn reopen(&mut self) -> Result<()> {
        if self.is_dir() {
            return Err(Error::PermissionDenied(self.path().to_owned()))
        }
        match &mut self.target {
            Target::Packed { bundle, node } => { bundle.content(*node)?; },
            #[cfg(feature = "fs")]
            Target::Disk { disk, meta, content, .. } => {
                let (new_meta, new_content) = disk.read(meta.path())?;
                *meta = new_meta;
                *content = new_content;
            },
        }
        self.state = State::Open { cursor: 0, listed: 0 };
        Ok(())
    }
}

#[cfg(feature = "fs")]
fn read_from_disk(disk: &Disk, path: &Path)
                  -> Result<(Metadata, Vec<u8>, Vec<Metadata>)> {
    let meta = disk.stat(path)?;
    if meta.is_dir() {
        let children = disk.children(path)?;
        Ok((meta, vec![], children))
    }
    else {
        let (meta, content) = disk.read(path)?;
        Ok((meta, content, vec![]))
    }
}

/// A directory's children, however the handle holds them.
enum Children<'a> {
    Packed(&'a Bundle, &'a [usize]),
    #[cfg(feature = "fs")]
    Disk(&'a [Metadata]),
}

impl Children<'_> {
    fn len(&self) -> usize {
        match self {
            Children::Packed(_, x) => x.len(),
            #[cfg(feature = "fs")]
            Children::Disk(x) => x.len(),
        }
    }
    fn get(&self, i: usize) -> Metadata {
        match self {
            Children::Packed(bundle, x) => bundle.node(x[i]).meta.clone(),
            #[cfg(feature = "fs")]
            Children::Disk(x) => x[i].clone(),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.state {
            State::Closed => write!(fmt, "FileHandle({:?}, closed)",
                                    self.path()),
            State::Open { cursor, .. } if !self.is_dir()
                => write!(fmt, "FileHandle({:?}, at {}/{})", self.path(),
                          cursor, self.size()),
            State::Open { listed, .. }
                => write!(fmt, "FileHandle({:?}, listed {})", self.path(),
                          listed),
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match FileHandle::read(self, buf) {
            Err(Error::Eof) => Ok(0),
            x => Ok(x?),
        }
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(x) => (i64::try_from(x).map_err(|_| {
                Error::InvalidArgument("seek: bad offset")
            })?, Whence::Start),
            SeekFrom::Current(x) => (x, Whence::Current),
            SeekFrom::End(x) => (x, Whence::End),
        };
        Ok(FileHandle::seek(self, offset, whence)?)
    }
}

impl AsyncRead for FileHandle {
    fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>,
                 buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let result = match FileHandle::read(this, buf.initialize_unfilled()) {
            Ok(amount) => {
                buf.advance(amount);
                Ok(())
            },
            Err(Error::Eof) => Ok(()),
            Err(x) => Err(x.into()),
        };
        Poll::Ready(result)
    }
}

impl AsyncSeek for FileHandle {
    fn start_seek(self: Pin<&mut Self>, pos: SeekFrom) -> io::Result<()> {
        io::Seek::seek(self.get_mut(), pos).map(|_| ())
    }
    fn poll_complete(self: Pin<&mut Self>, _: &mut Context<'_>)
                     -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        Poll::Ready(this.position().ok_or_else(|| Error::Closed.into()))
    }
}
