use crate::*;

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    ops::Range,
    sync::Arc,
};
use once_cell::sync::OnceCell;

use crate::codec::{self, Record};
#[cfg(feature = "fs")]
use crate::disk::{Disk, DiskWalk};

pub(crate) struct Node {
    pub meta: Metadata,
    payload: Range<usize>,
    content: OnceCell<Vec<u8>>,
    /// Sorted by name. Always empty for files.
    pub children: Vec<usize>,
}

impl Node {
    fn new(meta: Metadata, payload: Range<usize>) -> Node {
        Node { meta, payload, content: OnceCell::new(), children: vec![] }
    }
}

/// One loaded bundle: the bytes, and the index built from them.
pub(crate) struct Bundle {
    bytes: Cow<'static, [u8]>,
    /// Node 0 is always the root.
    nodes: Vec<Node>,
    index: HashMap<PathBuf, usize>,
    /// Nodes whose paths aren't already in form D, by their spelling key.
    spellings: HashMap<String, usize>,
}

impl Bundle {
    fn new(bytes: Cow<'static, [u8]>) -> Result<Bundle> {
        let records = codec::decode_bundle(&bytes)?;
        let explicit = records.len();
        let mut nodes = Vec::with_capacity(explicit + 1);
        let mut index = HashMap::with_capacity(explicit + 1);
        nodes.push(Node::new(Metadata::new(PathBuf::new(), Kind::Directory,
                                           0, 0), 0..0));
        index.insert(PathBuf::new(), 0);
        for Record { meta, payload } in records {
            if index.contains_key(meta.path()) {
                return Err(Error::InvalidBundle(format!("{}: duplicate entry",
                                                        meta.path())))
            }
            index.insert(meta.path().to_owned(), nodes.len());
            nodes.push(Node::new(meta, payload));
        }
        // Any directory that only exists because something is inside it gets
        // a node of its own.
        for i in 1 ..= explicit {
            let mut ancestor = nodes[i].meta.path().to_owned();
            while ancestor.pop() {
                if let Some(&parent) = index.get(ancestor.as_path()) {
                    if !nodes[parent].meta.is_dir() {
                        return Err(Error::InvalidBundle(format!(
                            "{}: file has entries beneath it", ancestor)))
                    }
                    break
                }
                index.insert(ancestor.clone(), nodes.len());
                nodes.push(Node::new(Metadata::new(ancestor.clone(),
                                                   Kind::Directory, 0, 0),
                                     0..0));
            }
        }
        for i in 1 .. nodes.len() {
            let parent = match nodes[i].meta.path().parent() {
                Some(x) => index[x],
                None => continue,
            };
            nodes[parent].children.push(i);
        }
        // byte order, same as a sorted walk of a real directory
        for i in 0 .. nodes.len() {
            let mut children = std::mem::take(&mut nodes[i].children);
            children.sort_by(|&a, &b| {
                nodes[a].meta.name().cmp(nodes[b].meta.name())
            });
            nodes[i].children = children;
        }
        let mut spellings = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if let Cow::Owned(key) = node.meta.path().spelling_key() {
                if !index.contains_key(Path::from_str_preverified(&key)) {
                    spellings.entry(key).or_insert(i);
                }
            }
        }
        log::debug!("loaded bundle: {} bytes, {} entries ({} synthesized \
                     directories)", bytes.len(), nodes.len() - 1,
                    nodes.len() - 1 - explicit);
        Ok(Bundle { bytes, nodes, index, spellings })
    }
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }
    /// An exact match wins. Failing that, a path that's spelled
    /// differently but means the same thing (such as "é" written as one
    /// code point or two) is good enough.
    fn lookup(&self, path: &Path) -> Result<usize> {
        if let Some(&x) = self.index.get(path) {
            return Ok(x)
        }
        match self.spellings.get(&*path.spelling_key()) {
            Some(&x) => Ok(x),
            None => Err(Error::NotFound(path.to_owned())),
        }
    }
    /// The inflated content of a file node. Inflates it if nobody has yet.
    pub fn content(&self, index: usize) -> Result<&[u8]> {
        let node = self.node(index);
        node.content.get_or_try_init(|| {
            log::trace!("inflating {:?} ({} -> {} bytes)", node.meta.path(),
                        node.payload.len(), node.meta.size());
            codec::decompress(node.meta.path(),
                              &self.bytes[node.payload.clone()],
                              node.meta.size())
        }).map(Vec::as_slice)
    }
}

#[derive(Clone)]
enum Backing {
    Bundle(Arc<Bundle>),
    #[cfg(feature = "fs")]
    Disk(Arc<Disk>),
}

/// A read-only filesystem backed by one bundle (or, while developing, by a
/// directory on disk; see [`VirtualFs::from_disk`]).
///
/// Cloning a `VirtualFs` is cheap, and every clone sees the same files. It
/// can be shared freely between threads. Each file is inflated the first
/// time it's opened, and never again, no matter how many handles (or
/// threads) open it after that.
///
/// Paths passed to `VirtualFs` methods are normalized as by
/// [`Path::try_from_str`], so `"/index.html"`, `"./index.html"` and
/// `"index.html"` all mean the same thing. `""`, `"/"` and `"."` are the
/// root, which is always a directory.
#[derive(Clone)]
pub struct VirtualFs {
    backing: Backing,
}

impl VirtualFs {
    pub(crate) fn from_bundle(bytes: Cow<'static, [u8]>) -> Result<VirtualFs> {
        let bundle = Bundle::new(bytes)?;
        Ok(VirtualFs { backing: Backing::Bundle(Arc::new(bundle)) })
    }
    /// A filesystem that reads straight from `root` on the real filesystem
    /// instead of from a bundle. Handy while developing: edit a file, and
    /// the next `open` sees the change, no repacking needed.
    ///
    /// It behaves like a bundle packed from `root` would. Paths, errors,
    /// handles and walk order are all the same. Symlinks, special files and
    /// names a bundle couldn't hold are invisible.
    #[cfg(feature = "fs")]
    pub fn from_disk<P: AsRef<std::path::Path>>(root: P) -> Result<VirtualFs> {
        let disk = Disk::new(root.as_ref())?;
        log::debug!("serving files from disk at {}", disk.root().display());
        Ok(VirtualFs { backing: Backing::Disk(Arc::new(disk)) })
    }
    /// Number of entries, counting synthesized directories but not the
    /// root. On disk, this walks the whole tree.
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Bundle(bundle) => bundle.nodes.len() - 1,
            #[cfg(feature = "fs")]
            Backing::Disk(disk) => disk.walk(Path::root())
                .map(|x| x.count().saturating_sub(1))
                .unwrap_or(0),
        }
    }
    /// True if there is nothing but the root. Never true of a bundle.
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    /// Returns true if anything exists at the given path.
    pub fn exists<P: AsRef<str>>(&self, path: P) -> bool {
        self.stat(path).is_ok()
    }
    /// Returns the metadata of the file or directory at the given path,
    /// without opening it.
    pub fn stat<P: AsRef<str>>(&self, path: P) -> Result<Metadata> {
        let path = Path::try_from_str(path.as_ref())?;
        match &self.backing {
            Backing::Bundle(bundle) => {
                let index = bundle.lookup(&path)?;
                Ok(bundle.node(index).meta.clone())
            },
            #[cfg(feature = "fs")]
            Backing::Disk(disk) => disk.stat(&path),
        }
    }
    /// Opens the file or directory at the given path.
    ///
    /// A file is inflated (if it hasn't been already) and the new handle's
    /// cursor is at 0. A directory handle can only be used to list the
    /// directory; reading or seeking it fails with `PermissionDenied`.
    ///
    /// Returns `CorruptBundle` if the file's payload is damaged. Other files
    /// in the same bundle are unaffected.
    pub fn open<P: AsRef<str>>(&self, path: P) -> Result<FileHandle> {
        let path = Path::try_from_str(path.as_ref())?;
        match &self.backing {
            Backing::Bundle(bundle) => {
                let index = bundle.lookup(&path)?;
                if bundle.node(index).meta.is_file() {
                    bundle.content(index)?;
                }
                Ok(FileHandle::packed(bundle.clone(), index))
            },
            #[cfg(feature = "fs")]
            Backing::Disk(disk) => FileHandle::on_disk(disk.clone(), &path),
        }
    }
    /// Returns an iterator over `root` and everything beneath it: depth
    /// first, each directory before its contents, siblings in name order.
    /// This is the same order as a sorted recursive walk of a real
    /// filesystem.
    ///
    /// Walking a bundle never fails partway. Walking the disk can, if
    /// something can't be read.
    pub fn walk_iter<P: AsRef<str>>(&self, root: P) -> Result<Walk<'_>> {
        let root = Path::try_from_str(root.as_ref())?;
        let inner = match &self.backing {
            Backing::Bundle(bundle) => WalkInner::Bundle {
                bundle,
                stack: vec![bundle.lookup(&root)?],
            },
            #[cfg(feature = "fs")]
            Backing::Disk(disk) => WalkInner::Disk(disk.walk(&root)?),
        };
        Ok(Walk { inner })
    }
    /// Calls `visit` on `root` and everything beneath it, in the same order
    /// as [`walk_iter`](#method.walk_iter). If `visit` returns an error, the
    /// walk stops right there and returns that error.
    ///
    /// ```
    /// # use psilo_bundle::*;
    /// # let fs = load(pack(&[Entry::file(PathBuf::from_str("a/b.txt"), 0,
    /// #                                  b"b".to_vec())],
    /// #                    Quality::default()).unwrap());
    /// let mut seen = vec![];
    /// fs.walk("", |path, _| -> Result<()> {
    ///     seen.push(path.to_string());
    ///     Ok(())
    /// }).unwrap();
    /// assert_eq!(seen, ["", "a", "a/b.txt"]);
    /// ```
    pub fn walk<P, F, E>(&self, root: P, mut visit: F)
                         -> std::result::Result<(), E>
    where P: AsRef<str>,
          F: FnMut(&Path, &Metadata) -> std::result::Result<(), E>,
          E: From<Error> {
        for meta in self.walk_iter(root)? {
            let meta = meta?;
            visit(meta.path(), &meta)?;
        }
        Ok(())
    }
}

impl fmt::Debug for VirtualFs {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.backing {
            Backing::Bundle(bundle)
                => write!(fmt, "VirtualFs({} entries, {} bytes)",
                          bundle.nodes.len() - 1, bundle.bytes.len()),
            #[cfg(feature = "fs")]
            Backing::Disk(disk)
                => write!(fmt, "VirtualFs(disk at {:?})", disk.root()),
        }
    }
}

/// Iterator returned by [`VirtualFs::walk_iter`].
pub struct Walk<'a> {
    inner: WalkInner<'a>,
}

enum WalkInner<'a> {
    Bundle { bundle: &'a Bundle, stack: Vec<usize> },
    #[cfg(feature = "fs")]
    Disk(DiskWalk<'a>),
}

impl<'a> Iterator for Walk<'a> {
    type Item = Result<Metadata>;
    fn next(&mut self) -> Option<Result<Metadata>> {
        match &mut self.inner {
            WalkInner::Bundle { bundle, stack } => {
                let node = bundle.node(stack.pop()?);
                stack.extend(node.children.iter().rev());
                Some(Ok(node.meta.clone()))
            },
            #[cfg(feature = "fs")]
            WalkInner::Disk(walk) => walk.next(),
        }
    }
}
