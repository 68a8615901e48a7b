use crate::*;

use std::borrow::Cow;

use crate::codec::encode_bundle;

/// Packs `entries` into a bundle, in the order given.
///
/// Fails with `EmptyInput` if there are no entries, and with
/// `DuplicatePath` if two entries have the same path. Directories that
/// aren't given explicitly will be synthesized when the bundle is loaded.
pub fn pack(entries: &[Entry], quality: Quality) -> Result<Vec<u8>> {
    let bundle = encode_bundle(entries, quality)?;
    log::debug!("packed {} entries into {} bytes (quality {})",
                entries.len(), bundle.len(), quality.level());
    Ok(bundle)
}

/// Collects entries from the real filesystem (or anywhere else) and packs
/// them.
///
/// ```no_run
/// # use psilo_bundle::*;
/// let bundle = Packer::new("assets")
///     .quality(Quality::MAX)
///     .add_real_path("index.html".as_ref())?
///     .add_real_path("css".as_ref())?
///     .add_real_path("css/site.css".as_ref())?
///     .finish()?;
/// std::fs::write("assets.bundle", bundle).unwrap();
/// # Ok::<(), Error>(())
/// ```
///
/// Every entry's bundle path is its path relative to the root given to
/// [`Packer::new`], so the result doesn't depend on the current directory.
#[derive(Debug)]
pub struct Packer {
    root: std::path::PathBuf,
    quality: Quality,
    entries: Vec<Entry>,
}

impl Packer {
    pub fn new<P: Into<std::path::PathBuf>>(root: P) -> Packer {
        Packer {
            root: root.into(),
            quality: Quality::default(),
            entries: vec![],
        }
    }
    pub fn quality(&mut self, quality: Quality) -> &mut Self {
        self.quality = quality;
        self
    }
    pub fn add_entry(&mut self, entry: Entry) -> &mut Self {
        self.entries.push(entry);
        self
    }
    /// Adds one file, or one directory without its contents, from the real
    /// filesystem. Relative paths are relative to the root.
    #[cfg(feature = "fs")]
    pub fn add_real_path(&mut self, path: &std::path::Path)
                         -> Result<&mut Self> {
        let entry = Entry::from_real_path(&self.root, path)?;
        Ok(self.add_entry(entry))
    }
    pub fn root(&self) -> &std::path::Path { &self.root }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[Entry] { &self.entries }
    pub fn finish(&self) -> Result<Vec<u8>> {
        pack(&self.entries, self.quality)
    }
}

/// Loads a bundle made by [`pack`]. Only the index is read; nothing is
/// inflated until it's opened.
///
/// A `&'static [u8]` (such as the result of `include_bytes!`) or a
/// `Vec<u8>` is used in place, without copying.
pub fn try_load<B: Into<Cow<'static, [u8]>>>(bundle: B) -> Result<VirtualFs> {
    VirtualFs::from_bundle(bundle.into())
}

/// Like [`try_load`], but panics if the bundle can't be loaded. A program
/// that embeds a bundle it can't read has a bug, and should find out right
/// away.
pub fn load<B: Into<Cow<'static, [u8]>>>(bundle: B) -> VirtualFs {
    match try_load(bundle) {
        Ok(x) => x,
        Err(x) => panic!("BUG IN YOUR PROGRAM: the embedded bundle could not \
                          be loaded! {}", x),
    }
}
