//! The bundle's byte layout.
//!
//! All integers are little-endian.
//!
//! ```text
//! header:  magic "PSILOBDL" (8) | version u16 | flags u16 | count u32
//! index:   count × record
//! record:  path_len u32 | path (UTF-8) | kind u8 | mod_time i64 | size u64
//!          | payload_len u64
//! data:    the payloads, in index order
//! ```
//!
//! A file's payload is its content, zlib-compressed on its own. Directories
//! have no payload. Everything needed to list, stat or walk the bundle is in
//! the index, so loading a bundle never inflates anything.

use crate::*;

use std::{
    collections::HashSet,
    io::{self, Cursor, Read, Write},
    ops::Range,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{
    Compression, Decompress, FlushDecompress, Status,
    write::ZlibEncoder,
};

pub const MAGIC: &[u8; 8] = b"PSILOBDL";
pub const VERSION: u16 = 1;

const KIND_FILE: u8 = 0;
const KIND_DIRECTORY: u8 = 1;

/// No zlib stream inflates by more than this factor (plus a few bytes of
/// framing). Anything claiming otherwise is lying about its size.
const MAX_INFLATE_RATIO: u64 = 1032;

/// Compression level. 0 is fastest (and largest), [`Quality::MAX`] is
/// slowest (and smallest).
#[derive(Clone,Copy,Debug,PartialEq,Eq,PartialOrd,Ord)]
pub struct Quality(u32);

impl Quality {
    pub const FASTEST: Quality = Quality(0);
    pub const MAX: Quality = Quality(9);
    pub fn new(level: u32) -> Result<Quality> {
        if level > Quality::MAX.0 {
            return Err(Error::InvalidArgument("quality out of range"))
        }
        Ok(Quality(level))
    }
    pub fn level(self) -> u32 { self.0 }
}

impl Default for Quality {
    fn default() -> Quality { Quality(6) }
}

impl TryFrom<u32> for Quality {
    type Error = Error;
    fn try_from(level: u32) -> Result<Quality> { Quality::new(level) }
}

/// One parsed index record, with its payload's location in the bundle.
#[derive(Debug)]
pub(crate) struct Record {
    pub meta: Metadata,
    pub payload: Range<usize>,
}

pub fn compress(data: &[u8], quality: Quality) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(),
                                       Compression::new(quality.level()));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflates one payload. The result must be exactly `size` bytes long, and
/// the zlib stream must be complete and pass its checksum.
pub fn decompress(path: &Path, data: &[u8], size: u64) -> Result<Vec<u8>> {
    let corrupt = |reason: String| Error::CorruptBundle {
        path: path.to_owned(), reason,
    };
    if size > (data.len() as u64).saturating_mul(MAX_INFLATE_RATIO) + 64 {
        return Err(corrupt(format!("{} compressed bytes can't hold {} \
                                    bytes of content", data.len(), size)))
    }
    let size = usize::try_from(size)
        .map_err(|_| corrupt("too large for this platform".to_string()))?;
    // one spare byte, so that too much content shows up as a size mismatch
    // instead of as a full buffer
    let mut out = Vec::with_capacity(size + 1);
    let mut inflater = Decompress::new(true);
    match inflater.decompress_vec(data, &mut out, FlushDecompress::Finish) {
        Ok(Status::StreamEnd) if out.len() == size
            && inflater.total_in() == data.len() as u64 => Ok(out),
        Ok(Status::StreamEnd) =>
            Err(corrupt(format!("inflated to {} bytes, expected {}",
                                out.len(), size))),
        Ok(_) => Err(corrupt("truncated payload".to_string())),
        Err(x) => Err(corrupt(x.to_string())),
    }
}

fn write_record<W: Write>(w: &mut W, meta: &Metadata, payload_len: u64)
                          -> io::Result<()> {
    let path = meta.path().as_str().as_bytes();
    let path_len = u32::try_from(path.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "path too long")
    })?;
    w.write_u32::<LittleEndian>(path_len)?;
    w.write_all(path)?;
    w.write_u8(match meta.kind() {
        Kind::File => KIND_FILE,
        Kind::Directory => KIND_DIRECTORY,
    })?;
    w.write_i64::<LittleEndian>(meta.modified_unix())?;
    w.write_u64::<LittleEndian>(meta.size())?;
    w.write_u64::<LittleEndian>(payload_len)?;
    Ok(())
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidBundle(reason.into())
}

fn truncated(_: io::Error) -> Error {
    invalid("truncated index")
}

/// Reads one index record. Returns the metadata and the payload length.
fn read_record(r: &mut Cursor<&[u8]>) -> Result<(Metadata, u64)> {
    let path_len = r.read_u32::<LittleEndian>().map_err(truncated)? as u64;
    let remaining = r.get_ref().len() as u64 - r.position();
    if path_len > remaining {
        return Err(invalid("truncated index"))
    }
    let mut path = vec![0; path_len as usize];
    r.read_exact(&mut path).map_err(truncated)?;
    let path = String::from_utf8(path)
        .map_err(|_| invalid("entry path is not UTF-8"))?;
    match Path::try_from_str(&path) {
        Ok(x) if x.as_str() == path && !x.is_root() => (),
        _ => return Err(invalid(format!("{:?}: entry path is not \
                                         canonical", path))),
    }
    let path = PathBuf::from_str(&path);
    let kind = match r.read_u8().map_err(truncated)? {
        KIND_FILE => Kind::File,
        KIND_DIRECTORY => Kind::Directory,
        x => return Err(invalid(format!("{}: unknown entry kind {}", path, x))),
    };
    let mod_time = r.read_i64::<LittleEndian>().map_err(truncated)?;
    let size = r.read_u64::<LittleEndian>().map_err(truncated)?;
    let payload_len = r.read_u64::<LittleEndian>().map_err(truncated)?;
    if kind == Kind::Directory && (size != 0 || payload_len != 0) {
        return Err(invalid(format!("{}: directory with content", path)))
    }
    Ok((Metadata::new(path, kind, size, mod_time), payload_len))
}

/// Serializes and compresses `entries`, in order, into one bundle.
pub fn encode_bundle(entries: &[Entry], quality: Quality) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Err(Error::EmptyInput)
    }
    let count = u32::try_from(entries.len())
        .map_err(|_| Error::InvalidArgument("too many entries"))?;
    let mut seen = HashSet::with_capacity(entries.len());
    let mut payloads = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.path().is_root() {
            return Err(Error::InvalidArgument("the root can't be an entry"))
        }
        if !seen.insert(entry.path()) {
            return Err(Error::DuplicatePath(entry.path().to_owned()))
        }
        payloads.push(match entry.content() {
            Some(content) => compress(content, quality).map_err(|source| {
                Error::Io { path: entry.path().as_str().into(), source }
            })?,
            None => vec![],
        });
    }
    let index_len: usize = entries.iter()
        .map(|x| x.path().len() + 29).sum();
    let data_len: usize = payloads.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(16 + index_len + data_len);
    let io_fail = |source| Error::Io { path: "<bundle>".into(), source };
    out.write_all(MAGIC).map_err(io_fail)?;
    out.write_u16::<LittleEndian>(VERSION).map_err(io_fail)?;
    out.write_u16::<LittleEndian>(0).map_err(io_fail)?;
    out.write_u32::<LittleEndian>(count).map_err(io_fail)?;
    for (entry, payload) in entries.iter().zip(payloads.iter()) {
        write_record(&mut out, entry.metadata(), payload.len() as u64)
            .map_err(|source| Error::Io {
                path: entry.path().as_str().into(), source
            })?;
    }
    for payload in payloads {
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

/// Parses a bundle's header and index. Nothing is inflated.
pub(crate) fn decode_bundle(bundle: &[u8]) -> Result<Vec<Record>> {
    if bundle.is_empty() {
        return Err(invalid("empty bundle"))
    }
    let mut r = Cursor::new(bundle);
    let mut magic = [0; 8];
    if r.read_exact(&mut magic).is_err() || &magic != MAGIC {
        return Err(invalid("not a bundle (bad magic)"))
    }
    let version = r.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != VERSION {
        return Err(invalid(format!("unsupported bundle version {}", version)))
    }
    let flags = r.read_u16::<LittleEndian>().map_err(truncated)?;
    if flags != 0 {
        return Err(invalid(format!("unknown bundle flags {:#06x}", flags)))
    }
    let count = r.read_u32::<LittleEndian>().map_err(truncated)?;
    if count == 0 {
        return Err(invalid("bundle has no entries"))
    }
    let mut index = Vec::with_capacity((count as usize).min(4096));
    for _ in 0 .. count {
        index.push(read_record(&mut r)?);
    }
    let mut offset = r.position();
    let mut records = Vec::with_capacity(index.len());
    for (meta, payload_len) in index {
        let end = offset.checked_add(payload_len)
            .filter(|&x| x <= bundle.len() as u64)
            .ok_or_else(|| invalid(format!("{}: payload runs past the end \
                                            of the bundle", meta.path())))?;
        records.push(Record {
            meta,
            payload: offset as usize .. end as usize,
        });
        offset = end;
    }
    if offset != bundle.len() as u64 {
        return Err(invalid(format!("{} bytes of trailing garbage",
                                   bundle.len() as u64 - offset)))
    }
    Ok(records)
}
