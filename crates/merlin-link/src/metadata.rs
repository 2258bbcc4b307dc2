//! ProDOS file-type/aux-type metadata, modeled as trait interfaces.
//!
//! Every unit this crate decodes needs two pieces of metadata that live
//! outside the file's own bytes: its ProDOS file-type (REL units are
//! `0xf8`, spec.md 6) and its aux-type (the code length, spec.md 4.2).
//! Neither has a portable stdlib representation, so this crate treats
//! *how a host reads and writes them* as an external collaborator
//! (spec.md 1) — but the value the decoder needs is not optional, so
//! [`LinkerConfig`](crate::LinkerConfig) takes the source/sink as an
//! injected `Arc<dyn _>` rather than a fixed type. [`AppleDoubleMetadata`]
//! is the real, working default: a pure file-format implementation of the
//! AppleDouble sidecar convention `original_source/set_file_type.cpp`'s
//! `afp::finder_info` dependency is itself backed by, so it needs no
//! platform API and works on any host. [`AlwaysRel`] is a pure test
//! double with no such backing.

use std::io;
use std::path::{Path, PathBuf};

/// ProDOS file-type value identifying a REL unit (spec.md 6).
pub const REL_FILE_TYPE: u8 = 0xf8;

/// Reads the file-type/aux-type pair for an input file.
pub trait UnitMetadataSource {
    /// The ProDOS file-type byte for `path`, or `None` if the file does
    /// not exist or has no such metadata.
    fn file_type(&self, path: &Path) -> Option<u8>;

    /// The ProDOS aux-type for `path` — for a REL unit, its code length
    /// in bytes (spec.md 4.2). `None` if unavailable.
    fn aux_type(&self, path: &Path) -> Option<u32>;
}

/// Writes the file-type/aux-type pair for the linker's output file
/// (spec.md 6: "the linker hands a segment list to the writer and then
/// sets the output file's file-type to `ftype`/`atype`").
pub trait FileTypeSink {
    /// Set `path`'s ProDOS file-type and aux-type. A no-op on platforms
    /// with no such metadata.
    fn set_file_type(&self, path: &Path, file_type: u8, aux_type: u32) -> std::io::Result<()>;
}

/// A metadata source/sink with no real backing at all: every existing
/// file is reported as a REL unit (so file-type checks never reject it),
/// its aux-type is always unavailable, and writes are no-ops.
///
/// A pure test double, not a working default — [`LinkerConfig`]
/// (crate::LinkerConfig) defaults to [`AppleDoubleMetadata`] instead.
/// Useful for unit tests that exercise `decode_unit` directly with a
/// hand-supplied code length and have no need for file-type metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRel;

impl UnitMetadataSource for AlwaysRel {
    fn file_type(&self, path: &Path) -> Option<u8> {
        path.is_file().then_some(REL_FILE_TYPE)
    }

    fn aux_type(&self, _path: &Path) -> Option<u32> {
        None
    }
}

impl FileTypeSink for AlwaysRel {
    fn set_file_type(&self, _path: &Path, _file_type: u8, _aux_type: u32) -> std::io::Result<()> {
        Ok(())
    }
}

const ADOUBLE_MAGIC: u32 = 0x0005_1607;
const ADOUBLE_VERSION: u32 = 0x0002_0000;
const ADOUBLE_HEADER_LEN: usize = 26;
const ADOUBLE_ENTRY_LEN: usize = 12;
/// AppleDouble entry id for the ProDOS file info entry (access/file-type/
/// aux-type), per the AppleSingle/AppleDouble format.
const ENTRY_PRODOS_INFO: u32 = 9;
const PRODOS_INFO_LEN: usize = 8;

/// Reads and writes ProDOS file-type/aux-type through an AppleDouble
/// sidecar file (`.AppleDouble/<name>`, next to the real file) — the
/// on-disk format `afp::finder_info` itself ultimately reads and writes
/// on hosts with no native ProDOS/HFS file system. A genuinely working
/// [`UnitMetadataSource`]/[`FileTypeSink`], as opposed to [`AlwaysRel`]'s
/// unconditional stand-in: units whose file-type was set by a prior run
/// of this linker (or any other tool maintaining the same sidecar) decode
/// correctly; units with no sidecar report unavailable metadata rather
/// than a guessed value.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleDoubleMetadata;

fn sidecar_path(path: &Path) -> Option<PathBuf> {
    let dir = path.parent()?;
    let name = path.file_name()?;
    Some(dir.join(".AppleDouble").join(name))
}

fn read_prodos_entry(bytes: &[u8]) -> Option<(u8, u32)> {
    if bytes.len() < ADOUBLE_HEADER_LEN {
        return None;
    }
    if u32::from_be_bytes(bytes[0..4].try_into().ok()?) != ADOUBLE_MAGIC {
        return None;
    }
    let count = u16::from_be_bytes(bytes[24..26].try_into().ok()?) as usize;
    let mut pos = ADOUBLE_HEADER_LEN;
    for _ in 0..count {
        if bytes.len() < pos + ADOUBLE_ENTRY_LEN {
            return None;
        }
        let id = u32::from_be_bytes(bytes[pos..pos + 4].try_into().ok()?);
        let offset = u32::from_be_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        if id == ENTRY_PRODOS_INFO {
            if bytes.len() < offset + PRODOS_INFO_LEN {
                return None;
            }
            let file_type = u16::from_be_bytes(bytes[offset + 2..offset + 4].try_into().ok()?);
            let aux_type = u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().ok()?);
            return Some((file_type as u8, aux_type));
        }
        pos += ADOUBLE_ENTRY_LEN;
    }
    None
}

fn write_prodos_entry(file_type: u8, aux_type: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ADOUBLE_HEADER_LEN + ADOUBLE_ENTRY_LEN + PRODOS_INFO_LEN);
    buf.extend_from_slice(&ADOUBLE_MAGIC.to_be_bytes());
    buf.extend_from_slice(&ADOUBLE_VERSION.to_be_bytes());
    buf.extend_from_slice(&[0u8; 16]); // home file system, unused here
    buf.extend_from_slice(&1u16.to_be_bytes()); // one entry
    let entry_offset = (ADOUBLE_HEADER_LEN + ADOUBLE_ENTRY_LEN) as u32;
    buf.extend_from_slice(&ENTRY_PRODOS_INFO.to_be_bytes());
    buf.extend_from_slice(&entry_offset.to_be_bytes());
    buf.extend_from_slice(&(PRODOS_INFO_LEN as u32).to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // access
    buf.extend_from_slice(&(file_type as u16).to_be_bytes());
    buf.extend_from_slice(&aux_type.to_be_bytes());
    buf
}

fn read_entry(path: &Path) -> Option<(u8, u32)> {
    let sidecar = sidecar_path(path)?;
    let bytes = std::fs::read(sidecar).ok()?;
    read_prodos_entry(&bytes)
}

impl UnitMetadataSource for AppleDoubleMetadata {
    fn file_type(&self, path: &Path) -> Option<u8> {
        read_entry(path).map(|(file_type, _)| file_type)
    }

    fn aux_type(&self, path: &Path) -> Option<u32> {
        read_entry(path).map(|(_, aux_type)| aux_type)
    }
}

impl FileTypeSink for AppleDoubleMetadata {
    fn set_file_type(&self, path: &Path, file_type: u8, aux_type: u32) -> io::Result<()> {
        let sidecar = sidecar_path(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
        if let Some(dir) = sidecar.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(sidecar, write_prodos_entry(file_type, aux_type))
    }
}
