//! Library search (spec.md 4.6).
//!
//! After all explicit `LNK`s have run, every symbol that is referenced but
//! still undefined is looked up as `dir/name` under each registered
//! search directory. A hit is decoded only if its file-type metadata
//! marks it as a REL unit; decoding it may reference further undefined
//! symbols, which extend the same search.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::metadata::{UnitMetadataSource, REL_FILE_TYPE};
use crate::rel::decode_unit;
use crate::segment::Segment;
use crate::symbol::{SymbolId, SymbolTable};

/// Search `directories` for every currently-undefined, referenced symbol
/// in `symbols`, decoding any REL unit found into `segment`.
///
/// Iterates by index rather than by `Iterator`, since decoding a library
/// member interns fresh symbols and can grow `symbols` out from under a
/// borrowed iterator (spec.md 9, "Library search re-entrancy").
pub fn search_libraries(
    symbols: &mut SymbolTable,
    segment: &mut Segment,
    directories: &[PathBuf],
    metadata: &dyn UnitMetadataSource,
) -> Result<Vec<String>> {
    let mut loaded = Vec::new();
    let mut index = 0usize;
    while index < symbols.len() {
        let id = SymbolId::new(index);
        index += 1;

        let sym = symbols.get(id);
        if sym.is_defined() || sym.reference_count() == 0 {
            continue;
        }
        let name = String::from_utf8_lossy(sym.name()).into_owned();

        if let Some(path) = find_member(&name, directories, metadata) {
            let data = std::fs::read(&path)?;
            let code_length = metadata.aux_type(&path).ok_or_else(|| {
                Error::decode(format!(
                    "{}: no aux-type (code length) metadata available",
                    path.display()
                ))
            })? as usize;
            decode_unit(
                symbols,
                segment,
                &path.display().to_string(),
                &data,
                code_length,
            )?;
            log::debug!("library search: resolved '{}' from {}", name, path.display());
            loaded.push(name);
        }
    }
    Ok(loaded)
}

fn find_member(
    name: &str,
    directories: &[PathBuf],
    metadata: &dyn UnitMetadataSource,
) -> Option<PathBuf> {
    directories.iter().find_map(|dir| {
        let candidate = dir.join(name);
        (metadata.file_type(&candidate) == Some(REL_FILE_TYPE)).then_some(candidate)
    })
}
