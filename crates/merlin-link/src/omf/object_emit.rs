//! REL -> OMF-object emission (linker version 3, spec.md 4.5).
//!
//! Unlike the image writers in the parent module, this is fully in scope:
//! the record stream's shape, and the `EXPR` postfix-expression encoding
//! in particular, are specified exactly rather than delegated.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{Error, Result};
use crate::resolve::{resolve_segment, ResolveOptions};
use crate::segment::Segment;
use crate::symbol::SymbolTable;

const OPCODE_END: u8 = 0x00;
const OPCODE_GLOBAL: u8 = 0xE2;
const OPCODE_GEQU: u8 = 0xE3;
const OPCODE_EXPR: u8 = 0xE5;
const OPCODE_LCONST: u8 = 0xEE;
const MAX_INLINE_CONST: usize = 0xDF;

const EXPR_EXTERNAL: u8 = 0x83;
const EXPR_ABSOLUTE: u8 = 0x87;
const EXPR_PUSH_CONST: u8 = 0x81;
const EXPR_OP_ADD: u8 = 0x01;
const EXPR_OP_SHIFT: u8 = 0x07;
const EXPR_END: u8 = 0x00;

const GLOBAL_TYPE: u8 = b'N';
const GEQU_TYPE: u8 = b'G';

/// Resolve `segment` with `allow_unresolved` and write its REL->OMF-object
/// record stream to `out`.
pub fn emit(symbols_in: &SymbolTable, segment: &mut Segment, out: &mut dyn Write) -> Result<()> {
    resolve_segment(symbols_in, segment, ResolveOptions {
        allow_unresolved: true,
    })?;
    write_geqs(symbols_in, out)?;
    write_data_stream(symbols_in, segment, out)?;
    out.write_all(&[OPCODE_END])?;
    Ok(())
}

fn write_geqs(symbols: &SymbolTable, out: &mut dyn Write) -> Result<()> {
    for sym in symbols.iter() {
        if sym.is_defined() && sym.is_absolute() {
            out.write_all(&[OPCODE_GEQU])?;
            write_name(out, sym.name())?;
            out.write_all(&[0, GEQU_TYPE])?;
            out.write_all(&sym.value().to_le_bytes())?;
        }
    }
    Ok(())
}

fn write_data_stream(symbols: &SymbolTable, segment: &Segment, out: &mut dyn Write) -> Result<()> {
    let seg_num = segment.number();
    let payload = segment.payload();

    let resolved: HashMap<u32, &crate::reloc::IntraReloc> =
        segment.intra().iter().map(|r| (r.offset, r)).collect();
    let unresolved: HashMap<u32, &crate::reloc::UnresolvedReloc> =
        segment.unresolved().iter().map(|r| (r.offset, r)).collect();

    let mut globals_at: HashMap<u32, Vec<&[u8]>> = HashMap::new();
    for sym in symbols.iter() {
        if sym.is_defined() && !sym.is_absolute() && sym.segment() == seg_num {
            globals_at.entry(sym.value()).or_default().push(sym.name());
        }
    }

    let mut breakpoints: Vec<u32> = globals_at
        .keys()
        .copied()
        .chain(resolved.keys().copied())
        .chain(unresolved.keys().copied())
        .filter(|&o| (o as usize) <= payload.len())
        .collect();
    breakpoints.sort_unstable();
    breakpoints.dedup();

    let mut pos = 0u32;
    for &brk in &breakpoints {
        write_literal(out, &payload[pos as usize..brk as usize])?;
        pos = brk;

        if let Some(names) = globals_at.get(&brk) {
            for name in names {
                out.write_all(&[OPCODE_GLOBAL])?;
                write_name(out, name)?;
                out.write_all(&[0, GLOBAL_TYPE, 0])?;
            }
        }

        if let Some(reloc) = unresolved.get(&brk) {
            let sym = symbols.get(reloc.target);
            write_expr_external(out, reloc.width.bytes() as u8, sym.name(), reloc.addend, reloc.shift)?;
            pos += reloc.width.bytes() as u32;
        } else if let Some(reloc) = resolved.get(&brk) {
            write_expr_absolute(out, reloc.width.bytes() as u8, reloc.value, reloc.shift)?;
            pos += reloc.width.bytes() as u32;
        }
    }
    write_literal(out, &payload[pos as usize..])?;
    Ok(())
}

fn write_literal(out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    if bytes.len() <= MAX_INLINE_CONST {
        out.write_all(&[bytes.len() as u8])?;
    } else {
        out.write_all(&[OPCODE_LCONST])?;
        out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    }
    out.write_all(bytes)?;
    Ok(())
}

fn write_expr_external(
    out: &mut dyn Write,
    size: u8,
    name: &[u8],
    addend: u32,
    shift: i8,
) -> Result<()> {
    out.write_all(&[OPCODE_EXPR, size, EXPR_EXTERNAL])?;
    write_name(out, name)?;
    if addend != 0 {
        out.write_all(&[EXPR_PUSH_CONST])?;
        out.write_all(&addend.to_le_bytes())?;
        out.write_all(&[EXPR_OP_ADD])?;
    }
    write_shift_suffix(out, shift)?;
    out.write_all(&[EXPR_END])?;
    Ok(())
}

fn write_expr_absolute(out: &mut dyn Write, size: u8, value: u32, shift: i8) -> Result<()> {
    out.write_all(&[OPCODE_EXPR, size, EXPR_ABSOLUTE])?;
    out.write_all(&value.to_le_bytes())?;
    write_shift_suffix(out, shift)?;
    out.write_all(&[EXPR_END])?;
    Ok(())
}

fn write_shift_suffix(out: &mut dyn Write, shift: i8) -> Result<()> {
    if shift != 0 {
        out.write_all(&[EXPR_PUSH_CONST])?;
        out.write_all(&(shift as i32 as u32).to_le_bytes())?;
        out.write_all(&[EXPR_OP_SHIFT])?;
    }
    Ok(())
}

fn write_name(out: &mut dyn Write, name: &[u8]) -> Result<()> {
    if name.len() > u8::MAX as usize {
        return Err(Error::write(format!(
            "symbol name '{}' too long for the object emitter",
            String::from_utf8_lossy(name)
        )));
    }
    out.write_all(&[name.len() as u8])?;
    out.write_all(name)?;
    Ok(())
}
