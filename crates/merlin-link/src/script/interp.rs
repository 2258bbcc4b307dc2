//! The link-script interpreter: drives `DO`/`ELS`/`FIN` state and
//! dispatches every opcode to the [`crate::Linker`] it runs against
//! (spec.md 4.4).

use crate::error::{Error, Result};
use crate::linker::Linker;
use crate::numeric::parse_number;
use crate::symbol::DefineScope;

use super::lexer::{lex_line, OperandCursor, ParsedLine};
use super::opcode::Opcode;

/// Run every line of `text` against `linker`. `source_name` is used only
/// for diagnostics.
pub fn run(linker: &mut Linker, source_name: &str, text: &str) -> Result<()> {
    for (number, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let lineno = number + 1;

        let outcome = lex_line(line).and_then(|parsed| dispatch(linker, &parsed));
        if let Err(e) = outcome {
            log::warn!("{}:{}: {}", source_name, lineno, e);
            if linker.script.is_active() {
                linker.script.error_count += 1;
                if linker.script.error_count >= 10 {
                    return Err(Error::script(format!(
                        "{}: too many script errors, aborting",
                        source_name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn dispatch(linker: &mut Linker, parsed: &ParsedLine) -> Result<()> {
    // Control opcodes run even while inactive, to keep active_bits synced
    // with script nesting (spec.md 4.4).
    if parsed.opcode.is_control() {
        return dispatch_control(linker, parsed);
    }

    if linker.script.end {
        if !parsed.opcode.is_post_end() {
            return Ok(());
        }
        if parsed.opcode == Opcode::Lnk {
            return Err(Error::script("LNK is not permitted after END"));
        }
    } else if !linker.script.is_active() {
        return Ok(());
    }

    let mut operands = OperandCursor::new(&parsed.operands);
    match parsed.opcode {
        Opcode::Lkv => {
            let v = operands.next_number("LKV version")?;
            if v > 3 {
                return Err(Error::script(format!("LKV {} out of range 0..=3", v)));
            }
            linker.script.lkv = v as u8;
        }
        Opcode::Ver => {
            let v = operands.next_number("VER number")?;
            if v != 2 {
                return Err(Error::script("VER must be 2"));
            }
            linker.script.ver = v as u8;
        }
        Opcode::Typ => {
            let tok = operands.require_token("TYP file type")?;
            linker.script.ftype = parse_file_type(tok)?;
        }
        Opcode::Adr => {
            linker.script.org = operands.next_number("ADR address")?;
        }
        Opcode::Org => {
            let v = operands.next_number("ORG address")?;
            linker.script.org = v;
            linker.script.atype = v;
        }
        Opcode::Knd => {
            let v = operands.next_number("KND kind")?;
            let idx = current_index(linker);
            linker.segments.get_mut(idx).set_kind(crate::segment::SegmentKind(v as u16));
        }
        Opcode::Ali => {
            let v = operands.next_number("ALI alignment")?;
            if v != 0 && !v.is_power_of_two() {
                return Err(Error::script("ALI must be 0 or a power of two"));
            }
            let idx = current_index(linker);
            linker.segments.get_mut(idx).set_alignment(v);
        }
        Opcode::Ds => {
            let v = operands.next_number("DS byte count")?;
            let idx = current_index(linker);
            let seg = linker.segments.get_mut(idx);
            seg.fill(v as usize, 0);
            seg.set_reserved(seg.reserved() + v);
            linker.script.len_var = v;
            linker.script.pos_var += v;
        }
        Opcode::Lnk => {
            let path = operands.next_path("LNK path")?;
            linker.link_unit(&path)?;
        }
        Opcode::Imp => {
            let path = operands.next_path("IMP path")?;
            linker.import_raw(&path)?;
        }
        Opcode::Sav => {
            let path = operands.next_token().map(str::to_string);
            linker.save(path)?;
        }
        Opcode::End => {
            linker.end()?;
        }
        Opcode::Eq => define_with_scope(linker, parsed, &mut operands, DefineScope::SCRIPT_LOCAL)?,
        Opcode::Equ => define_with_scope(linker, parsed, &mut operands, DefineScope::ASSEMBLER)?,
        Opcode::Geq => define_with_scope(
            linker,
            parsed,
            &mut operands,
            DefineScope::ASSEMBLER.union(DefineScope::LINKER).union(DefineScope::SCRIPT_LOCAL),
        )?,
        Opcode::Kbd => {
            let name = parsed
                .label
                .as_ref()
                .ok_or_else(|| Error::script("KBD requires a label"))?;
            let value = keyboard_value(linker, name)?;
            linker.define(
                name.as_bytes(),
                value,
                DefineScope::ASSEMBLER.union(DefineScope::LINKER).union(DefineScope::SCRIPT_LOCAL),
            );
        }
        Opcode::Pos => {
            match &parsed.label {
                None => linker.script.pos_var = 0,
                Some(name) => {
                    let value = linker.script.pos_var;
                    linker.define(name.as_bytes(), value, DefineScope::LINKER);
                }
            }
        }
        Opcode::Len => {
            let name = parsed
                .label
                .as_ref()
                .ok_or_else(|| Error::script("LEN requires a label"))?;
            let value = linker.script.len_var;
            linker.define(name.as_bytes(), value, DefineScope::LINKER);
        }
        Opcode::Ext => {
            let name = parsed
                .label
                .as_ref()
                .ok_or_else(|| Error::script("EXT requires a label"))?;
            linker.import_external(name.as_bytes())?;
        }
        Opcode::Pfx => {
            let path = operands.next_path("PFX path")?;
            linker.script.cwd = linker.script.cwd.join(path);
        }
        Opcode::Ovr => {
            let tok = operands.require_token("OVR mode")?;
            linker.script.overwrite = parse_overwrite(tok)?;
        }
        Opcode::Fas => {
            linker.script.fast = true;
        }
        Opcode::Dat => {
            print_timestamp();
        }
        Opcode::Asm
        | Opcode::Put
        | Opcode::If
        | Opcode::Cmd
        | Opcode::Res
        | Opcode::Rid
        | Opcode::Rty
        | Opcode::Rat
        | Opcode::Fil => {
            // Parsed but not enforced (spec.md 1, 9).
        }
        Opcode::Do | Opcode::Els | Opcode::Fin => unreachable!("handled by dispatch_control"),
    }
    Ok(())
}

fn dispatch_control(linker: &mut Linker, parsed: &ParsedLine) -> Result<()> {
    if linker.script.end {
        return Ok(());
    }
    let mut operands = OperandCursor::new(&parsed.operands);
    match parsed.opcode {
        Opcode::Do => {
            let v = operands.next_number("DO condition")?;
            linker.script.push_do(v != 0)
        }
        Opcode::Els => linker.script.toggle_els(),
        Opcode::Fin => linker.script.pop_fin(),
        _ => unreachable!(),
    }
}

fn current_index(linker: &Linker) -> usize {
    linker.segments.len() - 1
}

fn define_with_scope(
    linker: &mut Linker,
    parsed: &ParsedLine,
    operands: &mut OperandCursor,
    scope: DefineScope,
) -> Result<()> {
    let name = parsed
        .label
        .as_ref()
        .ok_or_else(|| Error::script(format!("{:?} requires a label", parsed.opcode)))?;
    let value = operands.next_number("value")?;
    linker.define(name.as_bytes(), value, scope);
    Ok(())
}

/// `TYP` accepts a small set of common ProDOS/GS.OS file-type mnemonics
/// (case-insensitive) or a bare number (spec.md 4.4). Not exhaustive —
/// see DESIGN.md.
fn parse_file_type(token: &str) -> Result<u8> {
    let named = match token.to_ascii_uppercase().as_str() {
        "TXT" => Some(0x04),
        "BIN" => Some(0x06),
        "DIR" => Some(0x0f),
        "S16" => Some(0xb3),
        "RTL" => Some(0xb4),
        "EXE" => Some(0xb5),
        "PIF" => Some(0xb6),
        "REL" => Some(0xf8),
        "OBJ" => Some(0xf9),
        "LIB" => Some(0xfa),
        _ => None,
    };
    if let Some(v) = named {
        return Ok(v);
    }
    let v = parse_number(token)?;
    u8::try_from(v).map_err(|_| Error::script(format!("'{}' is not a valid file type", token)))
}

fn parse_overwrite(token: &str) -> Result<i32> {
    match token.to_ascii_uppercase().as_str() {
        "NONE" => Ok(super::state::OVR_NONE),
        "ALL" => Ok(super::state::OVR_ALL),
        "OFF" => Ok(super::state::OVR_OFF),
        _ => {
            let v = parse_number(token.trim_start_matches('-'))? as i32;
            Ok(if token.starts_with('-') { -v } else { v })
        }
    }
}

/// `KBD`: prompt on a TTY stdin if the name has no script-local value yet;
/// otherwise reuse the existing local value, defaulting to 0 when there is
/// none and stdin is not interactive (spec.md 4.4; the non-interactive,
/// undefined case is an explicit DESIGN.md decision).
fn keyboard_value(linker: &Linker, name: &str) -> Result<u32> {
    use std::io::IsTerminal;

    if let Some(&v) = linker.script.locals.get(name.as_bytes()) {
        return Ok(v);
    }
    if !std::io::stdin().is_terminal() {
        return Ok(0);
    }
    eprint!("{}? ", name);
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(Error::from)?;
    parse_number(line.trim())
}

fn print_timestamp() {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("{}", now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::LinkerConfig;

    #[test]
    fn lkv_sets_mode() {
        let mut linker = Linker::new(LinkerConfig::default());
        run(&mut linker, "t", "LKV 2").unwrap();
        assert_eq!(linker.script.lkv, 2);
    }

    #[test]
    fn do_0_els_fin_defines_alternate_branch() {
        let mut linker = Linker::new(LinkerConfig::default());
        run(&mut linker, "t", "DO 0\nX GEQ 1\nELS\nX GEQ 2\nFIN").unwrap();
        let id = linker.symbols.find(b"X", false).unwrap();
        assert_eq!(linker.symbols.get(id).value(), 2);
    }

    #[test]
    fn equ_does_not_reach_the_global_table() {
        let mut linker = Linker::new(LinkerConfig::default());
        run(&mut linker, "t", "X EQU 5").unwrap();
        assert!(linker.symbols.find(b"X", false).is_none());
    }

    #[test]
    fn geq_reaches_both_tables() {
        let mut linker = Linker::new(LinkerConfig::default());
        run(&mut linker, "t", "X GEQ 5").unwrap();
        let id = linker.symbols.find(b"X", false).unwrap();
        assert_eq!(linker.symbols.get(id).value(), 5);
        assert_eq!(linker.script.locals.get(b"X".as_slice()), Some(&5));
    }

    #[test]
    fn unknown_opcode_counts_as_script_error() {
        let mut linker = Linker::new(LinkerConfig::default());
        run(&mut linker, "t", "BOGUS").unwrap();
        assert_eq!(linker.script.error_count, 1);
    }

    #[test]
    fn ten_errors_abort() {
        let mut linker = Linker::new(LinkerConfig::default());
        let script = "BOGUS\n".repeat(10);
        assert!(run(&mut linker, "t", &script).is_err());
    }
}
