//! Link-script opcode mnemonics (spec.md 4.4).

/// One link-script opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Select the output mode: binary / single-segment OMF /
    /// multi-segment OMF / REL->OMF-object.
    Lkv,
    /// Set the OMF version; must be 2.
    Ver,
    /// Set the default GS/OS file type.
    Typ,
    /// Set the load address.
    Adr,
    /// Set the load address and the GS/OS auxiliary type.
    Org,
    /// Set the current segment's kind attribute.
    Knd,
    /// Set the current segment's alignment.
    Ali,
    /// Reserve zero-filled space in the current segment.
    Ds,
    /// Decode a REL unit into the current segment.
    Lnk,
    /// Append a raw file's bytes and define a symbol at its offset.
    Imp,
    /// Finalize the current artifact or segment.
    Sav,
    /// Mark the end of the script; only a handful of opcodes run after.
    End,
    /// Push a conditional scope.
    Do,
    /// Toggle the innermost conditional scope.
    Els,
    /// Pop a conditional scope.
    Fin,
    /// Define a script-local symbol (`=`).
    Eq,
    /// Define an assembler-visible symbol.
    Equ,
    /// Define a symbol in every sink.
    Geq,
    /// Prompt for and define a symbol from the keyboard.
    Kbd,
    /// Reset or read the running position counter.
    Pos,
    /// Read the most recent unit's byte length.
    Len,
    /// Import a defined absolute global into the script-local table.
    Ext,
    /// Change the working directory used to resolve paths.
    Pfx,
    /// Set the output-overwrite policy.
    Ovr,
    /// Flag the run for the (unenforced) single-unit fast-link mode.
    Fas,
    /// Print a timestamp.
    Dat,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Asm,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Put,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    If,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Cmd,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Res,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Rid,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Rty,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Rat,
    /// Parsed but not enforced (spec.md 1, Non-goals).
    Fil,
}

impl Opcode {
    /// Resolve a mnemonic (case-insensitive) to its opcode.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match mnemonic.to_ascii_uppercase().as_str() {
            "LKV" => Lkv,
            "VER" => Ver,
            "TYP" => Typ,
            "ADR" => Adr,
            "ORG" => Org,
            "KND" => Knd,
            "ALI" => Ali,
            "DS" => Ds,
            "LNK" => Lnk,
            "IMP" => Imp,
            "SAV" => Sav,
            "END" => End,
            "DO" => Do,
            "ELS" => Els,
            "FIN" => Fin,
            "EQ" => Eq,
            "EQU" => Equ,
            "GEQ" => Geq,
            "KBD" => Kbd,
            "POS" => Pos,
            "LEN" => Len,
            "EXT" => Ext,
            "PFX" => Pfx,
            "OVR" => Ovr,
            "FAS" => Fas,
            "DAT" => Dat,
            "ASM" => Asm,
            "PUT" => Put,
            "IF" => If,
            "CMD" => Cmd,
            "RES" => Res,
            "RID" => Rid,
            "RTY" => Rty,
            "RAT" => Rat,
            "FIL" => Fil,
            _ => return None,
        })
    }

    /// True for the control opcodes that run even while inactive, so the
    /// `active_bits` stack stays synchronized with script nesting.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Do | Opcode::Els | Opcode::Fin)
    }

    /// True if this opcode is still honored after `END` has been seen
    /// (spec.md 4.4).
    pub fn is_post_end(self) -> bool {
        matches!(
            self,
            Opcode::End
                | Opcode::Cmd
                | Opcode::Pfx
                | Opcode::Dat
                | Opcode::Res
                | Opcode::Rid
                | Opcode::Rty
                | Opcode::Rat
                | Opcode::Fil
        )
    }
}
