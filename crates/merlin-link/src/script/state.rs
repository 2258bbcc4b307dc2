//! Script-run state: the process-wide variables a link-script mutates as
//! it executes (spec.md 3, "Script state").
//!
//! Kept as a plain struct owned by [`crate::Linker`] rather than statics,
//! per the "Global state" design note in spec.md 9.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// `OVR NONE`: refuse to overwrite an existing output file.
pub const OVR_NONE: i32 = 1;
/// `OVR ALL`: always overwrite.
pub const OVR_ALL: i32 = -1;
/// `OVR OFF`: overwrite disabled outright.
pub const OVR_OFF: i32 = 0;

/// Default GS/OS application file type (`S16`), used when a script never
/// issues `TYP`.
const DEFAULT_FTYPE: u8 = 0xb3;

/// One link-script run's mutable state.
#[derive(Debug, Clone)]
pub struct ScriptState {
    /// Linker version: 0 binary, 1 single-segment OMF, 2 multi-segment
    /// OMF, 3 REL->OMF-object.
    pub lkv: u8,
    /// OMF version; `VER` must set this to 2.
    pub ver: u8,
    /// GS/OS file type, set by `TYP` (default `S16`).
    pub ftype: u8,
    /// GS/OS auxiliary type, set by `ORG`.
    pub atype: u32,
    /// Load address, set by `ADR`/`ORG`.
    pub org: u32,
    /// `OVR` overwrite policy: [`OVR_NONE`], [`OVR_ALL`], [`OVR_OFF`], or a
    /// signed byte count.
    pub overwrite: i32,
    /// Sticky flag set by `END`; once true, only a handful of opcodes are
    /// still honored (spec.md 4.4).
    pub end: bool,
    active_bits: u64,
    depth: u32,
    /// Running byte counter reset by a bare `POS` and read by `POS label`.
    pub pos_var: u32,
    /// Byte count of the most recent `LNK`/`IMP`, read by `LEN label`.
    pub len_var: u32,
    /// The script-local symbol shadow (`=` / `EQU` / `GEQ` / `KBD` / `POS`
    /// / `LEN`), separate from the linker-global [`crate::SymbolTable`]
    /// (spec.md 3).
    pub locals: HashMap<Vec<u8>, u32>,
    /// Output path fixed by the first `SAV` in this run.
    pub save_path: Option<PathBuf>,
    /// OMF load name, derived from `save_path`'s file stem.
    pub load_name: Option<String>,
    /// Set by `FAS`; accepted and recorded, not enforced (spec.md 9).
    pub fast: bool,
    /// Script errors encountered while active; `run` aborts at 10.
    pub error_count: u32,
    /// Working directory as changed by `PFX`. Tracked explicitly rather
    /// than via `std::env::set_current_dir`, so a link run never mutates
    /// true process-wide state (and stays safely testable in parallel).
    pub cwd: PathBuf,
}

impl Default for ScriptState {
    fn default() -> Self {
        ScriptState {
            lkv: 1,
            ver: 2,
            ftype: DEFAULT_FTYPE,
            atype: 0,
            org: 0,
            overwrite: OVR_NONE,
            end: false,
            active_bits: 1,
            depth: 0,
            pos_var: 0,
            len_var: 0,
            locals: HashMap::new(),
            save_path: None,
            load_name: None,
            fast: false,
            error_count: 0,
            cwd: PathBuf::new(),
        }
    }
}

impl ScriptState {
    /// Equivalent to [`Default::default`].
    pub fn new() -> Self {
        ScriptState::default()
    }

    /// True iff every bit of the `DO`/`ELS`/`FIN` stack is 1, i.e.
    /// `active_bits` has the form `2^n - 1` (spec.md 3/9).
    pub fn is_active(&self) -> bool {
        self.active_bits & (self.active_bits + 1) == 0
    }

    /// `DO value`: push a new scope. The pushed bit is `value` if the
    /// enclosing scope is active, else forced to 0 so nested blocks under
    /// a false branch stay inactive regardless of their own condition
    /// (spec.md 4.4, 8 invariant 4).
    pub fn push_do(&mut self, value: bool) -> Result<()> {
        if self.depth >= 32 {
            return Err(Error::script("DO nesting exceeds 32 levels"));
        }
        let bit = if self.is_active() { value as u64 } else { 0 };
        self.active_bits = (self.active_bits << 1) | bit;
        self.depth += 1;
        Ok(())
    }

    /// `ELS`: toggle the top-of-stack bit (always bit 0, since pushes
    /// shift existing bits up and insert the new one at the bottom).
    pub fn toggle_els(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::script("ELS without matching DO"));
        }
        self.active_bits ^= 1;
        Ok(())
    }

    /// `FIN`: pop the top scope.
    pub fn pop_fin(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::script("FIN without matching DO"));
        }
        self.active_bits >>= 1;
        self.depth -= 1;
        Ok(())
    }

    /// Reset the counters `LNK`/`IMP` update, and the fields that do not
    /// survive a `SAV`/`END` boundary in modes 0/1/3 (spec.md 5).
    pub fn reset_for_new_artifact(&mut self) {
        self.pos_var = 0;
        self.len_var = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active() {
        let s = ScriptState::new();
        assert!(s.is_active());
    }

    #[test]
    fn do_zero_then_els_then_fin() {
        let mut s = ScriptState::new();
        s.push_do(false).unwrap();
        assert!(!s.is_active());
        s.toggle_els().unwrap();
        assert!(s.is_active());
        s.pop_fin().unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn nested_do_under_false_branch_stays_inactive() {
        let mut s = ScriptState::new();
        s.push_do(false).unwrap();
        s.push_do(true).unwrap();
        assert!(!s.is_active());
        s.pop_fin().unwrap();
        s.pop_fin().unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn thirty_two_levels_succeed_and_thirty_third_fails() {
        let mut s = ScriptState::new();
        for _ in 0..32 {
            s.push_do(true).unwrap();
        }
        assert!(s.push_do(true).is_err());
    }

    #[test]
    fn thirty_two_levels_under_false_branch_stays_inactive() {
        let mut s = ScriptState::new();
        s.push_do(false).unwrap();
        for _ in 0..31 {
            s.push_do(true).unwrap();
        }
        assert!(!s.is_active());
    }

    #[test]
    fn els_without_do_errors() {
        let mut s = ScriptState::new();
        assert!(s.toggle_els().is_err());
    }

    #[test]
    fn fin_without_do_errors() {
        let mut s = ScriptState::new();
        assert!(s.pop_fin().is_err());
    }
}
