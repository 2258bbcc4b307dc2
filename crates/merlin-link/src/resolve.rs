//! The resolver: folds one segment's pending relocations into fixups.
//!
//! Runs once per segment, after every unit contributing to it has been
//! decoded (spec.md 4.3). Absolute targets are patched directly into the
//! payload and produce no reloc record; everything else becomes an
//! intra- or inter-segment relocation, or — in `allow_unresolved` mode —
//! stays pending for the OMF-object emitter to reference by name.

use crate::error::{Error, Result};
use crate::reloc::{InterReloc, IntraReloc, PendingReloc, UnresolvedReloc};
use crate::segment::Segment;
use crate::symbol::SymbolTable;

/// Resolver behavior toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// When true, an undefined target is kept as an [`UnresolvedReloc`]
    /// instead of raising a fatal error. Set by the REL->OMF-object
    /// emitter (linker version 3, spec.md 4.5).
    pub allow_unresolved: bool,
}

/// Diagnostics gathered while resolving one segment.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    /// Names of symbols that were undefined and deferred, in
    /// `allow_unresolved` mode.
    pub deferred: Vec<String>,
}

/// Resolve every pending relocation in `segment` against `symbols`.
///
/// On success the segment's intra-segment, inter-segment, and unresolved
/// lists are sorted by ascending offset (spec.md 8, invariant 6) and the
/// bank-size invariant has been checked.
pub fn resolve_segment(
    symbols: &SymbolTable,
    segment: &mut Segment,
    options: ResolveOptions,
) -> Result<ResolveReport> {
    let pending = segment.take_pending();
    let mut report = ResolveReport::default();

    for p in pending {
        resolve_one(symbols, segment, &p, options, &mut report)?;
    }

    segment.sort_relocs();
    segment.check_bank_size()?;
    Ok(report)
}

fn resolve_one(
    symbols: &SymbolTable,
    segment: &mut Segment,
    p: &PendingReloc,
    options: ResolveOptions,
    report: &mut ResolveReport,
) -> Result<()> {
    let sym = symbols.get(p.target);

    if !sym.is_defined() {
        if options.allow_unresolved {
            report.deferred.push(String::from_utf8_lossy(sym.name()).into_owned());
            segment.push_unresolved(UnresolvedReloc {
                width: p.width,
                offset: p.offset,
                target: p.target,
                shift: p.shift,
                addend: p.addend,
            });
            return Ok(());
        }
        return Err(Error::resolve(format!(
            "undefined external symbol '{}'",
            String::from_utf8_lossy(sym.name())
        )));
    }

    if sym.is_absolute() {
        let magnitude = sym.value().wrapping_add(p.addend);
        let value = PendingReloc::apply_shift(p.shift, magnitude);
        segment.patch(p.offset as usize, p.width.bytes(), value);
        return Ok(());
    }

    let value = p.addend.wrapping_add(sym.value());
    if sym.segment() == segment.number() {
        segment.push_intra(IntraReloc {
            width: p.width,
            offset: p.offset,
            shift: p.shift,
            value,
        });
    } else {
        segment.push_inter(InterReloc {
            width: p.width,
            offset: p.offset,
            shift: p.shift,
            target_segment: sym.segment(),
            target_offset: value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::Width;

    fn segment_with_pending(number: u16, pending: PendingReloc) -> Segment {
        let mut seg = Segment::new(number, "CODE", "CODE");
        seg.append(&[0, 0, 0]);
        seg.push_pending(pending);
        seg
    }

    #[test]
    fn absolute_target_patches_payload_and_emits_no_reloc() {
        let mut symbols = SymbolTable::new();
        let id = symbols.define_absolute(b"FOO", 0x1234, None).0;
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::Two,
                offset: 0,
                addend: 0,
                shift: 0,
                target: id,
            },
        );
        resolve_segment(&symbols, &mut seg, ResolveOptions::default()).unwrap();
        assert_eq!(seg.payload(), &[0x34, 0x12, 0]);
        assert!(seg.intra().is_empty());
    }

    #[test]
    fn same_segment_target_becomes_intra_reloc() {
        let mut symbols = SymbolTable::new();
        let id = symbols.define_relative(b"BAR", 0x10, 1, None).0;
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::Three,
                offset: 0,
                addend: 0,
                shift: 0,
                target: id,
            },
        );
        resolve_segment(&symbols, &mut seg, ResolveOptions::default()).unwrap();
        assert_eq!(seg.intra().len(), 1);
        assert_eq!(seg.intra()[0].value, 0x10);
    }

    #[test]
    fn other_segment_target_becomes_inter_reloc() {
        let mut symbols = SymbolTable::new();
        let id = symbols.define_relative(b"BAR", 0x10, 2, None).0;
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::Three,
                offset: 0,
                addend: 0,
                shift: 0,
                target: id,
            },
        );
        resolve_segment(&symbols, &mut seg, ResolveOptions::default()).unwrap();
        assert_eq!(seg.inter().len(), 1);
        assert_eq!(seg.inter()[0].target_segment, 2);
        assert_eq!(seg.inter()[0].target_offset, 0x10);
    }

    #[test]
    fn undefined_target_is_fatal_by_default() {
        let mut symbols = SymbolTable::new();
        let id = symbols.find(b"MISSING", true).unwrap();
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::One,
                offset: 0,
                addend: 0,
                shift: 0,
                target: id,
            },
        );
        assert!(resolve_segment(&symbols, &mut seg, ResolveOptions::default()).is_err());
    }

    #[test]
    fn undefined_target_is_deferred_when_allowed() {
        let mut symbols = SymbolTable::new();
        let id = symbols.find(b"MISSING", true).unwrap();
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::One,
                offset: 0,
                addend: 0,
                shift: 0,
                target: id,
            },
        );
        let report = resolve_segment(
            &symbols,
            &mut seg,
            ResolveOptions {
                allow_unresolved: true,
            },
        )
        .unwrap();
        assert_eq!(seg.unresolved().len(), 1);
        assert_eq!(report.deferred, vec!["MISSING".to_string()]);
    }

    #[test]
    fn undefined_target_keeps_addend_when_deferred() {
        let mut symbols = SymbolTable::new();
        let id = symbols.find(b"MISSING", true).unwrap();
        let mut seg = segment_with_pending(
            1,
            PendingReloc {
                width: Width::One,
                offset: 0,
                addend: 5,
                shift: 0,
                target: id,
            },
        );
        resolve_segment(
            &symbols,
            &mut seg,
            ResolveOptions {
                allow_unresolved: true,
            },
        )
        .unwrap();
        assert_eq!(seg.unresolved()[0].addend, 5);
    }
}
