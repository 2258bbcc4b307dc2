//! Alphabetical and numeric symbol listings.
//!
//! Mirrors `original_source/link.cpp`'s `print_symbols`: one line per
//! symbol, once sorted by name and once sorted by value, each showing the
//! symbol's value and which segment it belongs to.

use crate::symbol::{Symbol, SymbolTable};

/// One formatted symbol-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRow {
    /// The symbol's name, decoded lossily as UTF-8 for display.
    pub name: String,
    /// The symbol's value, meaningful only when `defined`.
    pub value: u32,
    /// The owning segment number, or 0 if absolute/undefined.
    pub segment: u16,
    /// True if the value is an absolute constant.
    pub absolute: bool,
    /// True if the symbol has a definition.
    pub defined: bool,
}

impl SymbolRow {
    fn from(symbol: &Symbol) -> Self {
        SymbolRow {
            name: String::from_utf8_lossy(symbol.name()).into_owned(),
            value: symbol.value(),
            segment: symbol.segment(),
            absolute: symbol.is_absolute(),
            defined: symbol.is_defined(),
        }
    }
}

/// List every symbol, sorted alphabetically by name.
pub fn alphabetical(symbols: &SymbolTable) -> Vec<SymbolRow> {
    let mut rows: Vec<SymbolRow> = symbols.iter().map(SymbolRow::from).collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// List every symbol, sorted by value (`print_symbols`'s second pass).
pub fn numeric(symbols: &SymbolTable) -> Vec<SymbolRow> {
    let mut rows: Vec<SymbolRow> = symbols.iter().map(SymbolRow::from).collect();
    rows.sort_by_key(|r| r.value);
    rows
}

/// Render one row the way `print_symbols` does: name, value (hex), and
/// either `ABS`, an unresolved marker, or the owning segment number.
pub fn format_row(row: &SymbolRow) -> String {
    if !row.defined {
        format!("{:<24} **undefined**", row.name)
    } else if row.absolute {
        format!("{:<24} {:06X}  ABS", row.name, row.value)
    } else {
        format!("{:<24} {:06X}  seg {}", row.name, row.value, row.segment)
    }
}
