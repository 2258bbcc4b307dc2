//! A linker for the Merlin-family REL object format, targeting the 65816.
//!
//! [`SymbolTable`] and [`SegmentList`] hold the process-wide state a link
//! accumulates; [`rel::decode_unit`] feeds units into them, [`resolve`] folds
//! the resulting pending relocations into fixups, and the `omf` and `script`
//! modules drive the output container and the link-script front end
//! respectively.
//!
//! # Example
//! ```no_run
//! use merlin_link::{SegmentList, SymbolTable};
//!
//! let mut symbols = SymbolTable::new();
//! let mut segments = SegmentList::new();
//! let idx = segments.push("CODE", "CODE");
//! let unit = std::fs::read("path/to/unit.l")?;
//! merlin_link::rel::decode_unit(&mut symbols, segments.get_mut(idx), "unit.l", &unit, unit.len())?;
//! # Ok::<(), merlin_link::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;
pub use error::{Error, ErrorKind, Result};

mod symbol;
pub use symbol::{DefineOutcome, DefineScope, Symbol, SymbolId, SymbolTable};

mod reloc;
pub use reloc::{InterReloc, IntraReloc, PendingReloc, Resolution, UnresolvedReloc, Width};

mod segment;
pub use segment::{Segment, SegmentKind, SegmentList};

pub mod rel;

mod resolve;
pub use resolve::{resolve_segment, ResolveOptions, ResolveReport};

mod metadata;
pub use metadata::{AlwaysRel, AppleDoubleMetadata, FileTypeSink, UnitMetadataSource, REL_FILE_TYPE};

pub mod numeric;

pub mod library;

pub mod report;

pub mod omf;

pub mod script;

mod linker;
pub use linker::{Linker, LinkerConfig};
