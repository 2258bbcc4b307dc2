//! The link-script front end (spec.md 4.4): a small [`lexer`] that turns
//! one source line into a label/opcode/operands triple, the [`state`] a
//! run accumulates, and the [`interp`] loop that dispatches every opcode
//! against a [`crate::Linker`].

pub mod opcode;
pub use opcode::Opcode;

pub mod lexer;
pub use lexer::{lex_line, OperandCursor, ParsedLine};

pub mod state;
pub use state::ScriptState;

pub mod interp;
pub use interp::run;
