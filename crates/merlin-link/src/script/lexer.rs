//! Turns one link-script source line into `(label, opcode, operands)`
//! (spec.md 1: "the tokenizer/parser ... referenced only through their
//! interfaces"). This is deliberately small: the grammar is "optional
//! label, opcode mnemonic, whitespace-separated operands" (spec.md 6),
//! and the only subtlety is telling a label from an opcode — a line's
//! first token is the opcode if it resolves as one (`DO 0`, `LKV 2`);
//! otherwise it's a label and the second token must be the opcode
//! (`X GEQ 5`, `FOO POS`), matching `EQ`/`EQU`/`GEQ`/`POS`/`LEN`/`EXT`'s
//! assembler-style "label column" (DESIGN.md).

use crate::error::{Error, Result};
use crate::numeric::{normalize_path, parse_number};

use super::opcode::Opcode;

/// One lexed script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// The label column, if the line had non-blank leading text.
    pub label: Option<String>,
    /// The resolved opcode.
    pub opcode: Opcode,
    /// Whitespace-separated operand tokens, in order.
    pub operands: Vec<String>,
}

/// Lex a single non-blank line. Trailing whitespace should already be
/// stripped by the caller (spec.md 6: "Trailing whitespace is stripped").
pub fn lex_line(line: &str) -> Result<ParsedLine> {
    let mut tokens = line.split_whitespace();

    let first = tokens
        .next()
        .ok_or_else(|| Error::script("blank line reached the lexer"))?;

    let (label, opcode, rest) = if let Some(opcode) = resolve_opcode(first) {
        (None, opcode, tokens)
    } else {
        let opcode_token = tokens
            .next()
            .ok_or_else(|| Error::script(format!("unknown opcode '{}'", first)))?;
        let opcode = resolve_opcode(opcode_token)
            .ok_or_else(|| Error::script(format!("unknown opcode '{}'", opcode_token)))?;
        (Some(first.to_string()), opcode, tokens)
    };

    let operands = rest.map(str::to_string).collect();
    Ok(ParsedLine {
        label,
        opcode,
        operands,
    })
}

fn resolve_opcode(token: &str) -> Option<Opcode> {
    if token == "=" {
        return Some(Opcode::Eq);
    }
    Opcode::from_mnemonic(token)
}

/// A cursor over one line's operand tokens, used by opcode handlers to
/// pull arguments in order without indexing by hand.
#[derive(Debug, Clone, Copy)]
pub struct OperandCursor<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> OperandCursor<'a> {
    /// Start a cursor at the first operand token.
    pub fn new(tokens: &'a [String]) -> Self {
        OperandCursor { tokens, pos: 0 }
    }

    /// True once every operand token has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// The next raw token, if any.
    pub fn next_token(&mut self) -> Option<&'a str> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok.as_str())
    }

    /// The next token, required.
    pub fn require_token(&mut self, what: &str) -> Result<&'a str> {
        self.next_token()
            .ok_or_else(|| Error::script(format!("missing {} operand", what)))
    }

    /// The next token parsed as a number (spec.md 6 prefix rules).
    pub fn next_number(&mut self, what: &str) -> Result<u32> {
        let tok = self.require_token(what)?;
        parse_number(tok)
    }

    /// The next token as a path, with `:` normalized to `/`.
    pub fn next_path(&mut self, what: &str) -> Result<String> {
        let tok = self.require_token(what)?;
        Ok(normalize_path(tok))
    }
}
