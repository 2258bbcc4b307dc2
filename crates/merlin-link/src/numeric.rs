//! Shared numeric-literal parsing for `-D`, link-script operands, and
//! script-local `=` assignment (spec.md 6): `%` binary, `$` or `0x`/`0X`
//! hex, otherwise base 10. Mirrors `original_source/main.cpp`'s
//! `parse_number`, which accepts both spellings of hex.

use crate::error::{Error, Result};

/// Parse one numeric literal token using the prefix rules shared by every
/// operand position in this crate.
pub fn parse_number(token: &str) -> Result<u32> {
    if let Some(rest) = token.strip_prefix('%') {
        return u32::from_str_radix(rest, 2)
            .map_err(|_| Error::script(format!("'{}' is not a valid binary literal", token)));
    }
    if let Some(rest) = token.strip_prefix('$') {
        return u32::from_str_radix(rest, 16)
            .map_err(|_| Error::script(format!("'{}' is not a valid hex literal", token)));
    }
    if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u32::from_str_radix(rest, 16)
            .map_err(|_| Error::script(format!("'{}' is not a valid hex literal", token)));
    }
    token
        .parse::<u32>()
        .map_err(|_| Error::script(format!("'{}' is not a valid number", token)))
}

/// Parse a `key[=value]` definition, as used by `-D` (spec.md 6): a bare
/// key with no `=` defines value `1`.
pub fn parse_define(spec: &str) -> Result<(String, u32)> {
    match spec.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), parse_number(value)?)),
        None => Ok((spec.to_string(), 1)),
    }
}

/// Normalize a path operand: `:` is an equivalent separator to `/`
/// (spec.md 6).
pub fn normalize_path(token: &str) -> String {
    token.replace(':', "/")
}
