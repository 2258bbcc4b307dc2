//! `sysexits.h`-style process exit codes (spec.md 6). Rust has no
//! `sysexits.h`, so the handful of values `original_source/main.cpp`
//! actually returns are named here as constants.

/// The command line itself was malformed.
pub const EX_USAGE: i32 = 64;
/// An input file was missing, unreadable, or malformed, or a link script
/// accumulated ten or more errors.
pub const EX_DATAERR: i32 = 65;
/// The output file could not be written.
pub const EX_OSERR: i32 = 71;
