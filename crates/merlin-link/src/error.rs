use std::{error, fmt, io};

/// An error that occurred while linking a set of REL units.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    Io(io::Error),
    Decode(String),
    Resolve(String),
    Script(String),
    Write(String),
}

/// The kind of error, used by callers to pick a process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An I/O error occurred opening, mapping, or writing a file.
    Io,
    /// A REL unit was malformed (bad flag bits, truncated records, ...).
    Decode,
    /// An external reference could not be resolved, or a resolved value
    /// violates an invariant (bank-size, alignment, ...).
    Resolve,
    /// A link-script line raised an error (bad opcode, DO/ELS/FIN misuse,
    /// ten accumulated errors, ...).
    Script,
    /// The final artifact could not be written.
    Write,
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Io(e) => e.fmt(f),
            ErrorInner::Decode(e) => f.write_str(e),
            ErrorInner::Resolve(e) => f.write_str(e),
            ErrorInner::Script(e) => f.write_str(e),
            ErrorInner::Write(e) => f.write_str(e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.inner {
            ErrorInner::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error {
            inner: ErrorInner::Io(e),
        }
    }
}

impl Error {
    /// Get the kind of error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::Io(_) => ErrorKind::Io,
            ErrorInner::Decode(_) => ErrorKind::Decode,
            ErrorInner::Resolve(_) => ErrorKind::Resolve,
            ErrorInner::Script(_) => ErrorKind::Script,
            ErrorInner::Write(_) => ErrorKind::Write,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Decode(message.into()),
        }
    }

    pub(crate) fn resolve(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Resolve(message.into()),
        }
    }

    pub(crate) fn script(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Script(message.into()),
        }
    }

    pub(crate) fn write(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorInner::Write(message.into()),
        }
    }
}

/// The `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
