//! A single error type shared by every stage of the pipeline.
//!
//! Mirrors the shape used by the teacher's CLI crates: one opaque `Error`
//! struct wrapping a private enum, with a public `kind()` accessor so callers
//! can branch on the failure category without matching on the message text.

use std::fmt;
use std::io;

use crate::token::Position;

/// The `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The category of an [`Error`], exposed so callers (in particular the
/// driver, which must map failures to exit codes) can distinguish them
/// without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lexical error: bad token, unterminated literal, directive misuse.
    Lexical,
    /// Syntactic error: parser could not build an AST.
    Syntactic,
    /// Semantic error: type mismatch, undefined identifier, and similar.
    Semantic,
    /// Malformed WOF/EXE binary data.
    Object,
    /// Link-time failure: undefined symbol, duplicate global, bad relocation.
    Link,
    /// Underlying I/O failure.
    Io,
}

#[derive(Debug)]
enum Inner {
    Diagnosed {
        kind: ErrorKind,
        pos: Option<Position>,
        message: String,
    },
    Io(io::Error),
}

/// An error produced by any stage of the pipeline.
#[derive(Debug)]
pub struct Error {
    inner: Inner,
}

impl Error {
    fn diagnosed(kind: ErrorKind, pos: Option<Position>, message: impl Into<String>) -> Self {
        Error {
            inner: Inner::Diagnosed {
                kind,
                pos,
                message: message.into(),
            },
        }
    }

    /// A lexical error at a known source position.
    pub fn lexical(pos: Position, message: impl Into<String>) -> Self {
        Self::diagnosed(ErrorKind::Lexical, Some(pos), message)
    }

    /// A syntactic error at a known source position.
    pub fn syntactic(pos: Position, message: impl Into<String>) -> Self {
        Self::diagnosed(ErrorKind::Syntactic, Some(pos), message)
    }

    /// A semantic error at a known source position.
    pub fn semantic(pos: Position, message: impl Into<String>) -> Self {
        Self::diagnosed(ErrorKind::Semantic, Some(pos), message)
    }

    /// A malformed-object-file error, generally without a source position.
    pub fn object(message: impl Into<String>) -> Self {
        Self::diagnosed(ErrorKind::Object, None, message)
    }

    /// A link-time error.
    pub fn link(message: impl Into<String>) -> Self {
        Self::diagnosed(ErrorKind::Link, None, message)
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            Inner::Diagnosed { kind, .. } => *kind,
            Inner::Io(_) => ErrorKind::Io,
        }
    }

    /// The source position this error was diagnosed at, if any.
    pub fn position(&self) -> Option<&Position> {
        match &self.inner {
            Inner::Diagnosed { pos, .. } => pos.as_ref(),
            Inner::Io(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Diagnosed {
                pos: Some(pos),
                message,
                ..
            } => write!(f, "{}:{}: error: {}", pos.file, pos.line, message),
            Inner::Diagnosed {
                pos: None, message, ..
            } => write!(f, "error: {}", message),
            Inner::Io(e) => write!(f, "error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner {
            Inner::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error { inner: Inner::Io(e) }
    }
}
