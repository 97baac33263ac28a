//! Error taxonomy, severity model and the replaceable error handler.

use std::fmt;
use std::io;

/// Classification of everything that can go wrong while parsing or
/// producing a chunk stream. The taxonomy is severity-independent: the
/// same kind may surface as a warning in one format and an error in
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("invalid chunk or group size")]
    InvalidBlockSize,
    #[error("illegal chunk or group identifier")]
    InvalidBlockId,
    #[error("extra data present at end of stream")]
    ExtraData,
    #[error("invalid nesting of groups or chunks")]
    InvalidNesting,
    #[error("stream signature does not match this format")]
    InvalidStreamSignature,
    #[error("corrupt data in stream")]
    CorruptStream,
    #[error("invalid, missing or corrupt chunk header")]
    InvalidHeader,
    #[error("i/o error while accessing stream")]
    Io,
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("chunk or group was never closed")]
    BlockNeverClosed,
    #[error("data written outside an open chunk")]
    InvalidWriteState,
    #[error("accessor called in an illegal reader state")]
    InvalidState,
    #[error("invalid line ending in text stream")]
    InvalidLineEnding,
    #[error("invalid line length in text stream")]
    InvalidLineLength,
    #[error("invalid attribute name")]
    InvalidAttributeName,
    #[error("invalid attribute value")]
    InvalidAttributeValue,
}

/// Byte position within the underlying stream, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    offset: Option<u64>,
}

impl Location {
    pub fn at(offset: u64) -> Self {
        Location {
            offset: Some(offset),
        }
    }

    pub fn unknown() -> Self {
        Location { offset: None }
    }

    #[inline]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "offset {:#x}", offset),
            None => f.write_str("unknown offset"),
        }
    }
}

/// An error raised by the engine, a format hook or the underlying stream.
///
/// Carries the taxonomy kind, an optional human detail, the stream
/// location where the condition was detected and the originating i/o
/// error if there was one.
#[derive(Debug)]
pub struct StreamError {
    kind: ErrorKind,
    detail: Option<String>,
    location: Option<Location>,
    source: Option<io::Error>,
}

impl StreamError {
    pub fn new(kind: ErrorKind) -> Self {
        StreamError {
            kind,
            detail: None,
            location: None,
            source: None,
        }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        StreamError {
            kind,
            detail: Some(detail.into()),
            location: None,
            source: None,
        }
    }

    pub fn caused_by(kind: ErrorKind, source: io::Error, location: Location) -> Self {
        StreamError {
            kind,
            detail: None,
            location: Some(location),
            source: Some(source),
        }
    }

    /// Attaches a stream location, keeping everything else.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    #[inline]
    pub fn location(&self) -> Option<Location> {
        self.location
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Severity a condition was reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable oddity; parsing continues untouched.
    Warning,
    /// Spec violation the format can step over.
    Error,
    /// Parsing cannot continue.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        })
    }
}

/// Receives conditions as they are detected.
///
/// Warnings and errors are ignored by default and parsing continues; a
/// handler escalates by returning the error back as `Err`. Fatal
/// conditions are always propagated by the engine, the handler only gets
/// a chance to observe or wrap them.
pub trait ErrorHandler {
    fn warning(&mut self, error: StreamError) -> Result<(), StreamError> {
        tracing::warn!(%error, "stream warning");
        Ok(())
    }

    fn error(&mut self, error: StreamError) -> Result<(), StreamError> {
        tracing::warn!(%error, "recoverable stream error");
        Ok(())
    }

    fn fatal(&mut self, error: StreamError) -> StreamError {
        error
    }
}

/// Handler used when the caller does not install one.
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl ErrorHandler for DefaultHandler {}
