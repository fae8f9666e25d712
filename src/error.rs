//! Error types for the PDF toolkit

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;
use crate::pdf::ObjectType;

/// Main error type for PDF object model and serialization operations
#[derive(Error, Debug)]
pub enum PDFToolkitError {
    /// Required dictionary entry absent at read time
    #[error("Required dictionary key not found: /{0}")]
    KeyNotFound(String),

    /// Memory allocation error
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Unknown or unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported feature or parameter combination
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Encoded payload could not be decoded
    #[error("Corrupt {filter} stream data: {message}")]
    CorruptStream {
        filter: &'static str,
        message: String,
    },

    /// Compression error
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: ObjectType,
        found: ObjectType,
    },

    /// Direct object used where an indirect one is required
    #[error("{0} object is direct and has no object id")]
    NotIndirect(ObjectType),

    /// Null handle dereferenced
    #[error("Null handle dereferenced")]
    NullHandle,

    /// Object has no live owning document
    #[error("Object is not attached to a live document")]
    DetachedObject,

    /// Owning insertion would close a reference cycle
    #[error("Inserting /{0} would create an ownership cycle")]
    CycleDetected(String),

    /// Indirect object owned by a different document
    #[error("{0} object belongs to another document")]
    ForeignObject(ObjectType),

    /// Object id counter overflowed
    #[error("Object id space exhausted")]
    IdSpaceExhausted,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type for PDF toolkit operations
pub type PDFToolkitResult<T> = Result<T, PDFToolkitError>;

impl PDFToolkitError {
    /// Create a new corrupt stream error
    pub fn corrupt(filter: &'static str, msg: impl Into<String>) -> Self {
        Self::CorruptStream {
            filter,
            message: msg.into(),
        }
    }

    /// Create a new unsupported feature error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFeature(msg.into())
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: ObjectType, found: ObjectType) -> Self {
        Self::InvalidObjectType { expected, found }
    }

    /// Check if error is an unsupported feature or codec failure
    pub fn is_unsupported_feature(&self) -> bool {
        matches!(self,
            Self::UnsupportedFilter(_) |
            Self::UnsupportedFeature(_) |
            Self::CorruptStream { .. } |
            Self::CompressionError(_)
        )
    }

    /// Check if error is related to object graph structure
    pub fn is_structure_error(&self) -> bool {
        matches!(self,
            Self::KeyNotFound(_) |
            Self::InvalidObjectType { .. } |
            Self::NotIndirect(_) |
            Self::NullHandle |
            Self::DetachedObject |
            Self::CycleDetected(_) |
            Self::ForeignObject(_)
        )
    }

    /// Check if error was surfaced by the byte sink
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::IoError(_))
    }
}

impl From<TryReserveError> for PDFToolkitError {
    fn from(err: TryReserveError) -> Self {
        Self::OutOfMemory(err.to_string())
    }
}
