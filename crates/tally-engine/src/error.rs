use serde::Serialize;
use thiserror::Error;

use tally_xlsx::XlsxError;

/// Stable tag reported to callers alongside an error message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    FormatError,
    InvalidRangeError,
    CapacityError,
    UnknownTemplateError,
    AnchorMissingError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FormatError => "FormatError",
            ErrorKind::InvalidRangeError => "InvalidRangeError",
            ErrorKind::CapacityError => "CapacityError",
            ErrorKind::UnknownTemplateError => "UnknownTemplateError",
            ErrorKind::AnchorMissingError => "AnchorMissingError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The input could not be read as a workbook, or the result could not be written.
    #[error("{0}")]
    Format(String),
    #[error("invalid {field}: {detail}")]
    InvalidRange { field: &'static str, detail: String },
    #[error("bag count {requested} is outside 1..={max}")]
    Capacity { requested: u64, max: u32 },
    #[error("unknown template type {0:?}")]
    UnknownTemplate(String),
    #[error("template {template:?} has no usable {anchor} anchor")]
    AnchorMissing {
        template: String,
        anchor: &'static str,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Format(_) => ErrorKind::FormatError,
            EngineError::InvalidRange { .. } => ErrorKind::InvalidRangeError,
            EngineError::Capacity { .. } => ErrorKind::CapacityError,
            EngineError::UnknownTemplate(_) => ErrorKind::UnknownTemplateError,
            EngineError::AnchorMissing { .. } => ErrorKind::AnchorMissingError,
        }
    }

    pub(crate) fn invalid(field: &'static str, detail: impl Into<String>) -> Self {
        EngineError::InvalidRange {
            field,
            detail: detail.into(),
        }
    }

    /// Name of the request field an [`EngineError::InvalidRange`] refers to.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EngineError::InvalidRange { field, .. } => Some(field),
            EngineError::AnchorMissing { anchor, .. } => Some(anchor),
            _ => None,
        }
    }
}

impl From<XlsxError> for EngineError {
    fn from(err: XlsxError) -> Self {
        EngineError::Format(err.to_string())
    }
}

/// Error shape handed to the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
