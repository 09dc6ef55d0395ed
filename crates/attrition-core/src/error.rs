use serde::Serialize;
use thiserror::Error;

use crate::schema::Variant;

/// Errors surfaced at the request boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttritionError {
    /// A record is malformed. Rejects the whole call.
    #[error("record {record}: field '{field}' {reason}")]
    Validation {
        record: usize,
        field: String,
        reason: String,
    },

    #[error("{variant} model is unavailable: {reason}")]
    ServiceUnavailable { variant: Variant, reason: String },

    #[error("unknown feature '{feature}' for {variant} model")]
    UnknownFeature { variant: Variant, feature: String },

    /// Any other failure while preprocessing, predicting or explaining.
    #[error("computation failed: {0}")]
    Computation(String),
}

pub type Result<T> = std::result::Result<T, AttritionError>;

impl AttritionError {
    pub fn validation(record: usize, field: impl Into<String>, reason: impl Into<String>) -> Self {
        AttritionError::Validation {
            record,
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(variant: Variant, reason: impl Into<String>) -> Self {
        AttritionError::ServiceUnavailable {
            variant,
            reason: reason.into(),
        }
    }

    /// Short machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AttritionError::Validation { .. } => "validation_error",
            AttritionError::ServiceUnavailable { .. } => "service_unavailable",
            AttritionError::UnknownFeature { .. } => "unknown_feature",
            AttritionError::Computation(_) => "computation_error",
        }
    }

    /// HTTP-equivalent status code for a transport layer to forward.
    pub fn status_code(&self) -> u16 {
        match self {
            AttritionError::Validation { .. } => 400,
            AttritionError::UnknownFeature { .. } => 404,
            AttritionError::ServiceUnavailable { .. } => 503,
            AttritionError::Computation(_) => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (record_index, field) = match self {
            AttritionError::Validation { record, field, .. } => (Some(*record), Some(field.clone())),
            _ => (None, None),
        };
        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status: self.status_code(),
            record_index,
            field,
        }
    }
}

impl From<ndarray::ShapeError> for AttritionError {
    fn from(err: ndarray::ShapeError) -> Self {
        AttritionError::Computation(format!("matrix shape error: {}", err))
    }
}

/// Structured error body produced at the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&AttritionError> for ErrorResponse {
    fn from(err: &AttritionError) -> Self {
        err.to_response()
    }
}
