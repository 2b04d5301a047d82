use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassificationError>;

#[derive(Debug, Error)]
pub enum ClassificationError {
    /// Malformed input or a missing cross-field value. Always names the field.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Referenced id does not exist or is inactive.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClassificationError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} '{id}'"))
    }

    /// Store-level failures may succeed on a second attempt; input errors never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Conflict(_))
    }

    /// Field named by a validation error, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 403,
            Self::Internal(_) => 500,
        }
    }
}

impl From<classification_types::TypeError> for ClassificationError {
    fn from(err: classification_types::TypeError) -> Self {
        Self::Validation {
            field: "document".into(),
            message: err.to_string(),
        }
    }
}
