use thiserror::Error;

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document update conflict: {0}")]
    Conflict(String),

    #[error("Document store unreachable: {0}")]
    Unreachable(String),

    #[error("Unrecognized message: {0}")]
    InvalidMessage(String),

    #[error("Invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },

    #[error("Cache directory not found")]
    NoCacheDirectory,

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

impl HistoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_description() {
        let err = HistoryError::NotFound("0001_abc".into());
        assert_eq!(err.to_string(), "Document not found: 0001_abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HistoryError = json_err.into();
        assert!(matches!(err, HistoryError::Json(_)));
        assert!(!err.is_not_found());
    }
}
