use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelpdeskError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("AI error: {0}")]
    AI(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{operation} failed: {source}")]
    Context {
        operation: &'static str,
        #[source]
        source: Box<HelpdeskError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by the task runner and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Dependency,
    NotFound,
    Configuration,
}

impl HelpdeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HelpdeskError::Validation(_) | HelpdeskError::AlreadyExists { .. } => {
                ErrorKind::Validation
            }
            HelpdeskError::NotFound { .. } => ErrorKind::NotFound,
            HelpdeskError::Configuration(_) => ErrorKind::Configuration,
            HelpdeskError::Context { source, .. } => source.kind(),
            HelpdeskError::Storage(_)
            | HelpdeskError::VectorStore(_)
            | HelpdeskError::AI(_)
            | HelpdeskError::Email(_)
            | HelpdeskError::Internal(_)
            | HelpdeskError::Other(_) => ErrorKind::Dependency,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Dependency
    }

    /// Wraps the error with the name of the operation that produced it.
    pub fn context(self, operation: &'static str) -> Self {
        HelpdeskError::Context {
            operation,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &HelpdeskError {
        match self {
            HelpdeskError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| e.context(operation))
    }
}

pub type Result<T> = std::result::Result<T, HelpdeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_the_underlying_kind() {
        let err = HelpdeskError::Email("smtp down".into()).context("send_reply");
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "send_reply failed: Email error: smtp down");
        assert!(matches!(err.root(), HelpdeskError::Email(_)));
    }

    #[test]
    fn validation_and_configuration_are_not_retried() {
        assert!(!HelpdeskError::Validation("empty body".into()).is_retryable());
        assert!(!HelpdeskError::Configuration("missing key".into()).is_retryable());
        assert!(!HelpdeskError::NotFound {
            entity: "Ticket",
            id: "t1".into()
        }
        .is_retryable());
    }
}
