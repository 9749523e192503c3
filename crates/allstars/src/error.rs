use thiserror::Error;

/// Errors raised while building, fitting and searching over candidate models.
#[derive(Debug, Error)]
pub enum AllstarsError {
    /// Estimator family name that the catalog does not know for this problem kind.
    #[error("Unsupported model: '{0}'")]
    UnsupportedModel(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("'{operation}' terminated since it did not finish in {limit} second(s).")]
    FitTimeout { operation: String, limit: u64 },

    #[error("'{operation}' terminated since it did not finish in {limit} second(s).")]
    TrialTimeout { operation: String, limit: u64 },

    #[error("{model} does not support {capability}")]
    CapabilityUnavailable {
        model: String,
        capability: &'static str,
    },

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// An estimator backend failed to fit or predict.
    #[error("Estimator failure: {0}")]
    Estimator(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No fitted models are registered")]
    EmptyRegistry,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl AllstarsError {
    /// Failures that only cost the current trial. Everything else aborts the search.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AllstarsError::FitTimeout { .. }
                | AllstarsError::TrialTimeout { .. }
                | AllstarsError::Estimator(_)
                | AllstarsError::Cancelled
        )
    }

    pub(crate) fn estimator<E: std::fmt::Display>(err: E) -> Self {
        AllstarsError::Estimator(err.to_string())
    }

    pub(crate) fn invalid<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        AllstarsError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AllstarsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation_and_bound() {
        let err = AllstarsError::FitTimeout {
            operation: "classifier.fit".to_string(),
            limit: 60,
        };
        assert_eq!(
            err.to_string(),
            "'classifier.fit' terminated since it did not finish in 60 second(s)."
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        assert!(!AllstarsError::UnsupportedModel("Foo".into()).is_recoverable());
        assert!(!AllstarsError::ShapeMismatch { expected: 3, actual: 2 }.is_recoverable());
        assert!(!AllstarsError::EmptyRegistry.is_recoverable());
    }
}
