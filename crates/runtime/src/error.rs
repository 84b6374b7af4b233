//! Error types for workspace runtime operations.
//!
//! Collaborators (namespace clients, bootstrappers) return `anyhow::Result`
//! so that unexpected faults can flow upward untouched; the orchestrator
//! classifies them into a [`RuntimeError`] at its single propagation point.

use thiserror::Error;

/// Caller-facing error for start/stop of a workspace runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The cluster rejected an operation or reported its own failure
    /// (quota, conflicts, bad spec). Retrying may succeed.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// An unexpected fault in a collaborator that is not a cluster-side
    /// rejection. Requires investigation rather than retry.
    #[error("internal infrastructure error: {0}")]
    Internal(String),

    /// The start attempt was interrupted while a machine was bootstrapping.
    #[error("workspace start interrupted: {0}")]
    Cancelled(String),
}

impl RuntimeError {
    /// Whether the condition is worth retrying. Infrastructure rejections
    /// and aborted attempts are; internal faults are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::Cancelled(_))
    }

    /// Wrap an unexpected fault as an internal error.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<kube::Error> for RuntimeError {
    fn from(err: kube::Error) -> Self {
        // Anything the cluster client reports is an environment-side
        // condition, including transport failures.
        Self::Infrastructure(err.to_string())
    }
}

/// Classify a collaborator failure. Errors that already carry a
/// [`RuntimeError`] keep their kind; everything else is an unexpected
/// internal condition.
#[must_use]
pub fn classify(err: anyhow::Error) -> RuntimeError {
    match err.downcast::<RuntimeError>() {
        Ok(classified) => classified,
        Err(other) => RuntimeError::Internal(format!("{other:#}")),
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_keeps_already_classified_errors() {
        let err = anyhow::Error::new(RuntimeError::Infrastructure("quota exceeded".into()));
        assert!(matches!(classify(err), RuntimeError::Infrastructure(_)));

        let err = anyhow::Error::new(RuntimeError::Cancelled("interrupted".into()));
        assert!(matches!(classify(err), RuntimeError::Cancelled(_)));
    }

    #[test]
    fn classify_wraps_unexpected_faults_as_internal() {
        let err = anyhow::anyhow!("index out of bounds");
        let classified = classify(err);
        assert!(matches!(classified, RuntimeError::Internal(_)));
        assert!(!classified.is_recoverable());
    }

    #[test]
    fn infrastructure_and_cancelled_are_recoverable() {
        assert!(RuntimeError::Infrastructure("conflict".into()).is_recoverable());
        assert!(RuntimeError::Cancelled("interrupted".into()).is_recoverable());
        assert!(!RuntimeError::internal("bug").is_recoverable());
    }
}
