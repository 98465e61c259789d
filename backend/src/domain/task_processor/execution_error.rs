//! Failure outcomes of one task execution.
//!
//! The processor turns these into a task status and a queue decision, so
//! each variant carries whether a later delivery could succeed.

use crate::domain::ports::{
    CommentRepositoryError, GroupRepositoryError, KeywordRepositoryError, PostRepositoryError,
    VkSourceError,
};

#[derive(Debug)]
pub(super) enum ExecutionError {
    /// VK call failed after in-call retries.
    Vk(VkSourceError),
    /// A repository call failed.
    Storage { message: String, retryable: bool },
    /// The task cannot succeed as specified.
    Rejected(String),
    /// Processor state that should be impossible.
    Internal(String),
}

impl ExecutionError {
    pub(super) fn is_retryable(&self) -> bool {
        match self {
            Self::Vk(error) => error.is_retryable(),
            Self::Storage { retryable, .. } => *retryable,
            Self::Rejected(_) | Self::Internal(_) => false,
        }
    }

    pub(super) fn message(&self) -> String {
        match self {
            Self::Vk(error) => error.to_string(),
            Self::Storage { message, .. } | Self::Rejected(message) | Self::Internal(message) => {
                message.clone()
            }
        }
    }
}

macro_rules! storage_error_from {
    ($($error:ident),+ $(,)?) => {
        $(
            impl From<$error> for ExecutionError {
                fn from(error: $error) -> Self {
                    let retryable = matches!(error, $error::Connection { .. });
                    Self::Storage {
                        message: error.to_string(),
                        retryable,
                    }
                }
            }
        )+
    };
}

storage_error_from!(
    CommentRepositoryError,
    GroupRepositoryError,
    KeywordRepositoryError,
    PostRepositoryError,
);

impl From<VkSourceError> for ExecutionError {
    fn from(error: VkSourceError) -> Self {
        Self::Vk(error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn connection_loss_is_retryable() {
        let error = ExecutionError::from(CommentRepositoryError::connection("pool timed out"));
        assert!(error.is_retryable());
    }

    #[test]
    fn query_failures_are_permanent() {
        let error = ExecutionError::from(PostRepositoryError::query("syntax"));
        assert!(!error.is_retryable());
        assert!(error.message().contains("syntax"));
    }

    #[test]
    fn vk_access_errors_are_permanent() {
        let error = ExecutionError::from(VkSourceError::api(15_i64, "Access denied"));
        assert!(!error.is_retryable());
    }
}
