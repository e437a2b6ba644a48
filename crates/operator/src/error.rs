//! Operator pipeline errors.

use auction_crypto::OracleError;
use auction_module::ModuleError;
use auction_types::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperatorError {
    /// Transport or decoding failure talking to the chain.
    #[error("Chain request failed: {0}")]
    Chain(String),

    /// The chain rejected a call.
    #[error("Call rejected by chain (code {code}): {message}")]
    Rejected { code: i32, message: String },

    /// An in-process chain rejected a call.
    #[error("Call rejected: {0}")]
    Module(#[from] ModuleError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Auction {0} referenced by task is not the pool's current auction")]
    AuctionMismatch(u64),

    #[error("Timed out waiting for task {0} to complete")]
    Timeout(TaskId),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<jsonrpsee::core::ClientError> for OperatorError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        match err {
            jsonrpsee::core::ClientError::Call(obj) => OperatorError::Rejected {
                code: obj.code(),
                message: obj.message().to_string(),
            },
            other => OperatorError::Chain(other.to_string()),
        }
    }
}

impl OperatorError {
    /// Failures worth retrying: the chain may accept the same call later.
    /// Rejections are deterministic and are not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperatorError::Chain(_))
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(OperatorError::Chain("connection reset".into()).is_transient());
        assert!(!OperatorError::Module(ModuleError::DuplicateResponse).is_transient());
        assert!(!OperatorError::Rejected {
            code: -32003,
            message: "Task already completed".into(),
        }
        .is_transient());
        assert!(!OperatorError::AuctionMismatch(1).is_transient());
    }
}
