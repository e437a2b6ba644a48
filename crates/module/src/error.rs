//! Auction module error types.

use thiserror::Error;

use auction_types::TaskId;

/// Broad class of a rejection, used by callers to decide whether a new
/// attempt can make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameters or wrong timing. Never retried automatically.
    Validation,
    /// Caller lacks the role the entry point requires.
    Authorization,
    /// The call conflicts with recorded state (duplicate, already closed).
    /// Retrying the same call cannot succeed.
    StateConflict,
    /// Referenced record does not exist.
    NotFound,
}

impl ErrorKind {
    /// Stable numeric code used on the RPC surface.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Validation => 1,
            ErrorKind::Authorization => 2,
            ErrorKind::StateConflict => 3,
            ErrorKind::NotFound => 4,
        }
    }
}

/// Errors that can occur in the auction module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    // === Auction ledger ===
    #[error("Auction already active for pool")]
    AuctionAlreadyActive,

    #[error("End time {end_time} is not after current time {now}")]
    EndTimeNotInFuture { end_time: u64, now: u64 },

    #[error("Max winners must be greater than zero")]
    InvalidMaxWinners,

    #[error("No auction configured for pool")]
    NoAuction,

    #[error("Auction not active")]
    AuctionNotActive,

    #[error("Auction has not ended")]
    AuctionNotEnded,

    #[error("Bidding period ended")]
    BiddingEnded,

    #[error("Bidder not eligible to participate")]
    BidderNotEligible,

    #[error("Already submitted bid")]
    AlreadyBid,

    #[error("Too many winners: max {max}, got {got}")]
    TooManyWinners { max: u32, got: usize },

    #[error("Winner listed more than once")]
    DuplicateWinner,

    #[error("Winner has no bid on this auction")]
    UnknownBidder,

    #[error("Ready-to-settle signal already emitted")]
    AlreadySignalled,

    #[error("Caller is not a winner")]
    NotWinner,

    #[error("Outside priority window")]
    OutsidePriorityWindow,

    #[error("Winner allocation already executed")]
    AlreadyExecuted,

    // === Operator registry ===
    #[error("Operator already registered")]
    AlreadyRegistered,

    #[error("Insufficient stake: need {required}, got {got}")]
    InsufficientStake { required: u64, got: u64 },

    #[error("Operator not registered")]
    NotRegistered,

    // === Task coordinator ===
    #[error("No active operators")]
    NoOperators,

    #[error("Operator not registered")]
    OperatorNotRegistered,

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task already completed: {0}")]
    TaskAlreadyCompleted(TaskId),

    #[error("Operator already responded to task")]
    DuplicateResponse,

    #[error("Commitment does not match submitted winners")]
    CommitmentMismatch,

    #[error("Quorum not reached: best {best}, need {required}")]
    QuorumNotReached { best: u64, required: u64 },

    #[error("Task does not exist: {0}")]
    TaskDoesNotExist(TaskId),

    #[error("Challenge window closed")]
    ChallengeWindowClosed,

    #[error("Operator did not respond to task")]
    InvalidResponse,

    #[error("Operator already challenged for task")]
    AlreadyChallenged,

    // === Authorization ===
    #[error("Not authorized")]
    NotAuthorized,
}

impl ModuleError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use ModuleError::*;
        match self {
            AlreadyBid | AlreadySignalled | AlreadyExecuted | AlreadyRegistered
            | TaskAlreadyCompleted(_) | DuplicateResponse | AlreadyChallenged
            | AuctionNotActive => ErrorKind::StateConflict,

            NotAuthorized | BidderNotEligible | NotWinner | NotRegistered
            | OperatorNotRegistered => ErrorKind::Authorization,

            NoAuction | TaskNotFound(_) | TaskDoesNotExist(_) | UnknownBidder => {
                ErrorKind::NotFound
            }

            AuctionAlreadyActive | EndTimeNotInFuture { .. } | InvalidMaxWinners
            | AuctionNotEnded | BiddingEnded
            | TooManyWinners { .. } | DuplicateWinner | OutsidePriorityWindow
            | InsufficientStake { .. } | NoOperators | CommitmentMismatch
            | QuorumNotReached { .. } | ChallengeWindowClosed | InvalidResponse => {
                ErrorKind::Validation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ModuleError::AlreadyBid.kind(), ErrorKind::StateConflict);
        assert_eq!(ModuleError::DuplicateResponse.kind(), ErrorKind::StateConflict);
        assert_eq!(ModuleError::NotAuthorized.kind(), ErrorKind::Authorization);
        assert_eq!(ModuleError::AuctionNotEnded.kind(), ErrorKind::Validation);
        assert_eq!(ModuleError::AuctionAlreadyActive.kind(), ErrorKind::Validation);
        assert_eq!(ModuleError::AuctionAlreadyActive.kind().code(), 1);
        assert_eq!(ModuleError::TaskNotFound(3).kind(), ErrorKind::NotFound);
    }
}
