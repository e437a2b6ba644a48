//! Call message types for the auction module.

use auction_types::{Address, Commitment, EncryptedHandle, PoolId, TaskId, WinnerEntry};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Call messages for the auction module.
///
/// Every state-changing entry point is one variant. The caller is always
/// `CallContext::sender`; stake is carried in `CallContext::value`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ModuleCall {
    // === Auction Ledger ===
    /// Open an auction for a pool (configurer only).
    CreateAuction {
        pool_id: PoolId,
        end_time: u64,
        priority_window_duration: u64,
        min_bid_amount: u64,
        max_winners: u32,
    },

    /// Submit a sealed bid.
    SubmitBid {
        pool_id: PoolId,
        encrypted_amount: EncryptedHandle,
    },

    /// Settle with an externally agreed winner set (settlement authority only).
    Settle {
        pool_id: PoolId,
        winners: Vec<WinnerEntry>,
    },

    /// Announce that an auction has ended (permissionless).
    SignalReady { pool_id: PoolId },

    /// Mark the caller's winning allocation as executed.
    RecordExecution { pool_id: PoolId },

    // === Operator Registry ===
    /// Register the caller as an operator, staking the attached value.
    Register,

    /// Leave the operator set and withdraw remaining stake.
    Deregister,

    /// Slash an operator (configurer only).
    Slash {
        operator: Address,
        amount: u64,
        reason: String,
    },

    // === Task Coordinator ===
    /// Open a settlement task for an ended auction (configurer only).
    CreateTask { pool_id: PoolId, total_bidders: u32 },

    /// Vote for a winner set.
    Respond {
        task_id: TaskId,
        winners: Vec<WinnerEntry>,
        commitment: Commitment,
    },

    /// Complete a task whose quorum is already met.
    CompleteTask { task_id: TaskId },

    /// Challenge an operator's response within the challenge window.
    Challenge {
        task_id: TaskId,
        operator: Address,
        proof: Vec<u8>,
    },
}

impl ModuleCall {
    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleCall::CreateAuction { .. } => "create_auction",
            ModuleCall::SubmitBid { .. } => "submit_bid",
            ModuleCall::Settle { .. } => "settle",
            ModuleCall::SignalReady { .. } => "signal_ready",
            ModuleCall::RecordExecution { .. } => "record_execution",
            ModuleCall::Register => "register",
            ModuleCall::Deregister => "deregister",
            ModuleCall::Slash { .. } => "slash",
            ModuleCall::CreateTask { .. } => "create_task",
            ModuleCall::Respond { .. } => "respond",
            ModuleCall::CompleteTask { .. } => "complete_task",
            ModuleCall::Challenge { .. } => "challenge",
        }
    }
}
