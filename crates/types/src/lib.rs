//! Core type definitions for quorum-settled sealed-bid auctions.
//!
//! This crate provides the shared data structures used across the auction system:
//! the ledger records (auction configs, bids, winners), the operator registry
//! entries, and the task/vote records exchanged between operators and the
//! task coordinator.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use sha2::{Digest, Sha256};

// =========================
// IDENTIFIERS
// =========================

/// Generic address type (32 bytes)
pub type Address = [u8; 32];

/// Identifier of a tradable pool (32 bytes)
pub type PoolId = [u8; 32];

/// Content digest of a proposed winner set
pub type Commitment = [u8; 32];

/// Task identifier, allocated sequentially by the coordinator
pub type TaskId = u64;

/// Default share of active operators that must agree on one commitment.
pub const DEFAULT_QUORUM_THRESHOLD_PERCENTAGE: u8 = 67;

/// Allocations are expressed in basis points of the auctioned supply.
pub const ALLOCATION_BASIS_POINTS: u64 = 10_000;

/// Reason attached to slashes raised through a successful challenge.
pub const CHALLENGE_SLASH_REASON: &str = "challenge: incorrect settlement response";

/// Opaque handle to a value sealed by the encryption oracle.
#[serde_as]
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct EncryptedHandle(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 32]);

impl EncryptedHandle {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// =========================
// AUCTION LEDGER
// =========================

/// Auction configuration for one pool.
///
/// At most one config per pool is active at a time. A config is never
/// deleted; once inactive it is superseded by the next one created for the
/// same pool.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub auction_id: u64,
    pub pool_id: PoolId,
    pub end_time: u64,
    pub priority_window_duration: u64,
    pub min_bid_amount: u64,
    pub max_winners: u32,
    pub is_active: bool,
    pub created_at: u64,
    /// Set when the winner set is written.
    pub settled_at: Option<u64>,
}

impl AuctionConfig {
    /// Bidding is closed once `now` reaches `end_time`.
    pub fn has_ended(&self, now: u64) -> bool {
        now >= self.end_time
    }

    pub fn is_settled(&self) -> bool {
        !self.is_active && self.settled_at.is_some()
    }

    /// True iff the auction is settled and `now` lies in
    /// `[end_time, end_time + priority_window_duration)`.
    pub fn in_priority_window(&self, now: u64) -> bool {
        self.is_settled()
            && now >= self.end_time
            && now < self.end_time.saturating_add(self.priority_window_duration)
    }
}

/// A sealed bid, keyed by (auction, bidder).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Bid {
    pub bidder: Address,
    pub encrypted_amount: EncryptedHandle,
    pub timestamp: u64,
    pub is_winner: bool,
    pub has_executed: bool,
}

/// Winner flag plus allocation, written once at settlement.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct WinnerRecord {
    pub is_winner: bool,
    pub allocation: u64,
}

/// One entry of a proposed winner set.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WinnerEntry {
    pub bidder: Address,
    pub amount: u64,
    pub allocation: u64,
}

// =========================
// OPERATOR REGISTRY
// =========================

/// A staked operator.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Operator {
    pub address: Address,
    pub is_active: bool,
    /// Currently bonded stake. Only decreases, through slashing or withdrawal.
    pub stake: u64,
    /// Stake deposited at registration.
    pub deposited_stake: u64,
    pub responses_submitted: u64,
    /// Cumulative amount forfeited through slashing.
    pub slashed_amount: u64,
    pub registered_at: u64,
}

/// Auditable record of a slash.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SlashRecord {
    pub operator: Address,
    pub amount: u64,
    pub reason: String,
    pub timestamp: u64,
}

// =========================
// TASK COORDINATION
// =========================

/// Task lifecycle. A task that never reaches quorum stays `Open`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum TaskStatus {
    Open,
    Completed,
}

/// A settlement task referencing one auction.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub pool_id: PoolId,
    pub auction_id: u64,
    pub total_bidders: u32,
    pub created_at: u64,
    pub created_block: u64,
    pub quorum_threshold_percentage: u8,
    pub completed: bool,
    pub completed_at: Option<u64>,
    pub agreed_commitment: Option<Commitment>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        if self.completed {
            TaskStatus::Completed
        } else {
            TaskStatus::Open
        }
    }
}

/// One operator's answer to a task. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: TaskId,
    pub operator: Address,
    pub commitment: Commitment,
    pub winners_count: u32,
    pub submitted_at: u64,
}

/// Votes accumulated by one commitment within a task. Never decremented.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VoteTally {
    pub commitment: Commitment,
    pub votes: u64,
    pub stake_weight: u64,
    /// Per-task sequence number of the vote that produced the current count.
    pub last_vote_seq: u64,
    /// Winner set proposed by the first operator to submit this commitment.
    pub winners: Vec<WinnerEntry>,
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Compute the commitment over an ordered winner list.
///
/// The digest is order-sensitive and covers bidder, amount and allocation of
/// every entry, so identical outcomes hash identically on every operator.
pub fn compute_winner_commitment(winners: &[WinnerEntry]) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(b"AUCTION_WINNERS_V1:");
    hasher.update((winners.len() as u64).to_le_bytes());
    for winner in winners {
        hasher.update(winner.bidder);
        hasher.update(winner.amount.to_le_bytes());
        hasher.update(winner.allocation.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Votes a single commitment needs before a task completes.
///
/// `floor(active_operators * percentage / 100)`, never less than one vote.
pub fn required_votes(active_operators: u64, quorum_threshold_percentage: u8) -> u64 {
    let floor = active_operators.saturating_mul(quorum_threshold_percentage as u64) / 100;
    floor.max(1)
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Short hex form of an address for log fields.
pub fn short_hex(bytes: &[u8; 32]) -> String {
    hex::encode(&bytes[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: u8, amount: u64, allocation: u64) -> WinnerEntry {
        WinnerEntry {
            bidder: [tag; 32],
            amount,
            allocation,
        }
    }

    #[test]
    fn test_commitment_is_deterministic() {
        let winners = vec![entry(1, 300, 6000), entry(2, 200, 4000)];
        assert_eq!(
            compute_winner_commitment(&winners),
            compute_winner_commitment(&winners.clone())
        );
    }

    #[test]
    fn test_commitment_is_order_sensitive() {
        let a = entry(1, 300, 5000);
        let b = entry(2, 300, 5000);
        assert_ne!(
            compute_winner_commitment(&[a.clone(), b.clone()]),
            compute_winner_commitment(&[b, a])
        );
    }

    #[test]
    fn test_commitment_covers_allocation() {
        assert_ne!(
            compute_winner_commitment(&[entry(1, 300, 6000)]),
            compute_winner_commitment(&[entry(1, 300, 5999)])
        );
    }

    #[test]
    fn test_required_votes() {
        assert_eq!(required_votes(3, 67), 2);
        assert_eq!(required_votes(4, 67), 2);
        assert_eq!(required_votes(10, 67), 6);
        assert_eq!(required_votes(1, 67), 1);
        assert_eq!(required_votes(0, 67), 1);
        assert_eq!(required_votes(5, 100), 5);
    }

    #[test]
    fn test_priority_window() {
        let mut config = AuctionConfig {
            auction_id: 1,
            pool_id: [7u8; 32],
            end_time: 1000,
            priority_window_duration: 300,
            min_bid_amount: 1,
            max_winners: 3,
            is_active: true,
            created_at: 0,
            settled_at: None,
        };
        assert!(!config.in_priority_window(1100));

        config.is_active = false;
        config.settled_at = Some(1050);
        assert!(!config.in_priority_window(999));
        assert!(config.in_priority_window(1000));
        assert!(config.in_priority_window(1299));
        assert!(!config.in_priority_window(1300));
    }

    #[test]
    fn test_handle_serializes_as_hex() {
        let handle = EncryptedHandle([0xab; 32]);
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let decoded: EncryptedHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, handle);
    }

    #[test]
    fn test_task_status() {
        let mut task = Task {
            task_id: 1,
            pool_id: [0u8; 32],
            auction_id: 1,
            total_bidders: 3,
            created_at: 0,
            created_block: 0,
            quorum_threshold_percentage: DEFAULT_QUORUM_THRESHOLD_PERCENTAGE,
            completed: false,
            completed_at: None,
            agreed_commitment: None,
        };
        assert_eq!(task.status(), TaskStatus::Open);
        task.completed = true;
        assert_eq!(task.status(), TaskStatus::Completed);
    }
}
