//! Event log appended by state-changing calls.
//!
//! Off-ledger operators poll the log with a cursor; `TaskCreated` is the
//! notification that starts their pipeline.

use auction_types::{Address, Commitment, PoolId, TaskId};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// An event emitted by the module.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ModuleEvent {
    AuctionCreated {
        pool_id: PoolId,
        auction_id: u64,
        end_time: u64,
    },
    AuctionSuperseded {
        pool_id: PoolId,
        auction_id: u64,
    },
    BidSubmitted {
        pool_id: PoolId,
        auction_id: u64,
        bidder: Address,
    },
    AuctionReadyToSettle {
        pool_id: PoolId,
        auction_id: u64,
        total_bidders: u32,
    },
    AuctionSettled {
        pool_id: PoolId,
        auction_id: u64,
        winners: Vec<Address>,
    },
    BidExecuted {
        pool_id: PoolId,
        bidder: Address,
    },
    OperatorRegistered {
        operator: Address,
        stake: u64,
    },
    OperatorDeregistered {
        operator: Address,
        refund: u64,
    },
    OperatorSlashed {
        operator: Address,
        amount: u64,
        reason: String,
    },
    TaskCreated {
        task_id: TaskId,
        pool_id: PoolId,
        auction_id: u64,
        total_bidders: u32,
    },
    ResponseSubmitted {
        task_id: TaskId,
        operator: Address,
        commitment: Commitment,
    },
    TaskCompleted {
        task_id: TaskId,
        commitment: Commitment,
    },
    ChallengeAccepted {
        task_id: TaskId,
        operator: Address,
        proof_hash: [u8; 32],
    },
}

/// A logged event with its position and time.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: u64,
    pub event: ModuleEvent,
}
