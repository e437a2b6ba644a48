//! Query handlers for the auction module.
//!
//! These functions provide read-only access to module state. Pool-keyed
//! queries always refer to the pool's latest auction.

use auction_types::{
    Address, AuctionConfig, Bid, Operator, PoolId, SlashRecord, Task, TaskId, TaskResponse,
    VoteTally,
};
use serde::{Deserialize, Serialize};

use crate::coordinator;
use crate::events::EventRecord;
use crate::ledger;
use crate::state::ModuleState;

/// Query request types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ModuleQuery {
    /// Current auction config of a pool.
    GetAuction { pool_id: PoolId },

    /// Bid of one bidder on the pool's current auction.
    GetBid { pool_id: PoolId, bidder: Address },

    /// Bids on the pool's current auction, in submission order.
    GetBids { pool_id: PoolId },

    /// Bidders of the pool's current auction, in submission order.
    GetBidders { pool_id: PoolId },

    IsWinner { pool_id: PoolId, bidder: Address },

    GetAllocation { pool_id: PoolId, bidder: Address },

    IsInPriorityWindow { pool_id: PoolId, now: u64 },

    GetOperator { operator: Address },

    ListOperators,

    TotalActiveOperators,

    GetTask { task_id: TaskId },

    GetResponses { task_id: TaskId },

    GetTallies { task_id: TaskId },

    HasReachedQuorum { task_id: TaskId },

    /// Pools whose auction has ended without an open task.
    PendingSettlement { now: u64 },

    SlashLog,

    /// Events with `seq >= cursor`, at most `limit`.
    Events { cursor: u64, limit: u64 },
}

/// Query response types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ModuleQueryResponse {
    Auction(Option<AuctionConfig>),
    Bid(Option<Bid>),
    Bids(Vec<Bid>),
    Bidders(Vec<Address>),
    IsWinner(bool),
    Allocation(u64),
    InPriorityWindow(bool),
    Operator(Option<Operator>),
    Operators(Vec<Operator>),
    Count(u64),
    Task(Option<Task>),
    Responses(Vec<TaskResponse>),
    Tallies(Vec<VoteTally>),
    QuorumReached(bool),
    Pools(Vec<PoolId>),
    SlashLog(Vec<SlashRecord>),
    Events(Vec<EventRecord>),
}

/// Handle a query.
pub fn handle_query(state: &ModuleState, query: ModuleQuery) -> ModuleQueryResponse {
    match query {
        ModuleQuery::GetAuction { pool_id } => {
            ModuleQueryResponse::Auction(state.current_auction(&pool_id).cloned())
        }

        ModuleQuery::GetBid { pool_id, bidder } => {
            ModuleQueryResponse::Bid(get_bid(state, &pool_id, &bidder).cloned())
        }

        ModuleQuery::GetBids { pool_id } => ModuleQueryResponse::Bids(get_bids(state, &pool_id)),

        ModuleQuery::GetBidders { pool_id } => {
            ModuleQueryResponse::Bidders(get_bidders(state, &pool_id))
        }

        ModuleQuery::IsWinner { pool_id, bidder } => {
            ModuleQueryResponse::IsWinner(is_winner(state, &pool_id, &bidder))
        }

        ModuleQuery::GetAllocation { pool_id, bidder } => {
            ModuleQueryResponse::Allocation(get_allocation(state, &pool_id, &bidder))
        }

        ModuleQuery::IsInPriorityWindow { pool_id, now } => ModuleQueryResponse::InPriorityWindow(
            ledger::is_in_priority_window(state, &pool_id, now),
        ),

        ModuleQuery::GetOperator { operator } => {
            ModuleQueryResponse::Operator(state.operators.get(&operator).cloned())
        }

        ModuleQuery::ListOperators => ModuleQueryResponse::Operators(
            state
                .operator_list
                .iter()
                .filter_map(|addr| state.operators.get(addr).cloned())
                .collect(),
        ),

        ModuleQuery::TotalActiveOperators => {
            ModuleQueryResponse::Count(state.total_active_operators)
        }

        ModuleQuery::GetTask { task_id } => {
            ModuleQueryResponse::Task(get_task(state, task_id).cloned())
        }

        ModuleQuery::GetResponses { task_id } => {
            ModuleQueryResponse::Responses(get_responses(state, task_id))
        }

        ModuleQuery::GetTallies { task_id } => ModuleQueryResponse::Tallies(
            state.tallies.get(&task_id).cloned().unwrap_or_default(),
        ),

        ModuleQuery::HasReachedQuorum { task_id } => {
            ModuleQueryResponse::QuorumReached(coordinator::has_reached_quorum(state, task_id))
        }

        ModuleQuery::PendingSettlement { now } => {
            ModuleQueryResponse::Pools(pending_settlement(state, now))
        }

        ModuleQuery::SlashLog => ModuleQueryResponse::SlashLog(state.slash_log.clone()),

        ModuleQuery::Events { cursor, limit } => ModuleQueryResponse::Events(
            state
                .events_since(cursor)
                .iter()
                .take(limit as usize)
                .cloned()
                .collect(),
        ),
    }
}

// === Helper functions for common queries ===

/// Get a bid on the pool's current auction.
pub fn get_bid<'a>(state: &'a ModuleState, pool_id: &PoolId, bidder: &Address) -> Option<&'a Bid> {
    let auction_id = state.current_auction(pool_id)?.auction_id;
    state.bids.get(&(auction_id, *bidder))
}

/// Get all bids on the pool's current auction, in submission order.
pub fn get_bids(state: &ModuleState, pool_id: &PoolId) -> Vec<Bid> {
    state
        .current_auction(pool_id)
        .map(|auction| {
            state
                .get_auction_bids(auction.auction_id)
                .into_iter()
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Get bidders of the pool's current auction, in submission order.
pub fn get_bidders(state: &ModuleState, pool_id: &PoolId) -> Vec<Address> {
    state
        .current_auction(pool_id)
        .and_then(|auction| state.auction_bidders.get(&auction.auction_id))
        .cloned()
        .unwrap_or_default()
}

/// Check whether `bidder` won the pool's current auction.
pub fn is_winner(state: &ModuleState, pool_id: &PoolId, bidder: &Address) -> bool {
    state
        .current_auction(pool_id)
        .and_then(|auction| state.winners.get(&(auction.auction_id, *bidder)))
        .map(|record| record.is_winner)
        .unwrap_or(false)
}

/// Allocation of `bidder` on the pool's current auction; zero for non-winners.
pub fn get_allocation(state: &ModuleState, pool_id: &PoolId, bidder: &Address) -> u64 {
    state
        .current_auction(pool_id)
        .and_then(|auction| state.winners.get(&(auction.auction_id, *bidder)))
        .map(|record| record.allocation)
        .unwrap_or(0)
}

/// Get task by ID.
pub fn get_task(state: &ModuleState, task_id: TaskId) -> Option<&Task> {
    state.tasks.get(&task_id)
}

/// Responses to a task, in submission order.
pub fn get_responses(state: &ModuleState, task_id: TaskId) -> Vec<TaskResponse> {
    state
        .task_responders
        .get(&task_id)
        .map(|responders| {
            responders
                .iter()
                .filter_map(|op| state.responses.get(&(task_id, *op)).cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Tasks that have not reached quorum, by ascending ID.
pub fn open_tasks(state: &ModuleState) -> Vec<&Task> {
    let mut tasks: Vec<&Task> = state.tasks.values().filter(|t| !t.completed).collect();
    tasks.sort_by_key(|t| t.task_id);
    tasks
}

/// Pools whose active auction has ended and has no open task yet.
pub fn pending_settlement(state: &ModuleState, now: u64) -> Vec<PoolId> {
    let mut pools: Vec<PoolId> = state
        .pool_auctions
        .iter()
        .filter_map(|(pool_id, auction_id)| {
            let auction = state.auctions.get(auction_id)?;
            let has_task = state
                .tasks
                .values()
                .any(|t| t.auction_id == *auction_id && !t.completed);
            (auction.is_active && auction.has_ended(now) && !has_task).then_some(*pool_id)
        })
        .collect();
    pools.sort();
    pools
}
