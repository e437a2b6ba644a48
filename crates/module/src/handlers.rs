//! Call context and dispatch for the auction module.
//!
//! Business logic lives in `ledger`, `registry` and `coordinator`. This module
//! routes a `ModuleCall` to the matching handler.

use auction_types::{Address, TaskId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::call::ModuleCall;
use crate::coordinator::{self, RespondOutcome};
use crate::error::ModuleError;
use crate::ledger;
use crate::registry;
use crate::state::ModuleState;

/// Context provided by the runtime for each call.
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Sender of the transaction
    pub sender: Address,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp
    pub timestamp: u64,
    /// Value attached to the call (operator stake)
    pub value: u64,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, ModuleError>;

/// Value returned by a dispatched call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    AuctionCreated { auction_id: u64 },
    ReadySignalled { auction_id: u64 },
    TaskCreated { task_id: TaskId },
    Responded(RespondOutcome),
    Refunded { amount: u64 },
    Slashed { amount: u64 },
    Done,
}

/// Execute one call against the state.
pub fn dispatch(
    state: &mut ModuleState,
    ctx: &CallContext,
    call: ModuleCall,
) -> HandlerResult<CallOutcome> {
    let name = call.name();
    let result = match call {
        ModuleCall::CreateAuction {
            pool_id,
            end_time,
            priority_window_duration,
            min_bid_amount,
            max_winners,
        } => ledger::handle_create_auction(
            state,
            ctx,
            pool_id,
            end_time,
            priority_window_duration,
            min_bid_amount,
            max_winners,
        )
        .map(|auction_id| CallOutcome::AuctionCreated { auction_id }),

        ModuleCall::SubmitBid {
            pool_id,
            encrypted_amount,
        } => ledger::handle_submit_bid(state, ctx, pool_id, encrypted_amount)
            .map(|_| CallOutcome::Done),

        ModuleCall::Settle { pool_id, winners } => {
            ledger::handle_settle(state, ctx, pool_id, winners).map(|_| CallOutcome::Done)
        }

        ModuleCall::SignalReady { pool_id } => ledger::handle_signal_ready(state, ctx, pool_id)
            .map(|auction_id| CallOutcome::ReadySignalled { auction_id }),

        ModuleCall::RecordExecution { pool_id } => {
            ledger::handle_record_execution(state, ctx, pool_id).map(|_| CallOutcome::Done)
        }

        ModuleCall::Register => registry::handle_register(state, ctx).map(|_| CallOutcome::Done),

        ModuleCall::Deregister => registry::handle_deregister(state, ctx)
            .map(|amount| CallOutcome::Refunded { amount }),

        ModuleCall::Slash {
            operator,
            amount,
            reason,
        } => registry::handle_slash(state, ctx, operator, amount, reason)
            .map(|amount| CallOutcome::Slashed { amount }),

        ModuleCall::CreateTask {
            pool_id,
            total_bidders,
        } => coordinator::handle_create_task(state, ctx, pool_id, total_bidders)
            .map(|task_id| CallOutcome::TaskCreated { task_id }),

        ModuleCall::Respond {
            task_id,
            winners,
            commitment,
        } => coordinator::handle_respond(state, ctx, task_id, winners, commitment)
            .map(CallOutcome::Responded),

        ModuleCall::CompleteTask { task_id } => {
            coordinator::handle_complete_task(state, ctx, task_id).map(|_| CallOutcome::Done)
        }

        ModuleCall::Challenge {
            task_id,
            operator,
            proof,
        } => coordinator::handle_challenge(state, ctx, task_id, operator, proof)
            .map(|amount| CallOutcome::Slashed { amount }),
    };

    if let Err(err) = &result {
        debug!(call = name, kind = ?err.kind(), error = %err, "Call rejected");
    }
    result
}
