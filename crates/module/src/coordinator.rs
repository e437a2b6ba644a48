//! Task coordinator handlers.
//!
//! A task asks every active operator to compute the winner set of one ended
//! auction. Each response votes for a commitment; the task completes, and the
//! auction is settled with the agreed winners, as soon as one commitment holds
//! `required_votes(active_operators, threshold)` votes.
//!
//! # Tie-break
//!
//! If several commitments meet the threshold at once, the one with the most
//! votes wins; among equal counts, the one that reached its count first (lowest
//! `last_vote_seq`) wins. Tallies are kept in a `Vec` in order of first
//! appearance, so the scan never depends on hash-map iteration order.

use auction_types::{
    compute_winner_commitment, required_votes, sha256, short_hex, Address, Commitment, PoolId, Task,
    TaskId, TaskResponse, VoteTally, WinnerEntry, CHALLENGE_SLASH_REASON,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ModuleError;
use crate::events::ModuleEvent;
use crate::handlers::{CallContext, HandlerResult};
use crate::ledger::{apply_settlement, validate_settlement};
use crate::registry::slash_operator;
use crate::state::ModuleState;

/// What a successful response did to its task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondOutcome {
    /// Votes now held by the submitted commitment
    pub votes: u64,
    /// Votes any commitment needs
    pub required: u64,
    /// Whether this response completed the task
    pub quorum_reached: bool,
}

/// Handle CreateTask call.
pub fn handle_create_task(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
    total_bidders: u32,
) -> HandlerResult<TaskId> {
    if ctx.sender != state.configurer {
        return Err(ModuleError::NotAuthorized);
    }

    if state.total_active_operators == 0 {
        return Err(ModuleError::NoOperators);
    }

    let auction = state.current_auction(&pool_id).ok_or(ModuleError::NoAuction)?;
    if !auction.is_active {
        return Err(ModuleError::AuctionNotActive);
    }
    if !auction.has_ended(ctx.timestamp) {
        return Err(ModuleError::AuctionNotEnded);
    }
    let auction_id = auction.auction_id;

    let task_id = state.allocate_task_id();
    let task = Task {
        task_id,
        pool_id,
        auction_id,
        total_bidders,
        created_at: ctx.timestamp,
        created_block: ctx.block_height,
        quorum_threshold_percentage: state.coordinator.quorum_threshold_percentage,
        completed: false,
        completed_at: None,
        agreed_commitment: None,
    };

    state.tasks.insert(task_id, task);
    state.task_responders.insert(task_id, Vec::new());
    state.tallies.insert(task_id, Vec::new());
    state.emit(
        ctx.timestamp,
        ModuleEvent::TaskCreated {
            task_id,
            pool_id,
            auction_id,
            total_bidders,
        },
    );

    info!(
        task_id,
        pool_id = short_hex(&pool_id),
        auction_id,
        total_bidders,
        operators = state.total_active_operators,
        "Task created"
    );
    Ok(task_id)
}

/// Handle Respond call from an active operator.
///
/// Records the vote, then checks quorum over every tally of the task. If a
/// commitment is selected, its winner set is written to the ledger in the same
/// call. The response is rejected as a whole if that settlement would fail.
pub fn handle_respond(
    state: &mut ModuleState,
    ctx: &CallContext,
    task_id: TaskId,
    winners: Vec<WinnerEntry>,
    commitment: Commitment,
) -> HandlerResult<RespondOutcome> {
    let stake = state
        .active_operator(&ctx.sender)
        .map(|op| op.stake)
        .ok_or(ModuleError::OperatorNotRegistered)?;

    let task = state.tasks.get(&task_id).ok_or(ModuleError::TaskNotFound(task_id))?;
    if task.completed {
        return Err(ModuleError::TaskAlreadyCompleted(task_id));
    }
    let pool_id = task.pool_id;
    let auction_id = task.auction_id;
    let threshold = task.quorum_threshold_percentage;

    if state.responses.contains_key(&(task_id, ctx.sender)) {
        return Err(ModuleError::DuplicateResponse);
    }

    if compute_winner_commitment(&winners) != commitment {
        return Err(ModuleError::CommitmentMismatch);
    }

    let seq = state
        .task_responders
        .get(&task_id)
        .map(|r| r.len() as u64)
        .unwrap_or(0)
        + 1;

    let mut tallies = state.tallies.get(&task_id).cloned().unwrap_or_default();
    let votes = record_vote(&mut tallies, commitment, &winners, stake, seq);

    let required = required_votes(state.total_active_operators, threshold);
    let selected = select_quorum_commitment(&tallies, required).cloned();

    if let Some(tally) = &selected {
        ensure_settleable(state, &pool_id, auction_id, &tally.winners, ctx.timestamp)?;
    }

    // Validation done; commit the vote.
    state.responses.insert(
        (task_id, ctx.sender),
        TaskResponse {
            task_id,
            operator: ctx.sender,
            commitment,
            winners_count: winners.len() as u32,
            submitted_at: ctx.timestamp,
        },
    );
    state.task_responders.entry(task_id).or_default().push(ctx.sender);
    state.tallies.insert(task_id, tallies);
    if let Some(op) = state.operators.get_mut(&ctx.sender) {
        op.responses_submitted += 1;
    }
    state.emit(
        ctx.timestamp,
        ModuleEvent::ResponseSubmitted {
            task_id,
            operator: ctx.sender,
            commitment,
        },
    );

    debug!(
        task_id,
        operator = short_hex(&ctx.sender),
        commitment = short_hex(&commitment),
        votes,
        required,
        "Response recorded"
    );

    let quorum_reached = match selected {
        Some(tally) => {
            finalize_task(state, task_id, &tally, ctx.timestamp)?;
            true
        }
        None => false,
    };

    Ok(RespondOutcome {
        votes,
        required,
        quorum_reached,
    })
}

/// Handle CompleteTask call.
///
/// Succeeds without effect if the task is already completed.
pub fn handle_complete_task(
    state: &mut ModuleState,
    ctx: &CallContext,
    task_id: TaskId,
) -> HandlerResult<()> {
    let task = state.tasks.get(&task_id).ok_or(ModuleError::TaskNotFound(task_id))?;
    if task.completed {
        return Ok(());
    }
    let pool_id = task.pool_id;
    let auction_id = task.auction_id;

    let required = required_votes(state.total_active_operators, task.quorum_threshold_percentage);
    let tallies = state.tallies.get(&task_id).map(Vec::as_slice).unwrap_or(&[]);

    let tally = match select_quorum_commitment(tallies, required) {
        Some(tally) => tally.clone(),
        None => {
            let best = tallies.iter().map(|t| t.votes).max().unwrap_or(0);
            return Err(ModuleError::QuorumNotReached { best, required });
        }
    };

    ensure_settleable(state, &pool_id, auction_id, &tally.winners, ctx.timestamp)?;
    finalize_task(state, task_id, &tally, ctx.timestamp)
}

/// Handle Challenge call.
///
/// The proof is not interpreted here; only its hash is logged. Returns the
/// amount slashed.
pub fn handle_challenge(
    state: &mut ModuleState,
    ctx: &CallContext,
    task_id: TaskId,
    operator: Address,
    proof: Vec<u8>,
) -> HandlerResult<u64> {
    let task = state.tasks.get(&task_id).ok_or(ModuleError::TaskDoesNotExist(task_id))?;

    let closes_at = task
        .created_at
        .saturating_add(state.coordinator.challenge_window_secs);
    if ctx.timestamp > closes_at {
        return Err(ModuleError::ChallengeWindowClosed);
    }

    if !state.responses.contains_key(&(task_id, operator)) {
        return Err(ModuleError::InvalidResponse);
    }

    if state.challenged.contains(&(task_id, operator)) {
        return Err(ModuleError::AlreadyChallenged);
    }

    let amount = state.coordinator.challenge_slash_amount;
    let slashed = slash_operator(
        state,
        operator,
        amount,
        CHALLENGE_SLASH_REASON.to_string(),
        ctx.timestamp,
    )?;

    let proof_hash = sha256(&proof);
    state.challenged.insert((task_id, operator));
    state.emit(
        ctx.timestamp,
        ModuleEvent::ChallengeAccepted {
            task_id,
            operator,
            proof_hash,
        },
    );

    info!(
        task_id,
        operator = short_hex(&operator),
        challenger = short_hex(&ctx.sender),
        slashed,
        "Challenge accepted"
    );
    Ok(slashed)
}

/// Whether some commitment of `task_id` holds enough votes. Stays true once
/// the task has completed.
pub fn has_reached_quorum(state: &ModuleState, task_id: TaskId) -> bool {
    let Some(task) = state.tasks.get(&task_id) else {
        return false;
    };
    if task.completed {
        return true;
    }

    let required = required_votes(state.total_active_operators, task.quorum_threshold_percentage);
    state
        .tallies
        .get(&task_id)
        .map(|tallies| select_quorum_commitment(tallies, required).is_some())
        .unwrap_or(false)
}

/// Pick the commitment that settles the task, if any meets `required`.
///
/// Highest vote count wins; ties go to the lowest `last_vote_seq`.
pub fn select_quorum_commitment(tallies: &[VoteTally], required: u64) -> Option<&VoteTally> {
    tallies
        .iter()
        .filter(|t| t.votes >= required)
        .fold(None, |best: Option<&VoteTally>, tally| match best {
            Some(b)
                if b.votes > tally.votes
                    || (b.votes == tally.votes && b.last_vote_seq <= tally.last_vote_seq) =>
            {
                Some(b)
            }
            _ => Some(tally),
        })
}

/// Add one vote to `commitment`, creating its tally on first sight. Returns
/// the new vote count.
fn record_vote(
    tallies: &mut Vec<VoteTally>,
    commitment: Commitment,
    winners: &[WinnerEntry],
    stake: u64,
    seq: u64,
) -> u64 {
    match tallies.iter_mut().find(|t| t.commitment == commitment) {
        Some(tally) => {
            tally.votes += 1;
            tally.stake_weight = tally.stake_weight.saturating_add(stake);
            tally.last_vote_seq = seq;
            tally.votes
        }
        None => {
            tallies.push(VoteTally {
                commitment,
                votes: 1,
                stake_weight: stake,
                last_vote_seq: seq,
                winners: winners.to_vec(),
            });
            1
        }
    }
}

/// Check that the task's auction is still the pool's current one and that the
/// winner set would be accepted by the ledger.
fn ensure_settleable(
    state: &ModuleState,
    pool_id: &PoolId,
    auction_id: u64,
    winners: &[WinnerEntry],
    now: u64,
) -> HandlerResult<()> {
    if state.pool_auctions.get(pool_id) != Some(&auction_id) {
        return Err(ModuleError::AuctionNotActive);
    }
    validate_settlement(state, pool_id, winners, now).map(|_| ())
}

/// Settle the auction with the selected tally and close the task.
fn finalize_task(
    state: &mut ModuleState,
    task_id: TaskId,
    tally: &VoteTally,
    now: u64,
) -> HandlerResult<()> {
    let pool_id = state
        .tasks
        .get(&task_id)
        .map(|t| t.pool_id)
        .ok_or(ModuleError::TaskNotFound(task_id))?;

    apply_settlement(state, pool_id, &tally.winners, now)?;

    if let Some(task) = state.tasks.get_mut(&task_id) {
        task.completed = true;
        task.completed_at = Some(now);
        task.agreed_commitment = Some(tally.commitment);
    }
    state.emit(
        now,
        ModuleEvent::TaskCompleted {
            task_id,
            commitment: tally.commitment,
        },
    );

    info!(
        task_id,
        commitment = short_hex(&tally.commitment),
        votes = tally.votes,
        stake_weight = tally.stake_weight,
        "Quorum reached, task completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::ModuleGenesisConfig;
    use crate::ledger::{handle_create_auction, handle_submit_bid};
    use crate::queries;
    use crate::registry::handle_register;
    use auction_types::{EncryptedHandle, TaskStatus};

    const ADMIN: [u8; 32] = [0xAA; 32];
    const POOL: [u8; 32] = [0x11; 32];
    const OPS: [[u8; 32]; 3] = [[0xA1; 32], [0xA2; 32], [0xA3; 32]];
    const END: u64 = 3_600;

    fn ctx(sender: [u8; 32], timestamp: u64, value: u64) -> CallContext {
        CallContext {
            sender,
            block_height: timestamp / 12,
            timestamp,
            value,
        }
    }

    /// Three operators, one ended auction with three bids, one open task.
    fn setup() -> (ModuleState, TaskId) {
        let mut state = ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(ADMIN));
        for op in OPS {
            handle_register(&mut state, &ctx(op, 0, 1_000)).unwrap();
        }
        handle_create_auction(&mut state, &ctx(ADMIN, 0, 0), POOL, END, 600, 1, 10).unwrap();
        for bidder in 1..=3u8 {
            handle_submit_bid(
                &mut state,
                &ctx([bidder; 32], 10, 0),
                POOL,
                EncryptedHandle([bidder; 32]),
            )
            .unwrap();
        }
        let task_id = handle_create_task(&mut state, &ctx(ADMIN, END + 1, 0), POOL, 3).unwrap();
        (state, task_id)
    }

    fn winners(split: &[(u8, u64, u64)]) -> Vec<WinnerEntry> {
        split
            .iter()
            .map(|&(bidder, amount, allocation)| WinnerEntry {
                bidder: [bidder; 32],
                amount,
                allocation,
            })
            .collect()
    }

    fn respond(
        state: &mut ModuleState,
        task_id: TaskId,
        op: [u8; 32],
        winners: Vec<WinnerEntry>,
    ) -> HandlerResult<RespondOutcome> {
        let commitment = compute_winner_commitment(&winners);
        handle_respond(state, &ctx(op, END + 10, 0), task_id, winners, commitment)
    }

    fn tally(tag: u8, votes: u64, seq: u64) -> VoteTally {
        VoteTally {
            commitment: [tag; 32],
            votes,
            stake_weight: 0,
            last_vote_seq: seq,
            winners: vec![],
        }
    }

    #[test]
    fn test_create_task_without_operators() {
        let mut state = ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(ADMIN));
        handle_create_auction(&mut state, &ctx(ADMIN, 0, 0), POOL, END, 0, 1, 1).unwrap();
        assert_eq!(
            handle_create_task(&mut state, &ctx(ADMIN, END, 0), POOL, 0),
            Err(ModuleError::NoOperators)
        );
    }

    #[test]
    fn test_create_task_before_end() {
        let mut state = ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(ADMIN));
        handle_register(&mut state, &ctx(OPS[0], 0, 1_000)).unwrap();
        handle_create_auction(&mut state, &ctx(ADMIN, 0, 0), POOL, END, 0, 1, 1).unwrap();
        assert_eq!(
            handle_create_task(&mut state, &ctx(ADMIN, END - 1, 0), POOL, 0),
            Err(ModuleError::AuctionNotEnded)
        );
        assert_eq!(
            handle_create_task(&mut state, &ctx(OPS[0], END, 0), POOL, 0),
            Err(ModuleError::NotAuthorized)
        );
    }

    #[test]
    fn test_quorum_reached_on_second_matching_response() {
        let (mut state, task_id) = setup();
        let agreed = winners(&[(1, 300, 5000), (2, 200, 3333), (3, 100, 1667)]);

        let first = respond(&mut state, task_id, OPS[0], agreed.clone()).unwrap();
        assert_eq!(first, RespondOutcome { votes: 1, required: 2, quorum_reached: false });
        assert!(!has_reached_quorum(&state, task_id));

        let second = respond(&mut state, task_id, OPS[1], agreed.clone()).unwrap();
        assert!(second.quorum_reached);
        assert!(has_reached_quorum(&state, task_id));

        let task = queries::get_task(&state, task_id).unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.agreed_commitment, Some(compute_winner_commitment(&agreed)));

        assert!(queries::is_winner(&state, &POOL, &[1u8; 32]));
        assert_eq!(queries::get_allocation(&state, &POOL, &[2u8; 32]), 3333);
        assert!(!state.current_auction(&POOL).unwrap().is_active);

        // Late third response is refused and quorum stays reached.
        assert_eq!(
            respond(&mut state, task_id, OPS[2], agreed),
            Err(ModuleError::TaskAlreadyCompleted(task_id))
        );
        assert!(has_reached_quorum(&state, task_id));
    }

    #[test]
    fn test_distinct_commitments_never_reach_quorum() {
        let (mut state, task_id) = setup();
        for (i, op) in OPS.iter().enumerate() {
            let entries = winners(&[(i as u8 + 1, 100, 10_000)]);
            let outcome = respond(&mut state, task_id, *op, entries).unwrap();
            assert!(!outcome.quorum_reached);
        }

        assert!(!has_reached_quorum(&state, task_id));
        assert_eq!(
            handle_complete_task(&mut state, &ctx(ADMIN, END + 20, 0), task_id),
            Err(ModuleError::QuorumNotReached { best: 1, required: 2 })
        );
        assert_eq!(state.tallies[&task_id].len(), 3);
        assert!(state.current_auction(&POOL).unwrap().is_active);
    }

    #[test]
    fn test_respond_rejections() {
        let (mut state, task_id) = setup();
        let w = winners(&[(1, 300, 10_000)]);

        assert_eq!(
            respond(&mut state, task_id, [0x55; 32], w.clone()),
            Err(ModuleError::OperatorNotRegistered)
        );
        assert_eq!(
            respond(&mut state, 99, OPS[0], w.clone()),
            Err(ModuleError::TaskNotFound(99))
        );

        respond(&mut state, task_id, OPS[0], w.clone()).unwrap();
        assert_eq!(
            respond(&mut state, task_id, OPS[0], winners(&[(2, 1, 10_000)])),
            Err(ModuleError::DuplicateResponse)
        );

        let bad = handle_respond(&mut state, &ctx(OPS[1], END + 10, 0), task_id, w, [0u8; 32]);
        assert_eq!(bad, Err(ModuleError::CommitmentMismatch));
        assert_eq!(state.operators[&OPS[1]].responses_submitted, 0);
    }

    #[test]
    fn test_rejected_settlement_rejects_response() {
        let (mut state, task_id) = setup();
        // Bidder 9 never bid, so the agreed set cannot settle.
        let ghost = winners(&[(9, 100, 10_000)]);

        respond(&mut state, task_id, OPS[0], ghost.clone()).unwrap();
        assert_eq!(
            respond(&mut state, task_id, OPS[1], ghost),
            Err(ModuleError::UnknownBidder)
        );
        assert!(!state.responses.contains_key(&(task_id, OPS[1])));
        assert_eq!(state.tallies[&task_id][0].votes, 1);
    }

    #[test]
    fn test_tie_break_prefers_first_to_reach_count() {
        let tallies = vec![tally(1, 2, 4), tally(2, 2, 3), tally(3, 1, 5)];
        assert_eq!(select_quorum_commitment(&tallies, 2).unwrap().commitment, [2u8; 32]);

        let tallies = vec![tally(1, 2, 4), tally(2, 3, 6)];
        assert_eq!(select_quorum_commitment(&tallies, 2).unwrap().commitment, [2u8; 32]);

        assert!(select_quorum_commitment(&tallies, 4).is_none());
        assert!(select_quorum_commitment(&[], 1).is_none());
    }

    #[test]
    fn test_stake_weight_accumulates() {
        let (mut state, task_id) = setup();
        let w = winners(&[(1, 300, 10_000)]);
        respond(&mut state, task_id, OPS[0], w.clone()).unwrap();
        assert_eq!(state.tallies[&task_id][0].stake_weight, 1_000);
        assert_eq!(state.operators[&OPS[0]].responses_submitted, 1);
    }

    #[test]
    fn test_complete_task_after_operator_loss() {
        let (mut state, task_id) = setup();
        let w = winners(&[(1, 300, 10_000)]);
        respond(&mut state, task_id, OPS[0], w).unwrap();

        // Two operators leave; one vote of one active operator now suffices.
        for op in &OPS[1..] {
            crate::registry::handle_deregister(&mut state, &ctx(*op, END + 15, 0)).unwrap();
        }
        assert!(has_reached_quorum(&state, task_id));

        handle_complete_task(&mut state, &ctx(ADMIN, END + 20, 0), task_id).unwrap();
        assert!(state.tasks[&task_id].completed);

        // Idempotent.
        handle_complete_task(&mut state, &ctx(ADMIN, END + 30, 0), task_id).unwrap();
    }

    #[test]
    fn test_challenge_slashes_responder() {
        let (mut state, task_id) = setup();
        respond(&mut state, task_id, OPS[0], winners(&[(1, 300, 10_000)])).unwrap();

        let challenger = ctx([0x77; 32], END + 100, 0);
        let slashed =
            handle_challenge(&mut state, &challenger, task_id, OPS[0], b"proof".to_vec()).unwrap();
        assert_eq!(slashed, 100);
        assert_eq!(state.operators[&OPS[0]].stake, 900);
        assert_eq!(state.slash_log[0].reason, CHALLENGE_SLASH_REASON);

        assert_eq!(
            handle_challenge(&mut state, &challenger, task_id, OPS[0], vec![]),
            Err(ModuleError::AlreadyChallenged)
        );
        assert_eq!(
            handle_challenge(&mut state, &challenger, task_id, OPS[1], vec![]),
            Err(ModuleError::InvalidResponse)
        );
        assert_eq!(
            handle_challenge(&mut state, &challenger, 42, OPS[0], vec![]),
            Err(ModuleError::TaskDoesNotExist(42))
        );
    }

    #[test]
    fn test_challenge_window_closes() {
        let (mut state, task_id) = setup();
        respond(&mut state, task_id, OPS[0], winners(&[(1, 300, 10_000)])).unwrap();

        let created = state.tasks[&task_id].created_at;
        let window = state.coordinator.challenge_window_secs;

        let at_edge = ctx([0x77; 32], created + window, 0);
        assert!(handle_challenge(&mut state, &at_edge, task_id, OPS[0], vec![]).is_ok());

        respond(&mut state, task_id, OPS[1], winners(&[(2, 300, 10_000)])).unwrap();
        let late = ctx([0x77; 32], created + window + 1, 0);
        assert_eq!(
            handle_challenge(&mut state, &late, task_id, OPS[1], vec![]),
            Err(ModuleError::ChallengeWindowClosed)
        );
    }
}
