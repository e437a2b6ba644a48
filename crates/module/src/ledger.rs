//! Auction ledger handlers.
//!
//! Owns per-pool auction configs, sealed bids and the settled winner set.

use std::collections::HashSet;

use auction_types::{
    short_hex, AuctionConfig, Bid, EncryptedHandle, PoolId, WinnerEntry, WinnerRecord,
};
use tracing::{debug, info};

use crate::error::ModuleError;
use crate::events::ModuleEvent;
use crate::handlers::{CallContext, HandlerResult};
use crate::state::ModuleState;

/// Handle CreateAuction call.
pub fn handle_create_auction(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
    end_time: u64,
    priority_window_duration: u64,
    min_bid_amount: u64,
    max_winners: u32,
) -> HandlerResult<u64> {
    if ctx.sender != state.configurer {
        return Err(ModuleError::NotAuthorized);
    }

    if max_winners == 0 {
        return Err(ModuleError::InvalidMaxWinners);
    }

    if end_time <= ctx.timestamp {
        return Err(ModuleError::EndTimeNotInFuture {
            end_time,
            now: ctx.timestamp,
        });
    }

    // An expired but unsettled config is superseded; a running one blocks.
    let superseded = match state.current_auction(&pool_id) {
        Some(existing) if existing.is_active && !existing.has_ended(ctx.timestamp) => {
            return Err(ModuleError::AuctionAlreadyActive);
        }
        Some(existing) if existing.is_active => Some(existing.auction_id),
        _ => None,
    };

    if let Some(old_id) = superseded {
        if let Some(old) = state.auctions.get_mut(&old_id) {
            old.is_active = false;
        }
        info!(pool_id = short_hex(&pool_id), auction_id = old_id, "Superseded expired auction");
        state.emit(
            ctx.timestamp,
            ModuleEvent::AuctionSuperseded {
                pool_id,
                auction_id: old_id,
            },
        );
    }

    let auction_id = state.allocate_auction_id();
    let config = AuctionConfig {
        auction_id,
        pool_id,
        end_time,
        priority_window_duration,
        min_bid_amount,
        max_winners,
        is_active: true,
        created_at: ctx.timestamp,
        settled_at: None,
    };

    state.auctions.insert(auction_id, config);
    state.pool_auctions.insert(pool_id, auction_id);
    state.auction_bidders.insert(auction_id, Vec::new());
    state.emit(
        ctx.timestamp,
        ModuleEvent::AuctionCreated {
            pool_id,
            auction_id,
            end_time,
        },
    );

    info!(pool_id = short_hex(&pool_id), auction_id, end_time, max_winners, "Created auction");
    Ok(auction_id)
}

/// Handle SubmitBid call. The bidder is the caller.
pub fn handle_submit_bid(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
    encrypted_amount: EncryptedHandle,
) -> HandlerResult<()> {
    let auction = state
        .current_auction(&pool_id)
        .filter(|a| a.is_active)
        .ok_or(ModuleError::NoAuction)?;
    let auction_id = auction.auction_id;

    if auction.has_ended(ctx.timestamp) {
        return Err(ModuleError::BiddingEnded);
    }

    if !state.gate().can_participate(&ctx.sender) {
        return Err(ModuleError::BidderNotEligible);
    }

    if state.bids.contains_key(&(auction_id, ctx.sender)) {
        return Err(ModuleError::AlreadyBid);
    }

    let bid = Bid {
        bidder: ctx.sender,
        encrypted_amount,
        timestamp: ctx.timestamp,
        is_winner: false,
        has_executed: false,
    };

    state.bids.insert((auction_id, ctx.sender), bid);
    state
        .auction_bidders
        .entry(auction_id)
        .or_default()
        .push(ctx.sender);
    state.emit(
        ctx.timestamp,
        ModuleEvent::BidSubmitted {
            pool_id,
            auction_id,
            bidder: ctx.sender,
        },
    );

    debug!(
        pool_id = short_hex(&pool_id),
        auction_id,
        bidder = short_hex(&ctx.sender),
        "Bid submitted"
    );
    Ok(())
}

/// Handle Settle call from the settlement authority.
pub fn handle_settle(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
    winners: Vec<WinnerEntry>,
) -> HandlerResult<()> {
    if ctx.sender != state.settlement_authority {
        return Err(ModuleError::NotAuthorized);
    }

    apply_settlement(state, pool_id, &winners, ctx.timestamp)
}

/// Check that `winners` can settle the current auction of `pool_id`.
pub(crate) fn validate_settlement(
    state: &ModuleState,
    pool_id: &PoolId,
    winners: &[WinnerEntry],
    now: u64,
) -> HandlerResult<u64> {
    let auction = state.current_auction(pool_id).ok_or(ModuleError::NoAuction)?;

    if !auction.is_active {
        return Err(ModuleError::AuctionNotActive);
    }

    if !auction.has_ended(now) {
        return Err(ModuleError::AuctionNotEnded);
    }

    if winners.len() > auction.max_winners as usize {
        return Err(ModuleError::TooManyWinners {
            max: auction.max_winners,
            got: winners.len(),
        });
    }

    let mut seen = HashSet::with_capacity(winners.len());
    for winner in winners {
        if !seen.insert(winner.bidder) {
            return Err(ModuleError::DuplicateWinner);
        }
        if !state.bids.contains_key(&(auction.auction_id, winner.bidder)) {
            return Err(ModuleError::UnknownBidder);
        }
    }

    Ok(auction.auction_id)
}

/// Write the winner set and close the auction.
///
/// All checks run before the first write, so a rejected settlement leaves the
/// ledger untouched. A second settlement of the same auction fails with
/// `AuctionNotActive`.
pub(crate) fn apply_settlement(
    state: &mut ModuleState,
    pool_id: PoolId,
    winners: &[WinnerEntry],
    now: u64,
) -> HandlerResult<()> {
    let auction_id = validate_settlement(state, &pool_id, winners, now)?;

    for winner in winners {
        state.winners.insert(
            (auction_id, winner.bidder),
            WinnerRecord {
                is_winner: true,
                allocation: winner.allocation,
            },
        );
        if let Some(bid) = state.bids.get_mut(&(auction_id, winner.bidder)) {
            bid.is_winner = true;
        }
    }

    if let Some(auction) = state.auctions.get_mut(&auction_id) {
        auction.is_active = false;
        auction.settled_at = Some(now);
    }

    state.emit(
        now,
        ModuleEvent::AuctionSettled {
            pool_id,
            auction_id,
            winners: winners.iter().map(|w| w.bidder).collect(),
        },
    );

    info!(pool_id = short_hex(&pool_id), auction_id, winners = winners.len(), "Auction settled");
    Ok(())
}

/// Handle SignalReady call (permissionless).
///
/// Emits `AuctionReadyToSettle` once the current auction has ended. Emitted at
/// most once per auction.
pub fn handle_signal_ready(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
) -> HandlerResult<u64> {
    let auction = state.current_auction(&pool_id).ok_or(ModuleError::NoAuction)?;
    let auction_id = auction.auction_id;

    if !auction.is_active {
        return Err(ModuleError::AuctionNotActive);
    }

    if !auction.has_ended(ctx.timestamp) {
        return Err(ModuleError::AuctionNotEnded);
    }

    if state.ready_signalled.contains(&auction_id) {
        return Err(ModuleError::AlreadySignalled);
    }

    let total_bidders = state.bid_count(auction_id) as u32;
    state.ready_signalled.insert(auction_id);
    state.emit(
        ctx.timestamp,
        ModuleEvent::AuctionReadyToSettle {
            pool_id,
            auction_id,
            total_bidders,
        },
    );

    info!(pool_id = short_hex(&pool_id), auction_id, total_bidders, "Auction ready to settle");
    Ok(auction_id)
}

/// Handle RecordExecution call: a winner acts during the priority window.
pub fn handle_record_execution(
    state: &mut ModuleState,
    ctx: &CallContext,
    pool_id: PoolId,
) -> HandlerResult<()> {
    let auction = state.current_auction(&pool_id).ok_or(ModuleError::NoAuction)?;
    let auction_id = auction.auction_id;

    if !auction.in_priority_window(ctx.timestamp) {
        return Err(ModuleError::OutsidePriorityWindow);
    }

    let bid = state
        .bids
        .get_mut(&(auction_id, ctx.sender))
        .filter(|bid| bid.is_winner)
        .ok_or(ModuleError::NotWinner)?;

    if bid.has_executed {
        return Err(ModuleError::AlreadyExecuted);
    }
    bid.has_executed = true;

    state.emit(
        ctx.timestamp,
        ModuleEvent::BidExecuted {
            pool_id,
            bidder: ctx.sender,
        },
    );
    Ok(())
}

/// True iff the current auction of `pool_id` is settled and `now` lies in its
/// priority window.
pub fn is_in_priority_window(state: &ModuleState, pool_id: &PoolId, now: u64) -> bool {
    state
        .current_auction(pool_id)
        .map(|auction| auction.in_priority_window(now))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Denylist;
    use crate::genesis::ModuleGenesisConfig;
    use crate::queries;
    use std::sync::Arc;

    const ADMIN: [u8; 32] = [0xAA; 32];
    const POOL: [u8; 32] = [0x11; 32];

    fn ctx(sender: [u8; 32], timestamp: u64) -> CallContext {
        CallContext {
            sender,
            block_height: timestamp / 12,
            timestamp,
            value: 0,
        }
    }

    fn setup() -> ModuleState {
        ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(ADMIN))
    }

    fn create(state: &mut ModuleState, now: u64, end: u64) -> HandlerResult<u64> {
        handle_create_auction(state, &ctx(ADMIN, now), POOL, end, 300, 10, 2)
    }

    fn bid(state: &mut ModuleState, bidder: u8, now: u64) -> HandlerResult<()> {
        handle_submit_bid(state, &ctx([bidder; 32], now), POOL, EncryptedHandle([bidder; 32]))
    }

    fn winner(bidder: u8, allocation: u64) -> WinnerEntry {
        WinnerEntry {
            bidder: [bidder; 32],
            amount: 100,
            allocation,
        }
    }

    #[test]
    fn test_create_auction() {
        let mut state = setup();
        assert_eq!(create(&mut state, 100, 1000).unwrap(), 1);
        let auction = state.current_auction(&POOL).unwrap();
        assert!(auction.is_active);
        assert_eq!(auction.end_time, 1000);
    }

    #[test]
    fn test_create_auction_requires_configurer() {
        let mut state = setup();
        let result = handle_create_auction(&mut state, &ctx([1u8; 32], 100), POOL, 1000, 0, 1, 1);
        assert_eq!(result, Err(ModuleError::NotAuthorized));
    }

    #[test]
    fn test_create_auction_invalid_params() {
        let mut state = setup();
        assert!(matches!(
            create(&mut state, 1000, 1000),
            Err(ModuleError::EndTimeNotInFuture { .. })
        ));
        let result = handle_create_auction(&mut state, &ctx(ADMIN, 100), POOL, 1000, 0, 1, 0);
        assert_eq!(result, Err(ModuleError::InvalidMaxWinners));
        assert!(state.auctions.is_empty());
    }

    #[test]
    fn test_second_create_while_active_fails() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        assert_eq!(create(&mut state, 200, 2000), Err(ModuleError::AuctionAlreadyActive));
    }

    #[test]
    fn test_create_after_settlement_succeeds() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 500).unwrap();
        apply_settlement(&mut state, POOL, &[winner(1, 10_000)], 1000).unwrap();

        assert_eq!(create(&mut state, 1100, 2000).unwrap(), 2);
        assert_eq!(state.current_auction(&POOL).unwrap().auction_id, 2);
    }

    #[test]
    fn test_expired_unsettled_auction_is_superseded() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        create(&mut state, 1500, 3000).unwrap();

        assert!(!state.get_auction(1).unwrap().is_active);
        assert!(state.get_auction(2).unwrap().is_active);
        let active = state.auctions.values().filter(|a| a.pool_id == POOL && a.is_active).count();
        assert_eq!(active, 1);
    }

    #[test]
    fn test_submit_bid_preserves_order() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 3, 200).unwrap();
        bid(&mut state, 1, 300).unwrap();
        bid(&mut state, 2, 400).unwrap();

        assert_eq!(queries::get_bidders(&state, &POOL), vec![[3u8; 32], [1u8; 32], [2u8; 32]]);
    }

    #[test]
    fn test_duplicate_bid_rejected() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();

        let again =
            handle_submit_bid(&mut state, &ctx([1u8; 32], 300), POOL, EncryptedHandle([9u8; 32]));
        assert_eq!(again, Err(ModuleError::AlreadyBid));
        assert_eq!(state.bid_count(1), 1);
    }

    #[test]
    fn test_bid_after_end_rejected() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        assert_eq!(bid(&mut state, 1, 1000), Err(ModuleError::BiddingEnded));
    }

    #[test]
    fn test_bid_without_auction_rejected() {
        let mut state = setup();
        assert_eq!(bid(&mut state, 1, 10), Err(ModuleError::NoAuction));
    }

    #[test]
    fn test_flagged_bidder_rejected() {
        let gate = Arc::new(Denylist::new([[6u8; 32]]));
        let mut state = ModuleState::new(&ModuleGenesisConfig::with_admin(ADMIN), gate);
        create(&mut state, 100, 1000).unwrap();

        assert_eq!(bid(&mut state, 6, 200), Err(ModuleError::BidderNotEligible));
        assert!(bid(&mut state, 7, 200).is_ok());
    }

    #[test]
    fn test_settle_twice_fails() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();
        bid(&mut state, 2, 300).unwrap();

        let winners = vec![winner(1, 6000), winner(2, 4000)];
        handle_settle(&mut state, &ctx(ADMIN, 1001), POOL, winners.clone()).unwrap();
        assert_eq!(
            handle_settle(&mut state, &ctx(ADMIN, 1002), POOL, winners),
            Err(ModuleError::AuctionNotActive)
        );

        assert!(queries::is_winner(&state, &POOL, &[1u8; 32]));
        assert_eq!(queries::get_allocation(&state, &POOL, &[2u8; 32]), 4000);
        assert!(!state.current_auction(&POOL).unwrap().is_active);
    }

    #[test]
    fn test_settle_before_end_fails() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();
        assert_eq!(
            handle_settle(&mut state, &ctx(ADMIN, 999), POOL, vec![winner(1, 1)]),
            Err(ModuleError::AuctionNotEnded)
        );
    }

    #[test]
    fn test_settle_requires_authority() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        assert_eq!(
            handle_settle(&mut state, &ctx([1u8; 32], 1001), POOL, vec![]),
            Err(ModuleError::NotAuthorized)
        );
    }

    #[test]
    fn test_settle_validates_winner_set() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();
        bid(&mut state, 2, 200).unwrap();

        let too_many = vec![winner(1, 1), winner(2, 1), winner(3, 1)];
        assert!(matches!(
            apply_settlement(&mut state, POOL, &too_many, 1001),
            Err(ModuleError::TooManyWinners { max: 2, got: 3 })
        ));
        assert_eq!(
            apply_settlement(&mut state, POOL, &[winner(1, 1), winner(1, 1)], 1001),
            Err(ModuleError::DuplicateWinner)
        );
        assert_eq!(
            apply_settlement(&mut state, POOL, &[winner(5, 1)], 1001),
            Err(ModuleError::UnknownBidder)
        );

        // Nothing was written by the rejected attempts.
        assert!(state.winners.is_empty());
        assert!(state.current_auction(&POOL).unwrap().is_active);
    }

    #[test]
    fn test_priority_window_and_execution() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();
        bid(&mut state, 2, 200).unwrap();
        assert!(!is_in_priority_window(&state, &POOL, 1100));

        apply_settlement(&mut state, POOL, &[winner(1, 10_000)], 1050).unwrap();
        assert!(is_in_priority_window(&state, &POOL, 1100));
        assert!(!is_in_priority_window(&state, &POOL, 1300));

        let ctx_loser = ctx([2u8; 32], 1100);
        assert_eq!(
            handle_record_execution(&mut state, &ctx_loser, POOL),
            Err(ModuleError::NotWinner)
        );

        let ctx_winner = ctx([1u8; 32], 1100);
        handle_record_execution(&mut state, &ctx_winner, POOL).unwrap();
        assert_eq!(
            handle_record_execution(&mut state, &ctx_winner, POOL),
            Err(ModuleError::AlreadyExecuted)
        );
        assert!(queries::get_bid(&state, &POOL, &[1u8; 32]).unwrap().has_executed);

        let late = ctx([1u8; 32], 1300);
        assert_eq!(
            handle_record_execution(&mut state, &late, POOL),
            Err(ModuleError::OutsidePriorityWindow)
        );
    }

    #[test]
    fn test_signal_ready_once() {
        let mut state = setup();
        create(&mut state, 100, 1000).unwrap();
        bid(&mut state, 1, 200).unwrap();

        assert_eq!(
            handle_signal_ready(&mut state, &ctx([7u8; 32], 999), POOL),
            Err(ModuleError::AuctionNotEnded)
        );
        assert_eq!(handle_signal_ready(&mut state, &ctx([7u8; 32], 1000), POOL), Ok(1));
        assert_eq!(
            handle_signal_ready(&mut state, &ctx([7u8; 32], 1001), POOL),
            Err(ModuleError::AlreadySignalled)
        );
        assert!(state.events.iter().any(|r| matches!(
            r.event,
            ModuleEvent::AuctionReadyToSettle { total_bidders: 1, .. }
        )));
    }
}
