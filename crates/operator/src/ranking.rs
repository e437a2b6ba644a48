//! Winner determination over resolved bid amounts.
//!
//! Ranking is by amount descending, then submission timestamp ascending. Bids
//! tied on both keep their ledger order, so every operator working from the
//! same bid list produces the same winner list.

use auction_types::{Address, WinnerEntry, ALLOCATION_BASIS_POINTS};

/// A bid whose sealed amount has been revealed to this operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBid {
    pub bidder: Address,
    pub amount: u64,
    pub timestamp: u64,
}

/// Rank bids and keep the top `max_winners` at or above `min_bid`.
pub fn rank_bids(bids: &[ResolvedBid], min_bid: u64, max_winners: u32) -> Vec<ResolvedBid> {
    let mut ranked: Vec<ResolvedBid> = bids
        .iter()
        .filter(|bid| bid.amount >= min_bid)
        .cloned()
        .collect();

    // Stable sort keeps ledger order for full ties.
    ranked.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.timestamp.cmp(&b.timestamp)));
    ranked.truncate(max_winners as usize);
    ranked
}

/// Split `ALLOCATION_BASIS_POINTS` across ranked winners in proportion to
/// their amounts.
///
/// Shares are floored; the rounding remainder goes to the top-ranked winner so
/// allocations always sum to exactly `ALLOCATION_BASIS_POINTS`. If every
/// amount is zero the supply is split evenly.
pub fn allocate(ranked: &[ResolvedBid]) -> Vec<WinnerEntry> {
    if ranked.is_empty() {
        return Vec::new();
    }

    let total: u128 = ranked.iter().map(|bid| bid.amount as u128).sum();
    let supply = ALLOCATION_BASIS_POINTS as u128;

    let mut shares: Vec<u64> = ranked
        .iter()
        .map(|bid| {
            if total == 0 {
                (supply / ranked.len() as u128) as u64
            } else {
                (bid.amount as u128 * supply / total) as u64
            }
        })
        .collect();

    let assigned: u64 = shares.iter().sum();
    shares[0] += ALLOCATION_BASIS_POINTS - assigned;

    ranked
        .iter()
        .zip(shares)
        .map(|(bid, allocation)| WinnerEntry {
            bidder: bid.bidder,
            amount: bid.amount,
            allocation,
        })
        .collect()
}

/// Rank, truncate and allocate in one step.
pub fn compute_winner_set(
    bids: &[ResolvedBid],
    min_bid: u64,
    max_winners: u32,
) -> Vec<WinnerEntry> {
    allocate(&rank_bids(bids, min_bid, max_winners))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(tag: u8, amount: u64, timestamp: u64) -> ResolvedBid {
        ResolvedBid {
            bidder: [tag; 32],
            amount,
            timestamp,
        }
    }

    #[test]
    fn test_rank_by_amount_then_time() {
        let bids = vec![bid(1, 100, 10), bid(2, 300, 30), bid(3, 300, 20), bid(4, 200, 5)];
        let ranked = rank_bids(&bids, 0, 10);
        let order: Vec<u8> = ranked.iter().map(|b| b.bidder[0]).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_full_tie_keeps_ledger_order() {
        let bids = vec![bid(9, 100, 10), bid(1, 100, 10)];
        let ranked = rank_bids(&bids, 0, 10);
        assert_eq!(ranked[0].bidder, [9u8; 32]);
    }

    #[test]
    fn test_truncate_and_min_bid() {
        let bids = vec![bid(1, 5, 1), bid(2, 50, 2), bid(3, 40, 3), bid(4, 30, 4)];
        let ranked = rank_bids(&bids, 10, 2);
        assert_eq!(ranked, vec![bid(2, 50, 2), bid(3, 40, 3)]);
    }

    #[test]
    fn test_allocation_is_proportional() {
        let winners = compute_winner_set(&[bid(1, 300, 1), bid(2, 200, 2), bid(3, 100, 3)], 0, 10);
        let allocations: Vec<u64> = winners.iter().map(|w| w.allocation).collect();
        // 5000 + 3333 + 1666 = 9999, remainder to the top bid.
        assert_eq!(allocations, vec![5001, 3333, 1666]);
        assert_eq!(winners[0].amount, 300);
    }

    #[test]
    fn test_allocation_sums_to_supply() {
        let bids: Vec<ResolvedBid> = (1..=7u8).map(|i| bid(i, i as u64 * 13, i as u64)).collect();
        let total: u64 = allocate(&rank_bids(&bids, 0, 7)).iter().map(|w| w.allocation).sum();
        assert_eq!(total, ALLOCATION_BASIS_POINTS);
    }

    #[test]
    fn test_zero_amounts_split_evenly() {
        let winners = allocate(&[bid(1, 0, 1), bid(2, 0, 2), bid(3, 0, 3)]);
        let allocations: Vec<u64> = winners.iter().map(|w| w.allocation).collect();
        assert_eq!(allocations, vec![3334, 3333, 3333]);
    }

    #[test]
    fn test_no_bids() {
        assert!(compute_winner_set(&[], 0, 5).is_empty());
        assert!(compute_winner_set(&[bid(1, 5, 1)], 10, 5).is_empty());
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        let winners = allocate(&[bid(1, u64::MAX, 1), bid(2, u64::MAX, 2)]);
        assert_eq!(winners[0].allocation + winners[1].allocation, ALLOCATION_BASIS_POINTS);
    }
}
