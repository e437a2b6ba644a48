//! End-to-end integration tests for quorum-settled auctions.
//!
//! These tests exercise the full auction lifecycle:
//! 1. Operator registration
//! 2. Auction creation
//! 3. Sealed bid submission
//! 4. Task creation once bidding has ended
//! 5. Independent operator pipelines voting to quorum
//! 6. Settlement, priority window and execution

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use auction_crypto::SealedValueOracle;
use auction_module::{
    coordinator, queries, CallOutcome, ModuleCall, ModuleError, ModuleEvent, ModuleGenesisConfig,
};
use auction_operator::{LocalChain, LocalResolver, OperatorConfig, OperatorError, OperatorService};
use auction_types::{compute_winner_commitment, Address, PoolId, TaskId, WinnerEntry};

use rand::rngs::StdRng;
use rand::SeedableRng;

const ADMIN: Address = [0xAA; 32];
const POOL: PoolId = [0x11; 32];
const OPERATORS: [Address; 3] = [[0xA1; 32], [0xA2; 32], [0xA3; 32]];
const STAKE: u64 = 1_000;
const START: u64 = 1_700_000_000;

/// A chain with three registered operators and a shared oracle.
struct Harness {
    chain: LocalChain,
    oracle: Arc<SealedValueOracle>,
    rng: StdRng,
}

impl Harness {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let genesis = ModuleGenesisConfig {
            initial_timestamp: START,
            ..ModuleGenesisConfig::with_admin(ADMIN)
        };
        let chain = LocalChain::from_genesis(&genesis);
        for op in OPERATORS {
            chain.submit(op, STAKE, ModuleCall::Register).unwrap();
        }

        Self {
            chain,
            oracle: Arc::new(SealedValueOracle::random(&mut rng)),
            rng,
        }
    }

    fn create_auction(&self, end_time: u64, max_winners: u32) -> u64 {
        let outcome = self
            .chain
            .submit(
                ADMIN,
                0,
                ModuleCall::CreateAuction {
                    pool_id: POOL,
                    end_time,
                    priority_window_duration: 600,
                    min_bid_amount: 0,
                    max_winners,
                },
            )
            .unwrap();
        match outcome {
            CallOutcome::AuctionCreated { auction_id } => auction_id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    /// Seal `amount`, let every operator resolve it, and submit the bid.
    fn bid(&mut self, bidder: Address, amount: u64) {
        let handle = self.oracle.seal(amount, bidder, &mut self.rng).unwrap();
        for op in OPERATORS {
            self.oracle.allow(&handle, &bidder, op).unwrap();
        }
        self.chain.advance_block();
        self.chain
            .submit(
                bidder,
                0,
                ModuleCall::SubmitBid {
                    pool_id: POOL,
                    encrypted_amount: handle,
                },
            )
            .unwrap();
    }

    fn create_task(&self, total_bidders: u32) -> TaskId {
        match self
            .chain
            .submit(
                ADMIN,
                0,
                ModuleCall::CreateTask {
                    pool_id: POOL,
                    total_bidders,
                },
            )
            .unwrap()
        {
            CallOutcome::TaskCreated { task_id } => task_id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn service(
        &self,
        op: Address,
    ) -> OperatorService<LocalChain, LocalResolver<SealedValueOracle>> {
        let config = OperatorConfig {
            poll_interval: Duration::from_millis(5),
            retry_backoff: Duration::from_millis(1),
            completion_timeout: Duration::from_millis(200),
            ..OperatorConfig::with_address(op)
        };
        let resolver = LocalResolver::new(self.oracle.clone());
        OperatorService::new(config, self.chain.clone(), resolver)
    }
}

fn bidder(tag: u8) -> Address {
    [tag; 32]
}

#[tokio::test]
async fn test_full_auction_flow() {
    let mut h = Harness::new();

    // ========================================
    // Phase 1: Auction and sealed bids
    // ========================================

    let end_time = START + 3600;
    let auction_id = h.create_auction(end_time, 10);

    h.bid(bidder(1), 300);
    h.bid(bidder(2), 100);
    h.bid(bidder(3), 200);
    assert_eq!(h.chain.read(|m| m.bid_count(auction_id)), 3);

    // ========================================
    // Phase 2: Bidding closes, task opens
    // ========================================

    h.chain.set_timestamp(end_time + 1);
    let task_id = h.create_task(3);
    assert_eq!(
        h.chain.read(|m| queries::pending_settlement(m, end_time + 1)),
        Vec::<PoolId>::new()
    );

    // ========================================
    // Phase 3: Two of three operators vote
    // ========================================

    let first = h.service(OPERATORS[0]);
    let second = h.service(OPERATORS[1]);
    let third = h.service(OPERATORS[2]);

    let a = first.process_task(task_id).await.unwrap().unwrap();
    assert_eq!(a.outcome.votes, 1);
    assert_eq!(a.outcome.required, 2);
    assert!(!a.outcome.quorum_reached);
    assert!(!h.chain.read(|m| coordinator::has_reached_quorum(m, task_id)));

    let b = second.process_task(task_id).await.unwrap().unwrap();
    assert_eq!(a.commitment, b.commitment);
    assert!(b.outcome.quorum_reached);
    assert!(h.chain.read(|m| coordinator::has_reached_quorum(m, task_id)));

    // The third operator finds the task already closed.
    assert!(third.process_task(task_id).await.unwrap().is_none());
    assert!(first.await_completion(task_id, &a.commitment).await.unwrap());

    // ========================================
    // Phase 4: Settlement written back
    // ========================================

    let allocations: Vec<u64> = [1, 3, 2]
        .iter()
        .map(|&t| h.chain.read(|m| queries::get_allocation(m, &POOL, &bidder(t))))
        .collect();
    assert_eq!(allocations, vec![5001, 3333, 1666]);
    assert_eq!(allocations.iter().sum::<u64>(), 10_000);

    for tag in 1..=3 {
        assert!(h.chain.read(|m| queries::is_winner(m, &POOL, &bidder(tag))));
    }

    let config = h.chain.read(|m| m.current_auction(&POOL).cloned()).unwrap();
    assert!(!config.is_active);
    assert_eq!(config.settled_at, Some(end_time + 1));

    let task = h.chain.read(|m| queries::get_task(m, task_id).cloned()).unwrap();
    assert!(task.completed);
    assert_eq!(task.agreed_commitment, Some(a.commitment));

    // ========================================
    // Phase 5: Priority window execution
    // ========================================

    h.chain
        .submit(bidder(1), 0, ModuleCall::RecordExecution { pool_id: POOL })
        .unwrap();
    let err = h
        .chain
        .submit(bidder(1), 0, ModuleCall::RecordExecution { pool_id: POOL })
        .unwrap_err();
    assert!(matches!(err, ModuleError::AlreadyExecuted));

    h.chain.set_timestamp(end_time + 600);
    let err = h
        .chain
        .submit(bidder(2), 0, ModuleCall::RecordExecution { pool_id: POOL })
        .unwrap_err();
    assert!(matches!(err, ModuleError::OutsidePriorityWindow));

    let responded = h.chain.read(|m| m.operators[&OPERATORS[0]].responses_submitted);
    assert_eq!(responded, 1);
}

#[tokio::test]
async fn test_operators_disagree_no_quorum() {
    let mut h = Harness::new();
    let end_time = START + 100;
    h.create_auction(end_time, 1);
    for tag in 1..=3 {
        h.bid(bidder(tag), 100 * tag as u64);
    }
    h.chain.set_timestamp(end_time);
    let task_id = h.create_task(3);

    // Each operator backs a different single winner.
    for (i, op) in OPERATORS.iter().enumerate() {
        let winners = vec![WinnerEntry {
            bidder: bidder(i as u8 + 1),
            amount: 100,
            allocation: 10_000,
        }];
        let commitment = compute_winner_commitment(&winners);
        let outcome = h
            .chain
            .submit(
                *op,
                0,
                ModuleCall::Respond {
                    task_id,
                    winners,
                    commitment,
                },
            )
            .unwrap();
        assert!(matches!(
            outcome,
            CallOutcome::Responded(r) if r.votes == 1 && !r.quorum_reached
        ));
    }

    assert!(!h.chain.read(|m| coordinator::has_reached_quorum(m, task_id)));
    let err = h
        .chain
        .submit(ADMIN, 0, ModuleCall::CompleteTask { task_id })
        .unwrap_err();
    assert!(matches!(err, ModuleError::QuorumNotReached { best: 1, required: 2 }));

    let config = h.chain.read(|m| m.current_auction(&POOL).cloned()).unwrap();
    assert!(config.is_active);
    assert!(!h.chain.read(|m| queries::is_winner(m, &POOL, &bidder(1))));

    // Pipelines waiting on this task time out.
    let service = h.service(OPERATORS[0]);
    let tallies = h.chain.read(|m| m.tallies[&task_id].clone());
    let err = service
        .await_completion(task_id, &tallies[0].commitment)
        .await
        .unwrap_err();
    assert!(matches!(err, OperatorError::Timeout(id) if id == task_id));
}

#[tokio::test]
async fn test_concurrent_pipelines_agree() {
    let mut h = Harness::new();
    let end_time = START + 100;
    h.create_auction(end_time, 2);
    h.bid(bidder(1), 50);
    h.bid(bidder(2), 150);
    h.bid(bidder(3), 150);
    h.chain.set_timestamp(end_time);
    let task_id = h.create_task(3);

    let handles: Vec<_> = OPERATORS
        .iter()
        .map(|&op| {
            let service = h.service(op);
            tokio::spawn(async move { service.process_task(task_id).await })
        })
        .collect();

    let mut submitted = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Some(submission)) => submitted.push(submission),
            Ok(None) => {}
            Err(e) => assert!(
                matches!(
                    e,
                    OperatorError::Module(ModuleError::TaskAlreadyCompleted(id)) if id == task_id
                ),
                "unexpected error {:?}",
                e
            ),
        }
    }

    assert!(submitted.len() >= 2);
    assert!(submitted.windows(2).all(|w| w[0].commitment == w[1].commitment));

    let task = h.chain.read(|m| queries::get_task(m, task_id).cloned()).unwrap();
    assert!(task.completed);

    // Equal amounts keep bid order: bidder 2 bid first.
    let winners = &submitted[0].winners;
    assert_eq!(winners[0].bidder, bidder(2));
    assert_eq!(winners[1].bidder, bidder(3));
    assert!(!h.chain.read(|m| queries::is_winner(m, &POOL, &bidder(1))));
}

#[tokio::test]
async fn test_task_completed_event_reaches_pollers() {
    let mut h = Harness::new();
    let end_time = START + 100;
    h.create_auction(end_time, 3);
    h.bid(bidder(1), 10);
    h.chain.set_timestamp(end_time);
    let task_id = h.create_task(1);

    let mut first = h.service(OPERATORS[0]);
    let mut second = h.service(OPERATORS[1]);
    assert_eq!(first.poll_once().await.unwrap(), 1);
    assert_eq!(first.pending().count(), 1);
    assert_eq!(second.poll_once().await.unwrap(), 1);

    // The first poller notices completion on its next pass.
    first.poll_once().await.unwrap();
    assert!(first.pending().next().is_none());

    let events = h.chain.read(|m| m.events_since(0).to_vec());
    assert!(events.iter().any(|r| matches!(
        r.event,
        ModuleEvent::TaskCompleted { task_id: id, .. } if id == task_id
    )));
}

#[test]
fn test_slash_is_capped_at_stake() {
    let h = Harness::new();
    let outcome = h
        .chain
        .submit(
            ADMIN,
            0,
            ModuleCall::Slash {
                operator: OPERATORS[0],
                amount: STAKE * 3,
                reason: "equivocation".into(),
            },
        )
        .unwrap();
    assert!(matches!(outcome, CallOutcome::Slashed { amount } if amount == STAKE));

    let op = h.chain.read(|m| m.operators[&OPERATORS[0]].clone());
    assert_eq!(op.stake, 0);
    assert_eq!(op.slashed_amount, STAKE);
    assert!(!op.is_active);
    assert_eq!(h.chain.read(|m| m.total_active_operators), 2);

    let err = h
        .chain
        .submit(
            ADMIN,
            0,
            ModuleCall::Slash {
                operator: OPERATORS[0],
                amount: 1,
                reason: "again".into(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ModuleError::NotRegistered));
}

#[test]
fn test_settle_twice_rejected() {
    let mut h = Harness::new();
    let end_time = START + 100;
    h.create_auction(end_time, 2);
    h.bid(bidder(1), 10);
    h.chain.set_timestamp(end_time);

    let winners = vec![WinnerEntry {
        bidder: bidder(1),
        amount: 10,
        allocation: 10_000,
    }];
    h.chain
        .submit(
            ADMIN,
            0,
            ModuleCall::Settle {
                pool_id: POOL,
                winners: winners.clone(),
            },
        )
        .unwrap();

    let err = h
        .chain
        .submit(ADMIN, 0, ModuleCall::Settle { pool_id: POOL, winners })
        .unwrap_err();
    assert!(matches!(err, ModuleError::AuctionNotActive));
}

#[test]
fn test_new_auction_after_settlement() {
    let mut h = Harness::new();
    let end_time = START + 100;
    let first_id = h.create_auction(end_time, 2);
    h.bid(bidder(1), 10);

    // A running auction blocks a new one; a settled one does not.
    let err = h
        .chain
        .submit(
            ADMIN,
            0,
            ModuleCall::CreateAuction {
                pool_id: POOL,
                end_time: end_time + 500,
                priority_window_duration: 60,
                min_bid_amount: 0,
                max_winners: 1,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ModuleError::AuctionAlreadyActive));

    h.chain.set_timestamp(end_time);
    h.chain
        .submit(
            ADMIN,
            0,
            ModuleCall::Settle {
                pool_id: POOL,
                winners: vec![WinnerEntry {
                    bidder: bidder(1),
                    amount: 10,
                    allocation: 10_000,
                }],
            },
        )
        .unwrap();

    let second_id = h.create_auction(end_time + 1_000, 2);
    assert_ne!(first_id, second_id);

    // The new auction starts with no bids and no winners.
    assert!(h.chain.read(|m| queries::get_bids(m, &POOL)).is_empty());
    assert!(!h.chain.read(|m| queries::is_winner(m, &POOL, &bidder(1))));

    // Bidder 1 may bid again in the new round.
    h.bid(bidder(1), 20);
    assert_eq!(h.chain.read(|m| m.bid_count(second_id)), 1);
}
