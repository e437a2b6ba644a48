//! State structures for the auction module.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use auction_types::{
    Address, AuctionConfig, Bid, Operator, PoolId, SlashRecord, Task, TaskId, TaskResponse,
    VoteTally, WinnerRecord,
};

use crate::events::{EventRecord, ModuleEvent};
use crate::gate::{AllowAll, ReputationGate};
use crate::genesis::{CoordinatorParams, ModuleGenesisConfig, RegistryParams};

/// Auction module state.
///
/// Ledger, registry and coordinator share this one store. Every handler takes
/// it by `&mut` and validates before writing, so each call is atomic and
/// calls are totally ordered by whoever owns the store.
#[derive(Debug)]
pub struct ModuleState {
    /// Address allowed to create auctions and tasks
    pub configurer: Address,

    /// Address allowed to settle with an externally agreed result
    pub settlement_authority: Address,

    // === Auction ledger ===
    /// Next auction ID to assign
    pub next_auction_id: u64,

    /// All auction configs by ID, including superseded ones
    pub auctions: HashMap<u64, AuctionConfig>,

    /// Latest auction per pool
    pub pool_auctions: HashMap<PoolId, u64>,

    /// Bids: (auction_id, bidder) -> bid
    pub bids: HashMap<(u64, Address), Bid>,

    /// Bidders per auction, in submission order
    pub auction_bidders: HashMap<u64, Vec<Address>>,

    /// Winner records: (auction_id, bidder) -> record
    pub winners: HashMap<(u64, Address), WinnerRecord>,

    /// Auctions whose ready-to-settle signal was emitted
    pub ready_signalled: HashSet<u64>,

    // === Operator registry ===
    pub registry: RegistryParams,

    /// Operators by address
    pub operators: HashMap<Address, Operator>,

    /// Operators in registration order
    pub operator_list: Vec<Address>,

    /// Count of operators with `is_active == true`
    pub total_active_operators: u64,

    /// Every slash ever applied
    pub slash_log: Vec<SlashRecord>,

    // === Task coordinator ===
    pub coordinator: CoordinatorParams,

    /// Next task ID to assign
    pub next_task_id: TaskId,

    /// Tasks by ID
    pub tasks: HashMap<TaskId, Task>,

    /// Responses: (task_id, operator) -> response
    pub responses: HashMap<(TaskId, Address), TaskResponse>,

    /// Responders per task, in submission order
    pub task_responders: HashMap<TaskId, Vec<Address>>,

    /// Vote tallies per task, in order of first appearance
    pub tallies: HashMap<TaskId, Vec<VoteTally>>,

    /// Challenges already applied
    pub challenged: HashSet<(TaskId, Address)>,

    // === Events ===
    pub events: Vec<EventRecord>,

    gate: Arc<dyn ReputationGate>,
}

impl ModuleState {
    /// Create a module state from genesis, with the given reputation gate.
    pub fn new(genesis: &ModuleGenesisConfig, gate: Arc<dyn ReputationGate>) -> Self {
        Self {
            configurer: genesis.configurer,
            settlement_authority: genesis.settlement_authority,
            next_auction_id: 1,
            auctions: HashMap::new(),
            pool_auctions: HashMap::new(),
            bids: HashMap::new(),
            auction_bidders: HashMap::new(),
            winners: HashMap::new(),
            ready_signalled: HashSet::new(),
            registry: genesis.registry.clone(),
            operators: HashMap::new(),
            operator_list: Vec::new(),
            total_active_operators: 0,
            slash_log: Vec::new(),
            coordinator: genesis.coordinator.clone(),
            next_task_id: 1,
            tasks: HashMap::new(),
            responses: HashMap::new(),
            task_responders: HashMap::new(),
            tallies: HashMap::new(),
            challenged: HashSet::new(),
            events: Vec::new(),
            gate,
        }
    }

    /// Create a module state that admits every bidder.
    pub fn with_genesis(genesis: &ModuleGenesisConfig) -> Self {
        Self::new(genesis, Arc::new(AllowAll))
    }

    pub fn gate(&self) -> &dyn ReputationGate {
        self.gate.as_ref()
    }

    /// Get the next auction ID and increment.
    pub fn allocate_auction_id(&mut self) -> u64 {
        let id = self.next_auction_id;
        self.next_auction_id += 1;
        id
    }

    /// Get the next task ID and increment.
    pub fn allocate_task_id(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    /// Get auction by ID.
    pub fn get_auction(&self, auction_id: u64) -> Option<&AuctionConfig> {
        self.auctions.get(&auction_id)
    }

    /// Get the latest auction configured for a pool.
    pub fn current_auction(&self, pool_id: &PoolId) -> Option<&AuctionConfig> {
        self.pool_auctions
            .get(pool_id)
            .and_then(|id| self.auctions.get(id))
    }

    /// Get mutable latest auction for a pool.
    pub fn current_auction_mut(&mut self, pool_id: &PoolId) -> Option<&mut AuctionConfig> {
        let id = *self.pool_auctions.get(pool_id)?;
        self.auctions.get_mut(&id)
    }

    /// Get all bids for an auction, in submission order.
    pub fn get_auction_bids(&self, auction_id: u64) -> Vec<&Bid> {
        self.auction_bidders
            .get(&auction_id)
            .map(|bidders| {
                bidders
                    .iter()
                    .filter_map(|bidder| self.bids.get(&(auction_id, *bidder)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of bids on an auction.
    pub fn bid_count(&self, auction_id: u64) -> usize {
        self.auction_bidders
            .get(&auction_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Get an operator only if it is currently active.
    pub fn active_operator(&self, address: &Address) -> Option<&Operator> {
        self.operators.get(address).filter(|op| op.is_active)
    }

    /// Count active operators by scanning the registry.
    pub fn count_active_operators(&self) -> u64 {
        self.operators.values().filter(|op| op.is_active).count() as u64
    }

    /// Append an event stamped with `timestamp`.
    pub fn emit(&mut self, timestamp: u64, event: ModuleEvent) {
        let seq = self.events.len() as u64;
        self.events.push(EventRecord {
            seq,
            timestamp,
            event,
        });
    }

    /// Events with `seq >= cursor`.
    pub fn events_since(&self, cursor: u64) -> &[EventRecord] {
        let start = (cursor as usize).min(self.events.len());
        &self.events[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ModuleState {
        ModuleState::with_genesis(&ModuleGenesisConfig::default())
    }

    #[test]
    fn test_allocate_ids() {
        let mut state = state();
        assert_eq!(state.allocate_auction_id(), 1);
        assert_eq!(state.allocate_auction_id(), 2);
        assert_eq!(state.allocate_task_id(), 1);
        assert_eq!(state.allocate_task_id(), 2);
    }

    #[test]
    fn test_event_cursor() {
        let mut state = state();
        for operator in 0..3u8 {
            state.emit(
                10,
                ModuleEvent::OperatorRegistered {
                    operator: [operator; 32],
                    stake: 1,
                },
            );
        }

        assert_eq!(state.events_since(0).len(), 3);
        assert_eq!(state.events_since(2).len(), 1);
        assert_eq!(state.events_since(2)[0].seq, 2);
        assert!(state.events_since(10).is_empty());
    }
}
