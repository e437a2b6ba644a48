//! Chain access for the operator pipeline.
//!
//! `ChainClient` is the seam between the pipeline and the shared state store.
//! `RpcChainClient` talks to a mock-chain node over JSON-RPC; `LocalChain`
//! wraps an in-process `ModuleState` behind a lock, for tests and embedding.

use std::sync::Arc;

use auction_module::{
    dispatch, CallContext, CallOutcome, EventRecord, HandlerResult, ModuleCall,
    ModuleGenesisConfig, ModuleState, RespondOutcome,
};
use auction_types::{
    Address, AuctionConfig, Bid, Commitment, Operator, PoolId, Task, TaskId, WinnerEntry,
};
use jsonrpsee::core::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, Result};

/// Read and write access to the state store, as seen by one operator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain timestamp.
    async fn now(&self) -> Result<u64>;

    /// Events with `seq >= cursor`, at most `limit`.
    async fn events(&self, cursor: u64, limit: u64) -> Result<Vec<EventRecord>>;

    async fn task(&self, task_id: TaskId) -> Result<Option<Task>>;

    /// Current auction of a pool.
    async fn auction(&self, pool_id: &PoolId) -> Result<Option<AuctionConfig>>;

    /// Bids on the pool's current auction, in submission order.
    async fn bids(&self, pool_id: &PoolId) -> Result<Vec<Bid>>;

    async fn operator(&self, address: &Address) -> Result<Option<Operator>>;

    /// Whether `operator` already answered `task_id`.
    async fn has_responded(&self, task_id: TaskId, operator: &Address) -> Result<bool>;

    async fn register(&self, operator: &Address, stake: u64) -> Result<()>;

    async fn deregister(&self, operator: &Address) -> Result<u64>;

    async fn respond(
        &self,
        operator: &Address,
        task_id: TaskId,
        winners: Vec<WinnerEntry>,
        commitment: Commitment,
    ) -> Result<RespondOutcome>;
}

/// Chain clock and module state held in process.
#[derive(Debug)]
pub struct ChainState {
    pub module: ModuleState,
    pub block_height: u64,
    pub timestamp: u64,
}

/// In-process chain shared by every clone.
///
/// Each call takes the write lock for its whole duration, so calls are atomic
/// and totally ordered.
#[derive(Debug, Clone)]
pub struct LocalChain {
    state: Arc<RwLock<ChainState>>,
}

impl LocalChain {
    pub fn new(module: ModuleState, timestamp: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState {
                module,
                block_height: 0,
                timestamp,
            })),
        }
    }

    /// Start a chain from genesis, admitting every bidder.
    pub fn from_genesis(genesis: &ModuleGenesisConfig) -> Self {
        Self::new(ModuleState::with_genesis(genesis), genesis.initial_timestamp)
    }

    /// Execute a call as `sender` with `value` attached.
    pub fn submit(
        &self,
        sender: Address,
        value: u64,
        call: ModuleCall,
    ) -> HandlerResult<CallOutcome> {
        let mut state = self.state.write();
        let ctx = CallContext {
            sender,
            block_height: state.block_height,
            timestamp: state.timestamp,
            value,
        };
        dispatch(&mut state.module, &ctx, call)
    }

    /// Run a read-only closure against the module state.
    pub fn read<T>(&self, f: impl FnOnce(&ModuleState) -> T) -> T {
        f(&self.state.read().module)
    }

    pub fn timestamp(&self) -> u64 {
        self.state.read().timestamp
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.write().timestamp = timestamp;
    }

    /// Advance one block of ~12 seconds.
    pub fn advance_block(&self) {
        let mut state = self.state.write();
        state.block_height += 1;
        state.timestamp += 12;
    }
}

#[async_trait]
impl ChainClient for LocalChain {
    async fn now(&self) -> Result<u64> {
        Ok(self.timestamp())
    }

    async fn events(&self, cursor: u64, limit: u64) -> Result<Vec<EventRecord>> {
        Ok(self.read(|m| m.events_since(cursor).iter().take(limit as usize).cloned().collect()))
    }

    async fn task(&self, task_id: TaskId) -> Result<Option<Task>> {
        Ok(self.read(|m| m.tasks.get(&task_id).cloned()))
    }

    async fn auction(&self, pool_id: &PoolId) -> Result<Option<AuctionConfig>> {
        Ok(self.read(|m| m.current_auction(pool_id).cloned()))
    }

    async fn bids(&self, pool_id: &PoolId) -> Result<Vec<Bid>> {
        Ok(self.read(|m| auction_module::queries::get_bids(m, pool_id)))
    }

    async fn operator(&self, address: &Address) -> Result<Option<Operator>> {
        Ok(self.read(|m| m.operators.get(address).cloned()))
    }

    async fn has_responded(&self, task_id: TaskId, operator: &Address) -> Result<bool> {
        Ok(self.read(|m| m.responses.contains_key(&(task_id, *operator))))
    }

    async fn register(&self, operator: &Address, stake: u64) -> Result<()> {
        self.submit(*operator, stake, ModuleCall::Register)?;
        Ok(())
    }

    async fn deregister(&self, operator: &Address) -> Result<u64> {
        match self.submit(*operator, 0, ModuleCall::Deregister)? {
            CallOutcome::Refunded { amount } => Ok(amount),
            other => Err(OperatorError::Chain(format!("Unexpected outcome: {:?}", other))),
        }
    }

    async fn respond(
        &self,
        operator: &Address,
        task_id: TaskId,
        winners: Vec<WinnerEntry>,
        commitment: Commitment,
    ) -> Result<RespondOutcome> {
        let call = ModuleCall::Respond {
            task_id,
            winners,
            commitment,
        };
        match self.submit(*operator, 0, call)? {
            CallOutcome::Responded(outcome) => Ok(outcome),
            other => Err(OperatorError::Chain(format!("Unexpected outcome: {:?}", other))),
        }
    }
}

/// Block info returned by `chain_getBlockInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub timestamp: u64,
}

/// JSON-RPC client for a mock-chain node.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: HttpClient,
}

impl RpcChainClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = HttpClientBuilder::default().build(endpoint).map_err(|e| {
            OperatorError::Config(format!("Invalid RPC endpoint {}: {}", endpoint, e))
        })?;
        Ok(Self { client })
    }

    pub fn inner(&self) -> &HttpClient {
        &self.client
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn now(&self) -> Result<u64> {
        let info: BlockInfo = self.client.request("chain_getBlockInfo", rpc_params![]).await?;
        Ok(info.timestamp)
    }

    async fn events(&self, cursor: u64, limit: u64) -> Result<Vec<EventRecord>> {
        Ok(self
            .client
            .request("query_getEvents", rpc_params![cursor, limit])
            .await?)
    }

    async fn task(&self, task_id: TaskId) -> Result<Option<Task>> {
        Ok(self.client.request("query_getTask", rpc_params![task_id]).await?)
    }

    async fn auction(&self, pool_id: &PoolId) -> Result<Option<AuctionConfig>> {
        Ok(self
            .client
            .request("query_getAuction", rpc_params![hex::encode(pool_id)])
            .await?)
    }

    async fn bids(&self, pool_id: &PoolId) -> Result<Vec<Bid>> {
        Ok(self
            .client
            .request("query_getBids", rpc_params![hex::encode(pool_id)])
            .await?)
    }

    async fn operator(&self, address: &Address) -> Result<Option<Operator>> {
        Ok(self
            .client
            .request("query_getOperator", rpc_params![hex::encode(address)])
            .await?)
    }

    async fn has_responded(&self, task_id: TaskId, operator: &Address) -> Result<bool> {
        Ok(self
            .client
            .request("query_hasResponded", rpc_params![task_id, hex::encode(operator)])
            .await?)
    }

    async fn register(&self, operator: &Address, stake: u64) -> Result<()> {
        let _: bool = self
            .client
            .request("operator_register", rpc_params![hex::encode(operator), stake])
            .await?;
        Ok(())
    }

    async fn deregister(&self, operator: &Address) -> Result<u64> {
        Ok(self
            .client
            .request("operator_deregister", rpc_params![hex::encode(operator)])
            .await?)
    }

    async fn respond(
        &self,
        operator: &Address,
        task_id: TaskId,
        winners: Vec<WinnerEntry>,
        commitment: Commitment,
    ) -> Result<RespondOutcome> {
        let params = serde_json::json!({
            "sender": hex::encode(operator),
            "task_id": task_id,
            "winners": winners,
            "commitment": hex::encode(commitment),
        });
        Ok(self.client.request("task_respond", rpc_params![params]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: [u8; 32] = [0xAA; 32];

    #[tokio::test]
    async fn test_local_chain_register_and_events() {
        let chain = LocalChain::from_genesis(&ModuleGenesisConfig::with_admin(ADMIN));
        let op = [0xA1; 32];

        chain.register(&op, 1_000).await.unwrap();
        assert!(chain.operator(&op).await.unwrap().unwrap().is_active);

        let events = chain.events(0, 10).await.unwrap();
        assert_eq!(events.len(), 1);

        assert!(matches!(
            chain.register(&op, 1_000).await,
            Err(OperatorError::Module(auction_module::ModuleError::AlreadyRegistered))
        ));
        assert_eq!(chain.deregister(&op).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_local_chain_clock() {
        let chain = LocalChain::from_genesis(&ModuleGenesisConfig::default());
        chain.set_timestamp(100);
        chain.advance_block();
        assert_eq!(chain.now().await.unwrap(), 112);
    }
}
