//! Mock chain server for local testing of the auction system.
//!
//! This provides a JSON-RPC server that simulates on-chain state management
//! for the auction module without requiring a real blockchain. It also hosts
//! the sealed-value oracle that bidders seal amounts with and operators
//! resolve them through.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::Server;
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use auction_crypto::{OracleError, SealedValueOracle, ValueOracle};
use auction_module::{
    coordinator, dispatch, ledger, queries, CallContext, CallOutcome, Denylist, EventRecord,
    ModuleCall, ModuleError, ModuleGenesisConfig, ModuleState, RespondOutcome,
};
use auction_types::{AuctionConfig, Bid, EncryptedHandle, Operator, Task, VoteTally};

mod types;
use types::*;

#[derive(Parser)]
#[command(name = "mock-chain")]
#[command(about = "Local JSON-RPC chain hosting the auction module")]
struct Cli {
    /// Address to bind the RPC server to
    #[arg(long, default_value = "127.0.0.1:9944")]
    bind: SocketAddr,

    /// Genesis config (JSON). Defaults apply when omitted.
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// Address holding both privileged roles, overriding the genesis file
    #[arg(long)]
    admin: Option<String>,

    /// Bidder addresses rejected by the reputation gate
    #[arg(long = "deny")]
    denied: Vec<String>,
}

/// Shared chain state.
struct ChainState {
    /// Module state
    module: ModuleState,
    /// Current block height (simulated)
    block_height: u64,
    /// Current timestamp (simulated, can be advanced)
    timestamp: u64,
}

impl ChainState {
    fn new(module: ModuleState, timestamp: u64) -> Self {
        Self {
            module,
            block_height: 0,
            timestamp,
        }
    }

    fn advance_block(&mut self) {
        self.block_height += 1;
        self.timestamp += 12; // ~12 second blocks
    }

    fn block_info(&self) -> BlockInfo {
        BlockInfo {
            height: self.block_height,
            timestamp: self.timestamp,
        }
    }
}

/// RPC API definition for the mock chain.
#[rpc(server)]
pub trait MockChainApi {
    // ============ Admin Methods ============

    /// Advance the chain by one block.
    #[method(name = "admin_advanceBlock")]
    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned>;

    /// Set the current timestamp (for testing time-dependent logic).
    #[method(name = "admin_setTimestamp")]
    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned>;

    /// Get current block info.
    #[method(name = "chain_getBlockInfo")]
    async fn chain_get_block_info(&self) -> Result<BlockInfo, ErrorObjectOwned>;

    // ============ Auction Ledger ============

    #[method(name = "auction_create")]
    async fn auction_create(&self, params: CreateAuctionParams) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "auction_submitBid")]
    async fn auction_submit_bid(&self, params: SubmitBidParams) -> Result<bool, ErrorObjectOwned>;

    /// Settle with an externally agreed winner set.
    #[method(name = "auction_settle")]
    async fn auction_settle(&self, params: SettleParams) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "auction_signalReady")]
    async fn auction_signal_ready(
        &self,
        sender: String,
        pool_id: String,
    ) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "auction_recordExecution")]
    async fn auction_record_execution(
        &self,
        sender: String,
        pool_id: String,
    ) -> Result<bool, ErrorObjectOwned>;

    // ============ Operator Registry ============

    #[method(name = "operator_register")]
    async fn operator_register(&self, sender: String, stake: u64) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "operator_deregister")]
    async fn operator_deregister(&self, sender: String) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "operator_slash")]
    async fn operator_slash(&self, params: SlashParams) -> Result<u64, ErrorObjectOwned>;

    // ============ Task Coordinator ============

    #[method(name = "task_create")]
    async fn task_create(
        &self,
        sender: String,
        pool_id: String,
        total_bidders: u32,
    ) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "task_respond")]
    async fn task_respond(&self, params: RespondParams) -> Result<RespondOutcome, ErrorObjectOwned>;

    #[method(name = "task_complete")]
    async fn task_complete(&self, sender: String, task_id: u64) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "task_challenge")]
    async fn task_challenge(&self, params: ChallengeParams) -> Result<u64, ErrorObjectOwned>;

    // ============ Query Methods ============

    #[method(name = "query_getAuction")]
    async fn query_get_auction(
        &self,
        pool_id: String,
    ) -> Result<Option<AuctionConfig>, ErrorObjectOwned>;

    #[method(name = "query_getBids")]
    async fn query_get_bids(&self, pool_id: String) -> Result<Vec<Bid>, ErrorObjectOwned>;

    #[method(name = "query_getBidders")]
    async fn query_get_bidders(&self, pool_id: String) -> Result<Vec<String>, ErrorObjectOwned>;

    #[method(name = "query_isWinner")]
    async fn query_is_winner(
        &self,
        pool_id: String,
        bidder: String,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "query_getAllocation")]
    async fn query_get_allocation(
        &self,
        pool_id: String,
        bidder: String,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Evaluated at the chain's current timestamp.
    #[method(name = "query_isInPriorityWindow")]
    async fn query_is_in_priority_window(&self, pool_id: String) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "query_getOperator")]
    async fn query_get_operator(
        &self,
        address: String,
    ) -> Result<Option<Operator>, ErrorObjectOwned>;

    #[method(name = "query_getTask")]
    async fn query_get_task(&self, task_id: u64) -> Result<Option<Task>, ErrorObjectOwned>;

    #[method(name = "query_hasResponded")]
    async fn query_has_responded(
        &self,
        task_id: u64,
        operator: String,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "query_getTallies")]
    async fn query_get_tallies(&self, task_id: u64) -> Result<Vec<VoteTally>, ErrorObjectOwned>;

    #[method(name = "query_hasReachedQuorum")]
    async fn query_has_reached_quorum(&self, task_id: u64) -> Result<bool, ErrorObjectOwned>;

    /// Pools whose auction has ended and has no open task.
    #[method(name = "query_pendingSettlement")]
    async fn query_pending_settlement(&self) -> Result<Vec<String>, ErrorObjectOwned>;

    #[method(name = "query_getEvents")]
    async fn query_get_events(
        &self,
        cursor: u64,
        limit: u64,
    ) -> Result<Vec<EventRecord>, ErrorObjectOwned>;

    // ============ Oracle ============

    /// Seal a value for `owner`; returns the handle.
    #[method(name = "oracle_seal")]
    async fn oracle_seal(
        &self,
        owner: String,
        value: u64,
    ) -> Result<EncryptedHandle, ErrorObjectOwned>;

    /// Grant `party` access to a handle. `caller` must own it.
    #[method(name = "oracle_allow")]
    async fn oracle_allow(
        &self,
        handle: String,
        caller: String,
        party: String,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "oracle_resolve")]
    async fn oracle_resolve(&self, handle: String, party: String) -> Result<u64, ErrorObjectOwned>;
}

/// Implementation of the mock chain RPC server.
struct MockChainServer {
    state: Arc<RwLock<ChainState>>,
    oracle: Arc<SealedValueOracle>,
}

impl MockChainServer {
    fn new(module: ModuleState, timestamp: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new(module, timestamp))),
            oracle: Arc::new(SealedValueOracle::random(&mut OsRng)),
        }
    }

    /// Dispatch a call under the write lock.
    fn execute(
        &self,
        sender: &str,
        value: u64,
        call: ModuleCall,
    ) -> Result<CallOutcome, ErrorObjectOwned> {
        let sender = parse_address(sender)?;
        let mut state = self.state.write();
        let ctx = CallContext {
            sender,
            block_height: state.block_height,
            timestamp: state.timestamp,
            value,
        };
        let name = call.name();
        let outcome = dispatch(&mut state.module, &ctx, call).map_err(Self::module_error)?;
        info!(call = name, sender = %hex::encode(&sender[..4]), "Call executed");
        Ok(outcome)
    }

    fn module_error(err: ModuleError) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000 - err.kind().code(), err.to_string(), None::<()>)
    }

    fn oracle_error(err: OracleError) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(ORACLE_ERROR_CODE, err.to_string(), None::<()>)
    }

    fn unexpected(outcome: CallOutcome) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32603, format!("Unexpected outcome: {:?}", outcome), None::<()>)
    }
}

#[async_trait]
impl MockChainApiServer for MockChainServer {
    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned> {
        let mut state = self.state.write();
        state.advance_block();
        Ok(state.block_info())
    }

    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned> {
        self.state.write().timestamp = timestamp;
        info!("Timestamp set to {}", timestamp);
        Ok(true)
    }

    async fn chain_get_block_info(&self) -> Result<BlockInfo, ErrorObjectOwned> {
        Ok(self.state.read().block_info())
    }

    async fn auction_create(&self, params: CreateAuctionParams) -> Result<u64, ErrorObjectOwned> {
        let call = ModuleCall::CreateAuction {
            pool_id: parse_bytes32("pool_id", &params.pool_id)?,
            end_time: params.end_time,
            priority_window_duration: params.priority_window_duration,
            min_bid_amount: params.min_bid_amount,
            max_winners: params.max_winners,
        };
        match self.execute(&params.sender, 0, call)? {
            CallOutcome::AuctionCreated { auction_id } => Ok(auction_id),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn auction_submit_bid(&self, params: SubmitBidParams) -> Result<bool, ErrorObjectOwned> {
        let call = ModuleCall::SubmitBid {
            pool_id: parse_bytes32("pool_id", &params.pool_id)?,
            encrypted_amount: params.encrypted_amount,
        };
        self.execute(&params.sender, 0, call)?;
        Ok(true)
    }

    async fn auction_settle(&self, params: SettleParams) -> Result<bool, ErrorObjectOwned> {
        let call = ModuleCall::Settle {
            pool_id: parse_bytes32("pool_id", &params.pool_id)?,
            winners: params.winners,
        };
        self.execute(&params.sender, 0, call)?;
        Ok(true)
    }

    async fn auction_signal_ready(
        &self,
        sender: String,
        pool_id: String,
    ) -> Result<u64, ErrorObjectOwned> {
        let call = ModuleCall::SignalReady {
            pool_id: parse_bytes32("pool_id", &pool_id)?,
        };
        match self.execute(&sender, 0, call)? {
            CallOutcome::ReadySignalled { auction_id } => Ok(auction_id),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn auction_record_execution(
        &self,
        sender: String,
        pool_id: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let call = ModuleCall::RecordExecution {
            pool_id: parse_bytes32("pool_id", &pool_id)?,
        };
        self.execute(&sender, 0, call)?;
        Ok(true)
    }

    async fn operator_register(
        &self,
        sender: String,
        stake: u64,
    ) -> Result<bool, ErrorObjectOwned> {
        self.execute(&sender, stake, ModuleCall::Register)?;
        Ok(true)
    }

    async fn operator_deregister(&self, sender: String) -> Result<u64, ErrorObjectOwned> {
        match self.execute(&sender, 0, ModuleCall::Deregister)? {
            CallOutcome::Refunded { amount } => Ok(amount),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn operator_slash(&self, params: SlashParams) -> Result<u64, ErrorObjectOwned> {
        let call = ModuleCall::Slash {
            operator: parse_address(&params.operator)?,
            amount: params.amount,
            reason: params.reason,
        };
        match self.execute(&params.sender, 0, call)? {
            CallOutcome::Slashed { amount } => Ok(amount),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn task_create(
        &self,
        sender: String,
        pool_id: String,
        total_bidders: u32,
    ) -> Result<u64, ErrorObjectOwned> {
        let call = ModuleCall::CreateTask {
            pool_id: parse_bytes32("pool_id", &pool_id)?,
            total_bidders,
        };
        match self.execute(&sender, 0, call)? {
            CallOutcome::TaskCreated { task_id } => Ok(task_id),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn task_respond(
        &self,
        params: RespondParams,
    ) -> Result<RespondOutcome, ErrorObjectOwned> {
        let call = ModuleCall::Respond {
            task_id: params.task_id,
            winners: params.winners,
            commitment: parse_bytes32("commitment", &params.commitment)?,
        };
        match self.execute(&params.sender, 0, call)? {
            CallOutcome::Responded(outcome) => Ok(outcome),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn task_complete(&self, sender: String, task_id: u64) -> Result<bool, ErrorObjectOwned> {
        self.execute(&sender, 0, ModuleCall::CompleteTask { task_id })?;
        Ok(true)
    }

    async fn task_challenge(&self, params: ChallengeParams) -> Result<u64, ErrorObjectOwned> {
        let call = ModuleCall::Challenge {
            task_id: params.task_id,
            operator: parse_address(&params.operator)?,
            proof: parse_proof(&params.proof)?,
        };
        match self.execute(&params.sender, 0, call)? {
            CallOutcome::Slashed { amount } => Ok(amount),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn query_get_auction(
        &self,
        pool_id: String,
    ) -> Result<Option<AuctionConfig>, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        Ok(self.state.read().module.current_auction(&pool_id).cloned())
    }

    async fn query_get_bids(&self, pool_id: String) -> Result<Vec<Bid>, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        Ok(queries::get_bids(&self.state.read().module, &pool_id))
    }

    async fn query_get_bidders(&self, pool_id: String) -> Result<Vec<String>, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        Ok(queries::get_bidders(&self.state.read().module, &pool_id)
            .iter()
            .map(hex::encode)
            .collect())
    }

    async fn query_is_winner(
        &self,
        pool_id: String,
        bidder: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        let bidder = parse_address(&bidder)?;
        Ok(queries::is_winner(&self.state.read().module, &pool_id, &bidder))
    }

    async fn query_get_allocation(
        &self,
        pool_id: String,
        bidder: String,
    ) -> Result<u64, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        let bidder = parse_address(&bidder)?;
        Ok(queries::get_allocation(&self.state.read().module, &pool_id, &bidder))
    }

    async fn query_is_in_priority_window(&self, pool_id: String) -> Result<bool, ErrorObjectOwned> {
        let pool_id = parse_bytes32("pool_id", &pool_id)?;
        let state = self.state.read();
        Ok(ledger::is_in_priority_window(&state.module, &pool_id, state.timestamp))
    }

    async fn query_get_operator(
        &self,
        address: String,
    ) -> Result<Option<Operator>, ErrorObjectOwned> {
        let address = parse_address(&address)?;
        Ok(self.state.read().module.operators.get(&address).cloned())
    }

    async fn query_get_task(&self, task_id: u64) -> Result<Option<Task>, ErrorObjectOwned> {
        Ok(queries::get_task(&self.state.read().module, task_id).cloned())
    }

    async fn query_has_responded(
        &self,
        task_id: u64,
        operator: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let operator = parse_address(&operator)?;
        Ok(self
            .state
            .read()
            .module
            .responses
            .contains_key(&(task_id, operator)))
    }

    async fn query_get_tallies(&self, task_id: u64) -> Result<Vec<VoteTally>, ErrorObjectOwned> {
        Ok(self
            .state
            .read()
            .module
            .tallies
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_has_reached_quorum(&self, task_id: u64) -> Result<bool, ErrorObjectOwned> {
        Ok(coordinator::has_reached_quorum(&self.state.read().module, task_id))
    }

    async fn query_pending_settlement(&self) -> Result<Vec<String>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(queries::pending_settlement(&state.module, state.timestamp)
            .iter()
            .map(hex::encode)
            .collect())
    }

    async fn query_get_events(
        &self,
        cursor: u64,
        limit: u64,
    ) -> Result<Vec<EventRecord>, ErrorObjectOwned> {
        Ok(self
            .state
            .read()
            .module
            .events_since(cursor)
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn oracle_seal(
        &self,
        owner: String,
        value: u64,
    ) -> Result<EncryptedHandle, ErrorObjectOwned> {
        let owner = parse_address(&owner)?;
        self.oracle
            .seal(value, owner, &mut OsRng)
            .map_err(Self::oracle_error)
    }

    async fn oracle_allow(
        &self,
        handle: String,
        caller: String,
        party: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let handle = parse_handle(&handle)?;
        self.oracle
            .allow(&handle, &parse_address(&caller)?, parse_address(&party)?)
            .map_err(Self::oracle_error)?;
        Ok(true)
    }

    async fn oracle_resolve(&self, handle: String, party: String) -> Result<u64, ErrorObjectOwned> {
        let handle = parse_handle(&handle)?;
        self.oracle
            .resolve(&handle, &parse_address(&party)?)
            .map_err(Self::oracle_error)
    }
}

fn load_genesis(cli: &Cli) -> Result<ModuleGenesisConfig> {
    let mut genesis = match &cli.genesis {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read genesis file {:?}", path))?;
            ModuleGenesisConfig::from_json(&data)?
        }
        None => ModuleGenesisConfig::default(),
    };

    if let Some(admin) = &cli.admin {
        let admin = parse_address(admin).map_err(|e| anyhow!("--admin: {}", e.message()))?;
        genesis.configurer = admin;
        genesis.settlement_authority = admin;
    }

    genesis.validate()?;
    Ok(genesis)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_chain=info".parse()?)
                .add_directive("auction_module=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let genesis = load_genesis(&cli)?;

    let denied = cli
        .denied
        .iter()
        .map(|s| parse_address(s).map_err(|e| anyhow!("--deny: {}", e.message())))
        .collect::<Result<Vec<_>>>()?;
    let module = ModuleState::new(&genesis, Arc::new(Denylist::new(denied)));

    info!(
        configurer = %hex::encode(genesis.configurer),
        quorum_pct = genesis.coordinator.quorum_threshold_percentage,
        min_stake = genesis.registry.min_operator_stake,
        "Starting mock chain server on {}",
        cli.bind
    );

    let server = Server::builder().build(cli.bind).await?;
    let handle = server.start(MockChainServer::new(module, genesis.initial_timestamp).into_rpc());

    info!("Mock chain server running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
