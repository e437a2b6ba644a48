//! Auction module with quorum-settled, sealed-bid auctions.
//!
//! This module implements the shared state store for:
//!
//! - Auction creation, sealed bid submission and settlement per pool
//! - Operator registration, stake and slashing
//! - Settlement tasks voted on by operators until a quorum agrees
//! - Challenges against operator responses
//!
//! # Architecture
//!
//! - `call`: Message types for state-changing operations
//! - `handlers`: Call context and dispatch
//! - `ledger`, `registry`, `coordinator`: Business logic per component
//! - `queries`: Read-only state access
//! - `state`: State structures
//! - `genesis`: Initial configuration
//! - `events`: Event log polled by operators
//! - `gate`: Bidder eligibility check
//! - `error`: Error types
//!
//! # Example
//!
//! ```ignore
//! use auction_module::{handlers, ModuleCall, ModuleState, ModuleGenesisConfig};
//!
//! let mut state = ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(admin));
//! let ctx = handlers::CallContext { ... };
//!
//! // Create an auction
//! handlers::dispatch(&mut state, &ctx, ModuleCall::CreateAuction { ... })?;
//! ```

pub mod call;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod gate;
pub mod genesis;
pub mod handlers;
pub mod ledger;
pub mod queries;
pub mod registry;
pub mod state;

pub use call::ModuleCall;
pub use coordinator::RespondOutcome;
pub use error::{ErrorKind, ModuleError};
pub use events::{EventRecord, ModuleEvent};
pub use gate::{AllowAll, Denylist, ReputationGate};
pub use genesis::{CoordinatorParams, GenesisValidationError, ModuleGenesisConfig, RegistryParams};
pub use handlers::{dispatch, CallContext, CallOutcome, HandlerResult};
pub use queries::{ModuleQuery, ModuleQueryResponse};
pub use state::ModuleState;
