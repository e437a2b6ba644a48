//! Operator pipeline for quorum-settled auctions.
//!
//! Each operator independently resolves the sealed bids of an ended auction,
//! ranks them, and votes for the resulting winner set on the settlement task.
//! Operators never talk to each other; agreement happens only through the
//! votes recorded by the task coordinator.

pub mod chain;
pub mod config;
pub mod error;
pub mod ranking;
pub mod resolver;
pub mod service;

pub use chain::{ChainClient, LocalChain, RpcChainClient};
pub use config::OperatorConfig;
pub use error::{OperatorError, Result};
pub use ranking::{allocate, compute_winner_set, rank_bids, ResolvedBid};
pub use resolver::{BidResolver, LocalResolver, RpcResolver};
pub use service::{OperatorService, Submission};
