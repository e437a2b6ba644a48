//! Operator configuration.

use std::time::Duration;

use auction_types::Address;

/// Configuration for one operator pipeline.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Address the operator registered with
    pub address: Address,
    /// RPC endpoint of the chain
    pub rpc_endpoint: String,
    /// Delay between event polls
    pub poll_interval: Duration,
    /// Extra attempts per bid when resolution fails
    pub resolve_retries: u32,
    /// Delay between resolution attempts
    pub retry_backoff: Duration,
    /// How long to wait for a task to complete after responding
    pub completion_timeout: Duration,
    /// Maximum events fetched per poll
    pub event_batch: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            address: [0u8; 32],
            rpc_endpoint: "http://127.0.0.1:9944".to_string(),
            poll_interval: Duration::from_secs(2),
            resolve_retries: 2,
            retry_backoff: Duration::from_millis(200),
            completion_timeout: Duration::from_secs(60),
            event_batch: 100,
        }
    }
}

impl OperatorConfig {
    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }
}

/// Parse a hex address, with or without `0x`. Must be exactly 32 bytes.
pub fn parse_address(s: &str) -> Result<Address, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| format!("Invalid hex: {}", e))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("Address must be 32 bytes, got {}", b.len()))
}
