//! RPC-compatible types for the mock chain.
//!
//! Addresses, pool ids and commitments travel as hex strings; ledger records
//! are returned in their serde form.

use auction_types::{Address, EncryptedHandle, WinnerEntry};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

/// JSON-RPC "invalid params" code.
pub const INVALID_PARAMS_CODE: i32 = -32602;

/// Code used for oracle failures.
pub const ORACLE_ERROR_CODE: i32 = -32010;

/// Block info response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub timestamp: u64,
}

/// Parameters for creating an auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuctionParams {
    pub sender: String,
    pub pool_id: String,
    pub end_time: u64,
    pub priority_window_duration: u64,
    pub min_bid_amount: u64,
    pub max_winners: u32,
}

/// Parameters for submitting a bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBidParams {
    pub sender: String,
    pub pool_id: String,
    /// Handle returned by `oracle_seal`
    pub encrypted_amount: EncryptedHandle,
}

/// Parameters for settling with an agreed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleParams {
    pub sender: String,
    pub pool_id: String,
    pub winners: Vec<WinnerEntry>,
}

/// Parameters for slashing an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashParams {
    pub sender: String,
    pub operator: String,
    pub amount: u64,
    pub reason: String,
}

/// Parameters for an operator response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondParams {
    pub sender: String,
    pub task_id: u64,
    pub winners: Vec<WinnerEntry>,
    /// Hex-encoded commitment (32 bytes)
    pub commitment: String,
}

/// Parameters for a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeParams {
    pub sender: String,
    pub task_id: u64,
    pub operator: String,
    /// Hex-encoded opaque proof
    pub proof: String,
}

fn invalid_params(msg: String) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INVALID_PARAMS_CODE, msg, None::<()>)
}

/// Parse a 32-byte hex value, with or without `0x`.
pub fn parse_bytes32(field: &str, s: &str) -> Result<[u8; 32], ErrorObjectOwned> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| invalid_params(format!("Invalid {} hex: {}", field, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        invalid_params(format!("{} must be 32 bytes, got {}", field, b.len()))
    })
}

pub fn parse_address(s: &str) -> Result<Address, ErrorObjectOwned> {
    parse_bytes32("address", s)
}

pub fn parse_handle(s: &str) -> Result<EncryptedHandle, ErrorObjectOwned> {
    parse_bytes32("handle", s).map(EncryptedHandle)
}

pub fn parse_proof(s: &str) -> Result<Vec<u8>, ErrorObjectOwned> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| invalid_params(format!("Invalid proof hex: {}", e)))
}
