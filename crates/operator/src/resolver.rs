//! Bid resolution through the encryption oracle.

use std::sync::Arc;

use auction_crypto::ValueOracle;
use auction_types::{Address, EncryptedHandle};
use jsonrpsee::core::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClient;
use jsonrpsee::rpc_params;

use crate::error::Result;

/// Reveals sealed bid amounts to an authorized operator.
#[async_trait]
pub trait BidResolver: Send + Sync {
    async fn resolve(&self, handle: &EncryptedHandle, party: &Address) -> Result<u64>;
}

/// Resolver backed by an in-process oracle.
#[derive(Debug)]
pub struct LocalResolver<O> {
    oracle: Arc<O>,
}

impl<O> LocalResolver<O> {
    pub fn new(oracle: Arc<O>) -> Self {
        Self { oracle }
    }
}

impl<O> Clone for LocalResolver<O> {
    fn clone(&self) -> Self {
        Self {
            oracle: Arc::clone(&self.oracle),
        }
    }
}

#[async_trait]
impl<O: ValueOracle + 'static> BidResolver for LocalResolver<O> {
    async fn resolve(&self, handle: &EncryptedHandle, party: &Address) -> Result<u64> {
        Ok(self.oracle.resolve(handle, party)?)
    }
}

/// Resolver calling `oracle_resolve` on a mock-chain node.
#[derive(Debug, Clone)]
pub struct RpcResolver {
    client: HttpClient,
}

impl RpcResolver {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BidResolver for RpcResolver {
    async fn resolve(&self, handle: &EncryptedHandle, party: &Address) -> Result<u64> {
        Ok(self
            .client
            .request("oracle_resolve", rpc_params![handle.to_hex(), hex::encode(party)])
            .await?)
    }
}
