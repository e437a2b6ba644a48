//! Reputation gate consulted before accepting a bid.

use std::collections::HashSet;
use std::fmt::Debug;

use auction_types::Address;

/// Answers whether an address may bid. Injected into the module state at
/// construction.
pub trait ReputationGate: Debug + Send + Sync {
    fn can_participate(&self, address: &Address) -> bool;
}

/// Gate that admits every address.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ReputationGate for AllowAll {
    fn can_participate(&self, _address: &Address) -> bool {
        true
    }
}

/// Gate that rejects a fixed set of flagged addresses.
#[derive(Debug, Default, Clone)]
pub struct Denylist {
    flagged: HashSet<Address>,
}

impl Denylist {
    pub fn new(flagged: impl IntoIterator<Item = Address>) -> Self {
        Self {
            flagged: flagged.into_iter().collect(),
        }
    }
}

impl ReputationGate for Denylist {
    fn can_participate(&self, address: &Address) -> bool {
        !self.flagged.contains(address)
    }
}
