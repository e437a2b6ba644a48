//! Genesis configuration for the auction module.
//!
//! This module defines the roles and protocol parameters the module state is
//! initialized with.

use auction_types::{Address, DEFAULT_QUORUM_THRESHOLD_PERCENTAGE};
use serde::{Deserialize, Serialize};

/// Genesis configuration for the auction module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleGenesisConfig {
    /// Address allowed to create auctions and tasks, and to slash directly
    pub configurer: Address,

    /// Address allowed to call settle with an externally agreed result
    pub settlement_authority: Address,

    /// Registry parameters
    pub registry: RegistryParams,

    /// Coordinator parameters
    pub coordinator: CoordinatorParams,

    /// Clock value the chain starts at
    pub initial_timestamp: u64,
}

/// Operator registry parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryParams {
    /// Minimum stake required to register
    pub min_operator_stake: u64,
}

/// Task coordinator parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorParams {
    /// Share of active operators that must agree on one commitment
    pub quorum_threshold_percentage: u8,
    /// Seconds after task creation during which responses may be challenged
    pub challenge_window_secs: u64,
    /// Stake removed from an operator by a successful challenge
    pub challenge_slash_amount: u64,
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            min_operator_stake: 1_000,
        }
    }
}

impl Default for CoordinatorParams {
    fn default() -> Self {
        Self {
            quorum_threshold_percentage: DEFAULT_QUORUM_THRESHOLD_PERCENTAGE,
            challenge_window_secs: 86_400, // 1 day
            challenge_slash_amount: 100,
        }
    }
}

impl Default for ModuleGenesisConfig {
    fn default() -> Self {
        Self {
            configurer: [0u8; 32],
            settlement_authority: [0u8; 32],
            registry: RegistryParams::default(),
            coordinator: CoordinatorParams::default(),
            initial_timestamp: 0,
        }
    }
}

impl ModuleGenesisConfig {
    /// Create a config where one address holds both privileged roles.
    pub fn with_admin(admin: Address) -> Self {
        Self {
            configurer: admin,
            settlement_authority: admin,
            ..Default::default()
        }
    }

    /// Load a config from a JSON document.
    pub fn from_json(data: &str) -> Result<Self, GenesisValidationError> {
        let config: Self = serde_json::from_str(data)
            .map_err(|e| GenesisValidationError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the genesis configuration.
    pub fn validate(&self) -> Result<(), GenesisValidationError> {
        let pct = self.coordinator.quorum_threshold_percentage;
        if pct == 0 || pct > 100 {
            return Err(GenesisValidationError::InvalidQuorumThreshold(pct));
        }

        if self.registry.min_operator_stake == 0 {
            return Err(GenesisValidationError::InvalidRegistryParams(
                "Minimum stake cannot be zero".into(),
            ));
        }

        if self.coordinator.challenge_window_secs == 0 {
            return Err(GenesisValidationError::InvalidCoordinatorParams(
                "Challenge window cannot be zero".into(),
            ));
        }

        if self.coordinator.challenge_slash_amount == 0 {
            return Err(GenesisValidationError::InvalidCoordinatorParams(
                "Challenge slash amount cannot be zero".into(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during genesis validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenesisValidationError {
    #[error("Invalid quorum threshold percentage: {0}")]
    InvalidQuorumThreshold(u8),

    #[error("Invalid registry parameters: {0}")]
    InvalidRegistryParams(String),

    #[error("Invalid coordinator parameters: {0}")]
    InvalidCoordinatorParams(String),

    #[error("Malformed genesis document: {0}")]
    Malformed(String),
}
