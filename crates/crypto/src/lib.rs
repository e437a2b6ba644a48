//! Sealed-value oracle for hiding bid amounts.
//!
//! Bid amounts never appear in ledger state. A bidder seals the amount with
//! the oracle and submits only the returned handle; at settlement time each
//! operator asks the oracle to resolve the handle, which succeeds only for
//! parties the owner has authorized.
//!
//! The oracle here simulates threshold decryption with a single key share:
//! every sealed value is encrypted with AES-256-GCM under a per-handle key
//! derived from that share with HKDF-SHA256.

pub mod error;
pub mod oracle;

pub use error::OracleError;
pub use oracle::{SealedValueOracle, ValueOracle};
