//! Single-share sealed-value oracle.
//!
//! # Sealing
//!
//! To seal a value `v` for `owner`:
//! 1. Sample a random nonce and derive the handle H(owner || nonce || counter)
//! 2. Derive the symmetric key HKDF(share, salt = handle)
//! 3. Encrypt `v` (little-endian) with AES-256-GCM
//! 4. Record the ciphertext and an access list containing only `owner`
//!
//! # Resolution
//!
//! `resolve(handle, party)` checks the access list, re-derives the key and
//! decrypts. Authentication failures surface as `DecryptionFailed`.

use std::collections::{HashMap, HashSet};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use parking_lot::RwLock;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::debug;

use auction_types::{short_hex, Address, EncryptedHandle};

use crate::error::OracleError;

/// Resolution side of the oracle, as consumed by settlement operators.
pub trait ValueOracle: Send + Sync {
    /// Reveal the value behind `handle` to `party`.
    fn resolve(&self, handle: &EncryptedHandle, party: &Address) -> Result<u64, OracleError>;
}

/// Ciphertext and access list for one sealed value.
#[derive(Debug, Clone)]
struct SealedValue {
    owner: Address,
    ciphertext: Vec<u8>,
    tag: [u8; 16],
    nonce: [u8; 12],
    allowed: HashSet<Address>,
}

/// In-memory oracle holding every sealed value.
#[derive(Debug)]
pub struct SealedValueOracle {
    share: [u8; 32],
    values: RwLock<HashMap<EncryptedHandle, SealedValue>>,
    counter: RwLock<u64>,
}

impl SealedValueOracle {
    /// Create an oracle from its key share.
    pub fn new(share: [u8; 32]) -> Self {
        Self {
            share,
            values: RwLock::new(HashMap::new()),
            counter: RwLock::new(0),
        }
    }

    /// Create an oracle with a freshly sampled key share.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut share = [0u8; 32];
        rng.fill_bytes(&mut share);
        Self::new(share)
    }

    /// Seal `value` so that only `owner` may resolve it until access is granted.
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        value: u64,
        owner: Address,
        rng: &mut R,
    ) -> Result<EncryptedHandle, OracleError> {
        let mut nonce_bytes = [0u8; 12];
        rng.fill_bytes(&mut nonce_bytes);

        let handle = {
            let mut counter = self.counter.write();
            *counter += 1;
            derive_handle(&owner, &nonce_bytes, *counter)
        };

        let key = self.derive_key(&handle)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| {
            OracleError::EncryptionFailed(format!("Failed to create cipher: {}", e))
        })?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext_with_tag = cipher
            .encrypt(nonce, value.to_le_bytes().as_ref())
            .map_err(|e| {
                OracleError::EncryptionFailed(format!("AES-GCM encryption failed: {}", e))
            })?;

        let tag_start = ciphertext_with_tag.len() - 16;
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&ciphertext_with_tag[tag_start..]);

        let mut allowed = HashSet::new();
        allowed.insert(owner);

        self.values.write().insert(
            handle,
            SealedValue {
                owner,
                ciphertext: ciphertext_with_tag[..tag_start].to_vec(),
                tag,
                nonce: nonce_bytes,
                allowed,
            },
        );

        debug!(handle = handle.to_hex(), owner = short_hex(&owner), "Sealed value");
        Ok(handle)
    }

    /// Authorize `party` to resolve `handle`. Only the owner may grant access.
    pub fn allow(
        &self,
        handle: &EncryptedHandle,
        caller: &Address,
        party: Address,
    ) -> Result<(), OracleError> {
        let mut values = self.values.write();
        let sealed = values
            .get_mut(handle)
            .ok_or_else(|| OracleError::UnknownHandle(handle.to_hex()))?;

        if sealed.owner != *caller {
            return Err(OracleError::Unauthorized);
        }

        sealed.allowed.insert(party);
        Ok(())
    }

    /// Check whether `party` may resolve `handle`.
    pub fn is_allowed(&self, handle: &EncryptedHandle, party: &Address) -> bool {
        self.values
            .read()
            .get(handle)
            .map(|sealed| sealed.allowed.contains(party))
            .unwrap_or(false)
    }

    fn derive_key(&self, handle: &EncryptedHandle) -> Result<[u8; 32], OracleError> {
        let hk = Hkdf::<Sha256>::new(Some(&handle.0), &self.share);
        let mut key = [0u8; 32];
        hk.expand(b"SEALED-VALUE-KEY", &mut key)
            .map_err(|_| OracleError::KeyDerivationFailed)?;
        Ok(key)
    }
}

impl ValueOracle for SealedValueOracle {
    fn resolve(&self, handle: &EncryptedHandle, party: &Address) -> Result<u64, OracleError> {
        let sealed = self
            .values
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| OracleError::UnknownHandle(handle.to_hex()))?;

        if !sealed.allowed.contains(party) {
            return Err(OracleError::Unauthorized);
        }

        let key = self.derive_key(handle)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| OracleError::DecryptionFailed(format!("Failed to create cipher: {}", e)))?;

        let mut ct_with_tag = sealed.ciphertext.clone();
        ct_with_tag.extend_from_slice(&sealed.tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), ct_with_tag.as_ref())
            .map_err(|_| OracleError::DecryptionFailed("authentication failed".into()))?;

        let bytes: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| OracleError::InvalidPlaintext(plaintext.len()))?;

        Ok(u64::from_le_bytes(bytes))
    }
}

fn derive_handle(owner: &Address, nonce: &[u8; 12], counter: u64) -> EncryptedHandle {
    let mut hasher = Sha256::new();
    hasher.update(b"SEALED_HANDLE_V1:");
    hasher.update(owner);
    hasher.update(nonce);
    hasher.update(counter.to_le_bytes());
    EncryptedHandle(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn oracle() -> (SealedValueOracle, StdRng) {
        let mut rng = StdRng::seed_from_u64(7);
        (SealedValueOracle::random(&mut rng), rng)
    }

    #[test]
    fn test_owner_can_resolve() {
        let (oracle, mut rng) = oracle();
        let owner = [1u8; 32];

        let handle = oracle.seal(12345, owner, &mut rng).unwrap();
        assert_eq!(oracle.resolve(&handle, &owner).unwrap(), 12345);
    }

    #[test]
    fn test_unauthorized_party_rejected() {
        let (oracle, mut rng) = oracle();
        let owner = [1u8; 32];
        let operator = [9u8; 32];

        let handle = oracle.seal(500, owner, &mut rng).unwrap();
        assert_eq!(
            oracle.resolve(&handle, &operator),
            Err(OracleError::Unauthorized)
        );

        oracle.allow(&handle, &owner, operator).unwrap();
        assert_eq!(oracle.resolve(&handle, &operator).unwrap(), 500);
    }

    #[test]
    fn test_only_owner_can_grant() {
        let (oracle, mut rng) = oracle();
        let owner = [1u8; 32];
        let stranger = [2u8; 32];

        let handle = oracle.seal(500, owner, &mut rng).unwrap();
        assert_eq!(
            oracle.allow(&handle, &stranger, stranger),
            Err(OracleError::Unauthorized)
        );
        assert!(!oracle.is_allowed(&handle, &stranger));
    }

    #[test]
    fn test_unknown_handle() {
        let (oracle, _) = oracle();
        let result = oracle.resolve(&EncryptedHandle([0u8; 32]), &[1u8; 32]);
        assert!(matches!(result, Err(OracleError::UnknownHandle(_))));
    }

    #[test]
    fn test_handles_are_unique() {
        let (oracle, mut rng) = oracle();
        let owner = [1u8; 32];

        let h1 = oracle.seal(100, owner, &mut rng).unwrap();
        let h2 = oracle.seal(100, owner, &mut rng).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_different_share_cannot_decrypt() {
        let (oracle, mut rng) = oracle();
        let owner = [1u8; 32];
        let handle = oracle.seal(42, owner, &mut rng).unwrap();

        // Same ciphertext, different share.
        let other = SealedValueOracle::new([3u8; 32]);
        let sealed = oracle.values.read().get(&handle).cloned().unwrap();
        other.values.write().insert(handle, sealed);

        assert!(matches!(
            other.resolve(&handle, &owner),
            Err(OracleError::DecryptionFailed(_))
        ));
    }
}
