//! Opaque id minting.
//!
//! Entities get short content-hash ids: SHA-256 over a seed string plus a
//! timestamp and nonce, base36-encoded and truncated. Collisions are resolved
//! by bumping the nonce and rehashing; the generator tracks every id it has
//! seen (including ids loaded from a snapshot) so reloads stay collision-free.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated ids in base36 characters.
const ID_LEN: usize = 12;

/// Nonce retries before giving up.
const MAX_NONCE: u32 = 100;

/// Errors that can occur while minting ids.
#[derive(Debug, Error)]
pub enum IdError {
    /// Every nonce produced a collision.
    #[error("unable to mint a unique id after {attempts} attempts")]
    CollisionExhausted {
        /// Number of nonces tried.
        attempts: u32,
    },
}

/// Mints unique opaque ids and remembers every id it has issued or observed.
#[derive(Debug, Default)]
pub struct IdMinter {
    existing: HashSet<String>,
}

impl IdMinter {
    /// A minter with no known ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id loaded from elsewhere so future mints avoid it.
    pub fn register(&mut self, id: impl Into<String>) {
        self.existing.insert(id.into());
    }

    /// Mint a fresh id seeded from `seed`.
    ///
    /// The seed only influences the hash; uniqueness comes from the
    /// collision check against everything registered so far.
    pub fn mint(&mut self, seed: &str) -> Result<String, IdError> {
        let stamp = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros());

        for nonce in 0..MAX_NONCE {
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(stamp.to_le_bytes());
            hasher.update(nonce.to_le_bytes());
            let digest = hasher.finalize();

            let id = base36_encode(&digest, ID_LEN);
            if self.existing.insert(id.clone()) {
                if nonce > 0 {
                    debug!(nonce, "id collision resolved by nonce retry");
                }
                return Ok(id);
            }
        }

        Err(IdError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }
}

/// Encode the leading bytes of a digest as base36, producing `len` chars.
fn base36_encode(digest: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for chunk in digest.iter().take(len) {
        out.push(BASE36_CHARS[(*chunk as usize) % BASE36_CHARS.len()] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_ids_of_fixed_length() {
        let mut minter = IdMinter::new();
        let id = minter.mint("seed").unwrap();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn same_seed_mints_distinct_ids() {
        let mut minter = IdMinter::new();
        let a = minter.mint("seed").unwrap();
        let b = minter.mint("seed").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn many_mints_stay_unique() {
        let mut minter = IdMinter::new();
        let mut seen = HashSet::new();
        for i in 0..1000 {
            let id = minter.mint(&format!("seed-{i}")).unwrap();
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn registered_ids_are_avoided() {
        let mut minter = IdMinter::new();
        let id = minter.mint("seed").unwrap();

        let mut fresh = IdMinter::new();
        fresh.register(id.clone());
        let next = fresh.mint("seed").unwrap();
        assert_ne!(id, next);
    }
}
