//! Hashed credential store.
//!
//! Raw API keys are hashed with SHA-256 as soon as they are loaded and the
//! plaintext is dropped. Lookups hash the presented token once and compare it
//! against **every** stored digest in constant time, so neither the comparison
//! itself nor the position of a match inside the store is observable through
//! response timing.

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Length in bytes of a stored credential digest.
pub const DIGEST_LEN: usize = 32;

/// One-way digest of a credential.
pub type CredentialDigest = [u8; DIGEST_LEN];

/// Immutable set of credential digests, built once at startup.
#[derive(Clone, Default)]
pub struct KeyStore {
    digests: Vec<CredentialDigest>,
}

impl KeyStore {
    /// Build a store from raw secrets.
    ///
    /// Secrets are trimmed; empty entries are skipped. Duplicate secrets
    /// collapse into a single digest.
    pub fn from_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut digests: Vec<CredentialDigest> = Vec::new();
        for secret in secrets {
            let secret = secret.as_ref().trim();
            if secret.is_empty() {
                continue;
            }
            let digest = hash_credential(secret);
            if !digests.contains(&digest) {
                digests.push(digest);
            }
        }
        Self { digests }
    }

    /// Number of distinct credentials held.
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Check whether `token` is one of the stored credentials.
    ///
    /// Runs the comparison against every digest regardless of where (or
    /// whether) a match occurs.
    pub fn contains(&self, token: &str) -> bool {
        let presented = hash_credential(token);
        let matched = self
            .digests
            .iter()
            .fold(Choice::from(0u8), |acc, stored| {
                acc | stored.as_slice().ct_eq(presented.as_slice())
            });
        matched.into()
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("credentials", &self.digests.len())
            .finish()
    }
}

/// SHA-256 digest of a credential.
pub fn hash_credential(secret: &str) -> CredentialDigest {
    Sha256::digest(secret.as_bytes()).into()
}

/// Lowercase hex prefix of the SHA-256 of `value`, used where a short,
/// non-reversible fingerprint is needed (e.g. client identities).
pub fn short_fingerprint(value: &str, hex_chars: usize) -> String {
    let mut encoded = hex::encode(Sha256::digest(value.as_bytes()));
    encoded.truncate(hex_chars);
    encoded
}
