//! SCRAM verifier synthesis as defined by RFC 5802.

use std::{fmt, str::FromStr};

use digest::{core_api::BlockSizeUser, generic_array::GenericArray, Digest, FixedOutputReset};
use rand::{rngs::OsRng, RngCore};
use rsasl::mechanisms::scram::tools::{derive_keys, hash_password};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use thiserror::Error;
use zeroize::Zeroizing;

/// Smallest iteration count accepted for verifier synthesis.
///
/// RFC 5802 mandates at least 4096 rounds for the SCRAM family; Kafka brokers
/// reject anything lower as well.
pub const MIN_ITERATIONS: u32 = 4096;

/// Number of random salt bytes generated per synthesis.
pub const SALT_LEN: usize = 32;

/// Error type used in verifier synthesis.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScramError {
    /// Iteration count below the RFC 5802 floor.
    #[error("Iteration count {got} is below the SCRAM minimum of {min}")]
    IterationsTooLow {
        /// Requested iteration count.
        got: u32,
        /// Smallest acceptable iteration count.
        min: u32,
    },
    /// Mechanism name not recognized.
    #[error("Unknown SCRAM mechanism: {0}")]
    UnknownMechanism(String),
}

/// SCRAM mechanism variant to synthesize a verifier for.
///
/// Kafka accepts only the SHA-2 family for SCRAM credentials, so the enum is
/// closed over these two.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ScramMechanism {
    /// SCRAM over SHA-256 hashes.
    #[serde(rename = "SCRAM-SHA-256", alias = "SCRAM-SHA256")]
    Sha256,
    /// SCRAM over SHA-512 hashes.
    #[serde(rename = "SCRAM-SHA-512", alias = "SCRAM-SHA512")]
    Sha512,
}

impl ScramMechanism {
    /// All mechanisms, in provisioning order.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::Sha256, Self::Sha512]
    }

    /// Mechanism code used by the Kafka admin protocol.
    #[must_use]
    pub const fn wire_code(self) -> i8 {
        match self {
            Self::Sha256 => 1,
            Self::Sha512 => 2,
        }
    }

    /// Output size of the underlying digest, in bytes.
    ///
    /// StoredKey and ServerKey both have exactly this length.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }
}

impl AsRef<str> for ScramMechanism {
    fn as_ref(&self) -> &str {
        match self {
            Self::Sha256 => "SCRAM-SHA-256",
            Self::Sha512 => "SCRAM-SHA-512",
        }
    }
}

impl fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FromStr for ScramMechanism {
    type Err = ScramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SCRAM-SHA-256" | "SCRAM-SHA256" => Ok(Self::Sha256),
            "SCRAM-SHA-512" | "SCRAM-SHA512" => Ok(Self::Sha512),
            other => Err(ScramError::UnknownMechanism(other.to_string())),
        }
    }
}

/// A synthesized SCRAM verifier for one `(password, mechanism)` pair.
///
/// The password is consumed as raw UTF-8 without SASLprep normalization,
/// matching what stock Kafka tooling does. Interoperability of non-ASCII
/// passwords across differently-normalizing clients is therefore not
/// guaranteed.
#[derive(Clone)]
#[non_exhaustive]
pub struct ScramCredential {
    /// Mechanism this verifier was derived for.
    pub mechanism: ScramMechanism,
    /// PBKDF2 iteration count used.
    pub iterations: u32,
    /// Salt mixed into key derivation, fresh per synthesis.
    pub salt: Vec<u8>,
    /// `Hi(password, salt, iterations)`; what the admin protocol transmits.
    pub salted_password: Zeroizing<Vec<u8>>,
    /// `H(ClientKey)`, stored by the broker to verify client proofs.
    pub stored_key: Vec<u8>,
    /// `HMAC(SaltedPassword, "Server Key")`, proves broker identity to clients.
    pub server_key: Vec<u8>,
}

impl fmt::Debug for ScramCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramCredential")
            .field("mechanism", &self.mechanism)
            .field("iterations", &self.iterations)
            .field("salt", &self.salt)
            .field("salted_password", &deboog::masking::HIDE_STR)
            .field("stored_key", &deboog::masking::HIDE_STR)
            .field("server_key", &deboog::masking::HIDE_STR)
            .finish()
    }
}

impl ScramCredential {
    /// Synthesize a verifier with a freshly generated random salt.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `iterations` is below [`MIN_ITERATIONS`].
    pub fn generate(
        cleartext: &str,
        mechanism: ScramMechanism,
        iterations: u32,
    ) -> Result<Self, ScramError> {
        let mut salt = vec![0_u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(cleartext, mechanism, iterations, salt)
    }

    /// Synthesize a verifier from a caller-provided salt.
    ///
    /// Deterministic: identical inputs produce byte-identical keys.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `iterations` is below [`MIN_ITERATIONS`].
    pub fn with_salt(
        cleartext: &str,
        mechanism: ScramMechanism,
        iterations: u32,
        salt: Vec<u8>,
    ) -> Result<Self, ScramError> {
        if iterations < MIN_ITERATIONS {
            return Err(ScramError::IterationsTooLow {
                got: iterations,
                min: MIN_ITERATIONS,
            });
        }
        let (salted_password, stored_key, server_key) = match mechanism {
            ScramMechanism::Sha256 => derive::<Sha256>(cleartext.as_bytes(), iterations, &salt),
            ScramMechanism::Sha512 => derive::<Sha512>(cleartext.as_bytes(), iterations, &salt),
        };
        Ok(Self {
            mechanism,
            iterations,
            salt,
            salted_password,
            stored_key,
            server_key,
        })
    }
}

/// RFC 5802 key derivation over a concrete digest.
fn derive<D>(cleartext: &[u8], iterations: u32, salt: &[u8]) -> (Zeroizing<Vec<u8>>, Vec<u8>, Vec<u8>)
where
    D: Digest + BlockSizeUser + FixedOutputReset + Clone + Sync,
{
    let mut salted_password = GenericArray::default();
    hash_password::<D>(cleartext, iterations, salt, &mut salted_password);
    let (client_key, server_key) = derive_keys::<D>(salted_password.as_slice());
    let stored_key = D::digest(client_key);
    (
        Zeroizing::new(salted_password.to_vec()),
        stored_key.to_vec(),
        server_key.to_vec(),
    )
}
