//! Admin-session and sync-policy configuration sourced from the environment.

use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use deboog::Deboog;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    context,
    scram::{ScramError, ScramMechanism, MIN_ITERATIONS},
};

/// Comma-separated `host:port` list of brokers to bootstrap from.
pub const ENV_BOOTSTRAP_SERVERS: &str = "KAFKA_BOOTSTRAP_SERVERS";
/// Security protocol used towards the cluster.
pub const ENV_SECURITY_PROTOCOL: &str = "KAFKA_SECURITY_PROTOCOL";
/// SASL mechanism for the admin session's own authentication.
pub const ENV_SASL_MECHANISM: &str = "KAFKA_SASL_MECHANISM";
/// JAAS-style login string carrying the admin session's credentials.
pub const ENV_SASL_JAAS_CONFIG: &str = "KAFKA_SASL_JAAS_CONFIG";
/// Trust-store path (PEM bundle or PKCS#12).
pub const ENV_SSL_TRUSTSTORE_LOCATION: &str = "KAFKA_SSL_TRUSTSTORE_LOCATION";
/// Trust-store passphrase, honoured for PKCS#12 stores.
pub const ENV_SSL_TRUSTSTORE_PASSWORD: &str = "KAFKA_SSL_TRUSTSTORE_PASSWORD";
/// Key-store path holding the client certificate and key (PEM or PKCS#12).
pub const ENV_SSL_KEYSTORE_LOCATION: &str = "KAFKA_SSL_KEYSTORE_LOCATION";
/// Key-store passphrase.
pub const ENV_SSL_KEYSTORE_PASSWORD: &str = "KAFKA_SSL_KEYSTORE_PASSWORD";
/// Private-key passphrase, when distinct from the key-store passphrase.
pub const ENV_SSL_KEY_PASSWORD: &str = "KAFKA_SSL_KEY_PASSWORD";
/// Server-certificate verification switch; `https` enables it.
pub const ENV_SSL_ENDPOINT_IDENTIFICATION: &str = "KAFKA_SSL_ENDPOINT_IDENTIFICATION_ALGORITHM";
/// Per-request timeout, in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "KAFKA_REQUEST_TIMEOUT_MS";
/// End-to-end admin-call timeout, in milliseconds.
pub const ENV_DEFAULT_API_TIMEOUT_MS: &str = "KAFKA_DEFAULT_API_TIMEOUT_MS";
/// Subset of SCRAM mechanisms to provision per user.
pub const ENV_SCRAM_MECHANISMS: &str = "SYNC_SCRAM_MECHANISMS";
/// Iteration count for synthesized verifiers.
pub const ENV_SCRAM_ITERATIONS: &str = "SYNC_SCRAM_ITERATIONS";
/// Whether jobs may proceed with a user id standing in for the username.
pub const ENV_ALLOW_DEGRADED_IDENTITY: &str = "SYNC_ALLOW_DEGRADED_IDENTITY";
/// Staleness bound for the correlation slot, in milliseconds.
pub const ENV_CORRELATION_MAX_AGE_MS: &str = "SYNC_CORRELATION_MAX_AGE_MS";

/// Error type used in configuration parsing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Security protocol value not recognized.
    #[error("Invalid security protocol: {0} (expected PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL)")]
    InvalidProtocol(String),
    /// SASL mechanism missing or outside the supported set.
    #[error("Unsupported SASL mechanism: {0} (supported: PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)")]
    UnsupportedSaslMechanism(String),
    /// A SASL protocol was selected without a mechanism.
    #[error("{ENV_SASL_MECHANISM} must be set when the security protocol uses SASL")]
    MissingSaslMechanism,
    /// No username/password pair could be extracted from the JAAS string.
    #[error("{ENV_SASL_JAAS_CONFIG} is missing or carries no username/password pair")]
    MissingSaslCredentials,
    /// A numeric variable failed to parse.
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// A boolean variable failed to parse.
    #[error("Invalid value for {name}: {value} (expected true or false)")]
    InvalidBool {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// Endpoint identification only knows `https` or the empty string.
    #[error("Invalid value for {ENV_SSL_ENDPOINT_IDENTIFICATION}: {0} (expected https or empty)")]
    InvalidEndpointIdentification(String),
    /// The configured mechanism set is empty.
    #[error("{ENV_SCRAM_MECHANISMS} must name at least one mechanism")]
    EmptyMechanismSet,
    /// SCRAM parameter out of range.
    #[error(transparent)]
    Scram(#[from] ScramError),
}

/// Kafka security protocol towards the cluster.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    /// Without authentication, without encryption.
    #[default]
    Plaintext,
    /// Without authentication, with encryption.
    Ssl,
    /// With authentication, without encryption.
    SaslPlaintext,
    /// With authentication, with encryption.
    SaslSsl,
}

impl SecurityProtocol {
    /// Whether the transport is wrapped in TLS.
    #[must_use]
    pub const fn uses_tls(self) -> bool {
        matches!(self, Self::Ssl | Self::SaslSsl)
    }

    /// Whether the connection authenticates via SASL.
    #[must_use]
    pub const fn uses_sasl(self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

impl AsRef<str> for SecurityProtocol {
    fn as_ref(&self) -> &str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            other => Err(ConfigError::InvalidProtocol(other.to_string())),
        }
    }
}

/// SASL mechanism used by the admin session itself.
///
/// GSSAPI and OAUTHBEARER are not carried; configuring them fails fast with
/// [`ConfigError::UnsupportedSaslMechanism`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[non_exhaustive]
pub enum SaslMechanism {
    /// Plain username and password.
    #[serde(rename = "PLAIN")]
    Plain,
    /// SCRAM over SHA-256 hashes.
    #[serde(rename = "SCRAM-SHA-256", alias = "SCRAM-SHA256")]
    ScramSha256,
    /// SCRAM over SHA-512 hashes.
    #[serde(rename = "SCRAM-SHA-512", alias = "SCRAM-SHA512")]
    ScramSha512,
}

impl AsRef<str> for SaslMechanism {
    fn as_ref(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" | "SCRAM-SHA256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" | "SCRAM-SHA512" => Ok(Self::ScramSha512),
            other => Err(ConfigError::UnsupportedSaslMechanism(other.to_string())),
        }
    }
}

/// A configuration secret: zeroed on drop, masked in Debug output.
#[derive(Clone, Deboog, Default, Deserialize, Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(#[deboog(mask = "hidden")] String);

impl Secret {
    /// Borrow the secret value for use at the transport boundary.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// SASL credentials for the admin session.
#[derive(Clone, Deboog, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SaslConfig {
    /// Mechanism to authenticate with.
    pub mechanism: SaslMechanism,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: Secret,
}

/// TLS material locations and verification policy.
#[derive(Clone, Deboog, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SslConfig {
    /// Trust-store path; PEM bundle or PKCS#12. Platform roots when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truststore_location: Option<PathBuf>,
    /// Trust-store passphrase, applied to PKCS#12 stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truststore_password: Option<Secret>,
    /// Key-store path carrying the client certificate chain and key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_location: Option<PathBuf>,
    /// Key-store passphrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_password: Option<Secret>,
    /// Private-key passphrase; falls back to the key-store passphrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<Secret>,
    /// Verify the server certificate chain and hostname.
    ///
    /// Off by default so self-signed test clusters work out of the box;
    /// operators are expected to turn it on in production.
    #[serde(default)]
    pub endpoint_identification: bool,
}

/// Synchronisation policy knobs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct SyncPolicy {
    /// SCRAM mechanisms provisioned for every synchronized user.
    pub mechanisms: Vec<ScramMechanism>,
    /// Iteration count for synthesized verifiers.
    pub iterations: u32,
    /// Whether a job may proceed when the username fell back to the user id.
    #[serde(default)]
    pub allow_degraded_identity: bool,
    /// Staleness bound for the correlation slot.
    pub correlation_max_age: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            mechanisms: ScramMechanism::all().to_vec(),
            iterations: MIN_ITERATIONS,
            allow_degraded_identity: false,
            correlation_max_age: context::DEFAULT_MAX_AGE,
        }
    }
}

/// Complete configuration for the admin session and sync policy.
#[derive(Clone, Deboog, Deserialize, Serialize)]
#[non_exhaustive]
pub struct KafkaSyncConfig {
    /// Brokers to bootstrap from, each in `host:port` form.
    pub bootstrap_servers: Vec<String>,
    /// Security protocol towards the cluster.
    pub security_protocol: SecurityProtocol,
    /// SASL credentials; required for the SASL protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslConfig>,
    /// TLS material and verification policy.
    #[serde(default)]
    pub ssl: SslConfig,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// End-to-end admin-call timeout.
    pub default_api_timeout: Duration,
    /// Synchronisation policy.
    #[serde(default)]
    pub policy: SyncPolicy,
}

impl KafkaSyncConfig {
    /// Materialise the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a variable fails to parse or a SASL protocol is
    /// selected without usable credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Materialise the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a variable fails to parse or a SASL protocol is
    /// selected without usable credentials.
    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap_servers = get(ENV_BOOTSTRAP_SERVERS)
            .unwrap_or_else(|| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let security_protocol = match get(ENV_SECURITY_PROTOCOL) {
            Some(value) => value.parse()?,
            None => SecurityProtocol::default(),
        };

        let sasl = if security_protocol.uses_sasl() {
            let mechanism: SaslMechanism = get(ENV_SASL_MECHANISM)
                .ok_or(ConfigError::MissingSaslMechanism)?
                .parse()?;
            let jaas = get(ENV_SASL_JAAS_CONFIG).ok_or(ConfigError::MissingSaslCredentials)?;
            let (username, password) =
                parse_jaas_credentials(&jaas).ok_or(ConfigError::MissingSaslCredentials)?;
            Some(SaslConfig {
                mechanism,
                username,
                password: password.into(),
            })
        } else {
            None
        };

        let endpoint_identification = match get(ENV_SSL_ENDPOINT_IDENTIFICATION).as_deref() {
            None | Some("") => false,
            Some("https") | Some("HTTPS") => true,
            Some(other) => {
                return Err(ConfigError::InvalidEndpointIdentification(other.to_string()))
            }
        };
        let ssl = SslConfig {
            truststore_location: get(ENV_SSL_TRUSTSTORE_LOCATION).map(PathBuf::from),
            truststore_password: get(ENV_SSL_TRUSTSTORE_PASSWORD).map(Into::into),
            keystore_location: get(ENV_SSL_KEYSTORE_LOCATION).map(PathBuf::from),
            keystore_password: get(ENV_SSL_KEYSTORE_PASSWORD).map(Into::into),
            key_password: get(ENV_SSL_KEY_PASSWORD).map(Into::into),
            endpoint_identification,
        };

        let request_timeout = duration_ms(&get, ENV_REQUEST_TIMEOUT_MS, 30_000)?;
        let default_api_timeout = duration_ms(&get, ENV_DEFAULT_API_TIMEOUT_MS, 60_000)?;

        let mechanisms = match get(ENV_SCRAM_MECHANISMS) {
            None => ScramMechanism::all().to_vec(),
            Some(value) => {
                let mut set = Vec::new();
                for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let mechanism: ScramMechanism = name.parse()?;
                    if !set.contains(&mechanism) {
                        set.push(mechanism);
                    }
                }
                if set.is_empty() {
                    return Err(ConfigError::EmptyMechanismSet);
                }
                set
            }
        };
        let iterations = match get(ENV_SCRAM_ITERATIONS) {
            None => MIN_ITERATIONS,
            Some(value) => {
                let parsed =
                    value
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            name: ENV_SCRAM_ITERATIONS,
                            value: value.clone(),
                        })?;
                if parsed < MIN_ITERATIONS {
                    return Err(ScramError::IterationsTooLow {
                        got: parsed,
                        min: MIN_ITERATIONS,
                    }
                    .into());
                }
                parsed
            }
        };
        let allow_degraded_identity = match get(ENV_ALLOW_DEGRADED_IDENTITY) {
            None => false,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        name: ENV_ALLOW_DEGRADED_IDENTITY,
                        value,
                    })
                }
            },
        };
        let correlation_max_age = duration_ms(&get, ENV_CORRELATION_MAX_AGE_MS, 5_000)?;

        Ok(Self {
            bootstrap_servers,
            security_protocol,
            sasl,
            ssl,
            request_timeout,
            default_api_timeout,
            policy: SyncPolicy {
                mechanisms,
                iterations,
                allow_degraded_identity,
                correlation_max_age,
            },
        })
    }
}

impl fmt::Display for KafkaSyncConfig {
    /// Sanitised one-line summary suitable for logging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bootstrap={} protocol={}",
            self.bootstrap_servers.join(","),
            self.security_protocol.as_ref(),
        )?;
        if let Some(sasl) = &self.sasl {
            write!(f, " sasl={} user={}", sasl.mechanism.as_ref(), sasl.username)?;
        }
        write!(
            f,
            " mechanisms={:?} iterations={}",
            self.policy
                .mechanisms
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>(),
            self.policy.iterations,
        )
    }
}

/// Parse a duration variable expressed in milliseconds.
fn duration_ms<F>(get: &F, name: &'static str, default_ms: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(Duration::from_millis(default_ms)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

/// Extract a username/password pair from a JAAS-style login string.
///
/// Accepts `username="user" password="pass"` with double quotes, single
/// quotes, or bare values terminated by whitespace or a semicolon, in any
/// order and surrounded by arbitrary login-module boilerplate.
pub(crate) fn parse_jaas_credentials(s: &str) -> Option<(String, String)> {
    fn extract(field: &str, s: &str) -> Option<String> {
        let needle = format!("{field}=");
        let idx = s.find(&needle)?;
        let after = &s[idx + needle.len()..];
        let first = after.chars().next()?;
        if first == '"' || first == '\'' {
            let rest = &after[first.len_utf8()..];
            let end = rest.find(first)?;
            return Some(rest[..end].to_string());
        }
        let end = after
            .find(|ch: char| ch.is_whitespace() || ch == ';')
            .unwrap_or(after.len());
        Some(after[..end].to_string())
    }
    let username = extract("username", s)?;
    let password = extract("password", s)?;
    Some((username, password))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    /// Empty environment yields the documented defaults.
    #[test]
    fn defaults() {
        let cfg = KafkaSyncConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(cfg.bootstrap_servers, vec!["localhost:9092"]);
        assert_eq!(cfg.security_protocol, SecurityProtocol::Plaintext);
        assert!(cfg.sasl.is_none());
        assert_eq!(cfg.request_timeout, Duration::from_millis(30_000));
        assert_eq!(cfg.default_api_timeout, Duration::from_millis(60_000));
        assert_eq!(cfg.policy.mechanisms, ScramMechanism::all().to_vec());
        assert_eq!(cfg.policy.iterations, MIN_ITERATIONS);
        assert!(!cfg.policy.allow_degraded_identity);
        assert_eq!(cfg.policy.correlation_max_age, Duration::from_millis(5_000));
    }

    /// Full SASL_SSL configuration parses, JAAS credentials included.
    #[test]
    fn sasl_ssl_round_trip() {
        let cfg = KafkaSyncConfig::from_vars(vars(&[
            (ENV_BOOTSTRAP_SERVERS, "k1:9093, k2:9093"),
            (ENV_SECURITY_PROTOCOL, "SASL_SSL"),
            (ENV_SASL_MECHANISM, "SCRAM-SHA-512"),
            (
                ENV_SASL_JAAS_CONFIG,
                "org.apache.kafka.common.security.scram.ScramLoginModule required \
                 username=\"admin\" password=\"secret\";",
            ),
            (ENV_SSL_TRUSTSTORE_LOCATION, "/etc/kafka/ca.pem"),
            (ENV_REQUEST_TIMEOUT_MS, "1500"),
        ]))
        .unwrap();
        assert_eq!(cfg.bootstrap_servers, vec!["k1:9093", "k2:9093"]);
        assert!(cfg.security_protocol.uses_tls());
        let sasl = cfg.sasl.as_ref().unwrap();
        assert_eq!(sasl.mechanism, SaslMechanism::ScramSha512);
        assert_eq!(sasl.username, "admin");
        assert_eq!(sasl.password.expose(), "secret");
        assert_eq!(cfg.request_timeout, Duration::from_millis(1500));
    }

    /// JAAS extraction copes with quoting styles and bare values.
    #[test]
    fn jaas_quoting_variants() {
        for jaas in [
            r#"username="alice" password="pa ss;word""#,
            r#"password='pa ss;word' username='alice'"#,
        ] {
            let (user, pass) = parse_jaas_credentials(jaas).unwrap();
            assert_eq!(user, "alice");
            assert_eq!(pass, "pa ss;word");
        }
        let (user, pass) = parse_jaas_credentials("username=alice password=secret;").unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "secret");
        assert!(parse_jaas_credentials("username=\"alice\"").is_none());
    }

    /// SASL protocols demand a mechanism and credentials.
    #[test]
    fn sasl_requires_mechanism_and_credentials() {
        let err = KafkaSyncConfig::from_vars(vars(&[(ENV_SECURITY_PROTOCOL, "SASL_PLAINTEXT")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSaslMechanism));

        let err = KafkaSyncConfig::from_vars(vars(&[
            (ENV_SECURITY_PROTOCOL, "SASL_PLAINTEXT"),
            (ENV_SASL_MECHANISM, "PLAIN"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSaslCredentials));
    }

    /// GSSAPI is named but unsupported.
    #[test]
    fn gssapi_rejected() {
        let err = KafkaSyncConfig::from_vars(vars(&[
            (ENV_SECURITY_PROTOCOL, "SASL_SSL"),
            (ENV_SASL_MECHANISM, "GSSAPI"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedSaslMechanism(_)));
    }

    /// Mechanism narrowing keeps order and deduplicates.
    #[test]
    fn mechanism_narrowing() {
        let cfg = KafkaSyncConfig::from_vars(vars(&[(
            ENV_SCRAM_MECHANISMS,
            "SCRAM-SHA-512, SCRAM-SHA-512",
        )]))
        .unwrap();
        assert_eq!(cfg.policy.mechanisms, vec![ScramMechanism::Sha512]);

        let err = KafkaSyncConfig::from_vars(vars(&[(ENV_SCRAM_MECHANISMS, " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyMechanismSet));
    }

    /// The iteration floor from RFC 5802 is enforced at parse time.
    #[test]
    fn iteration_floor_enforced() {
        let err = KafkaSyncConfig::from_vars(vars(&[(ENV_SCRAM_ITERATIONS, "1024")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Scram(ScramError::IterationsTooLow { got: 1024, .. })
        ));
    }

    /// Endpoint identification accepts only `https` or empty.
    #[test]
    fn endpoint_identification_values() {
        let cfg = KafkaSyncConfig::from_vars(vars(&[(ENV_SSL_ENDPOINT_IDENTIFICATION, "https")]))
            .unwrap();
        assert!(cfg.ssl.endpoint_identification);
        let err = KafkaSyncConfig::from_vars(vars(&[(ENV_SSL_ENDPOINT_IDENTIFICATION, "ldaps")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpointIdentification(_)));
    }

    /// Secrets never appear in Debug or Display output.
    #[test]
    fn secrets_are_masked() {
        let cfg = KafkaSyncConfig::from_vars(vars(&[
            (ENV_SECURITY_PROTOCOL, "SASL_SSL"),
            (ENV_SASL_MECHANISM, "PLAIN"),
            (
                ENV_SASL_JAAS_CONFIG,
                r#"username="admin" password="hunter2";"#,
            ),
            (ENV_SSL_TRUSTSTORE_PASSWORD, "storepass"),
        ]))
        .unwrap();
        let debug = format!("{cfg:?}");
        let display = cfg.to_string();
        for rendered in [&debug, &display] {
            assert!(!rendered.contains("hunter2"));
            assert!(!rendered.contains("storepass"));
        }
        assert!(debug.contains("admin"));
    }
}
