//! Process-wide admin-session lifecycle.
//!
//! One lazily-initialised session per process, shared by every request
//! thread. The lifecycle is one-way: uninitialised, then ready, then closed.
//! A failed initialisation leaves the state untouched so the next event
//! retries; shutdown is idempotent.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

use crate::{
    client::{ClientError, KafkaAdminClient},
    config::{ConfigError, KafkaSyncConfig, SyncPolicy},
    scram::ScramCredential,
    sync::SyncError,
};

/// Parsed environment configuration, cached after the first success.
static CONFIG: OnceCell<Arc<KafkaSyncConfig>> = OnceCell::new();

/// Session slot shared by all threads.
static SESSION: Lazy<Mutex<State>> = Lazy::new(|| Mutex::new(State::Uninitialised));

enum State {
    Uninitialised,
    Ready(Arc<AdminSession>),
    Closed,
}

/// The environment-derived configuration, parsed once.
///
/// A parse failure is not cached, so a corrected environment is picked up by
/// the next call.
///
/// # Errors
///
/// Returns `Err` when the environment fails to parse.
pub fn config() -> Result<Arc<KafkaSyncConfig>, ConfigError> {
    CONFIG
        .get_or_try_init(|| KafkaSyncConfig::from_env().map(Arc::new))
        .cloned()
}

/// The configured synchronisation policy.
///
/// # Errors
///
/// Returns `Err` when the environment fails to parse.
pub fn sync_policy() -> Result<SyncPolicy, ConfigError> {
    Ok(config()?.policy.clone())
}

/// A ready admin session: the wire client plus the runtime that drives it.
///
/// The runtime is single-threaded and only ever entered via `block_on`, so
/// all I/O executes on the calling host thread; the crate spawns no threads
/// of its own.
pub struct AdminSession {
    runtime: Runtime,
    client: KafkaAdminClient,
    config: Arc<KafkaSyncConfig>,
}

impl AdminSession {
    fn open(config: Arc<KafkaSyncConfig>) -> Result<Self, SyncError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| SyncError::Client(ClientError::Io(err)))?;
        let client = KafkaAdminClient::new(Arc::clone(&config))?;
        Ok(Self {
            runtime,
            client,
            config,
        })
    }

    /// Configuration this session was built from.
    #[must_use]
    pub fn config(&self) -> &KafkaSyncConfig {
        &self.config
    }

    /// Blockingly upsert SCRAM verifiers for one user.
    ///
    /// Bounded by the configured end-to-end API timeout.
    ///
    /// # Errors
    ///
    /// Returns `Err` on timeout, transport failure, or a cluster-side error.
    pub fn alter_user_scram(
        &self,
        username: &str,
        credentials: &[ScramCredential],
    ) -> Result<(), ClientError> {
        self.runtime.block_on(async {
            tokio::time::timeout(
                self.config.default_api_timeout,
                self.client.alter_user_scram(username, credentials),
            )
            .await
            .map_err(|_| ClientError::Timeout)?
        })
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.runtime.block_on(self.client.close());
    }
}

/// Get the shared session, initialising it on first use.
///
/// Initialisation is serialised; a failure is logged with the sanitised
/// configuration and re-raised, leaving the state retryable.
///
/// # Errors
///
/// Returns `Err` when configuration or client construction fails, or after
/// [`shutdown`] has been called.
pub fn acquire() -> Result<Arc<AdminSession>, SyncError> {
    let mut state = SESSION.lock();
    match &*state {
        State::Ready(session) => Ok(Arc::clone(session)),
        State::Closed => Err(SyncError::SessionClosed),
        State::Uninitialised => {
            let config = config().map_err(SyncError::Config)?;
            info!(%config, "initialising Kafka admin session");
            match AdminSession::open(config) {
                Ok(session) => {
                    let session = Arc::new(session);
                    *state = State::Ready(Arc::clone(&session));
                    Ok(session)
                }
                Err(err) => {
                    warn!(error = %err, "admin session initialisation failed");
                    Err(err)
                }
            }
        }
    }
}

/// Close the session. Idempotent; later [`acquire`] calls fail.
///
/// In-flight admin calls on other threads finish against their own handle;
/// the underlying connection is torn down when the last handle drops.
pub fn shutdown() {
    let mut state = SESSION.lock();
    if matches!(&*state, State::Ready(_)) {
        info!("closing Kafka admin session");
    }
    *state = State::Closed;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The lifecycle is one-way and shutdown is idempotent.
    ///
    /// With no security configured, initialisation succeeds without touching
    /// the network; the connection itself is opened lazily per request.
    #[test]
    fn lifecycle_is_one_way() {
        let session = acquire().expect("plaintext session initialises offline");
        assert!(session.config().bootstrap_servers.iter().all(|s| !s.is_empty()));
        let again = acquire().unwrap();
        assert!(Arc::ptr_eq(&session, &again));

        shutdown();
        shutdown();
        assert!(matches!(acquire(), Err(SyncError::SessionClosed)));
    }
}
