//! Sync job model and the cluster-bound executor.

use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::{
    client::ClientError,
    config::ConfigError,
    scram::{ScramCredential, ScramError, ScramMechanism},
    session,
};

/// Error type covering the whole synchronisation path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Configuration invalid or missing.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The admin session has been shut down.
    #[error("Admin session is closed")]
    SessionClosed,
    /// The admin client failed; see [`ClientError::class`] for severity.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Verifier synthesis failed.
    #[error(transparent)]
    Scram(#[from] ScramError),
    /// The job was refused before any cluster call.
    #[error("Job rejected: {0}")]
    Rejected(#[from] JobRejection),
}

/// Reasons a job is refused at the boundary.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum JobRejection {
    /// Username resolved to nothing.
    #[error("empty username")]
    EmptyUsername,
    /// No cleartext password in the job.
    #[error("empty cleartext password")]
    EmptyPassword,
    /// Nothing to provision.
    #[error("empty mechanism set")]
    EmptyMechanismSet,
    /// Username fell back to the user id and policy forbids that.
    #[error("degraded identity refused by policy")]
    DegradedIdentity,
}

/// One ephemeral synchronisation job. Never queued, never persisted.
#[derive(Clone)]
pub struct SyncJob {
    /// Realm the password change happened in.
    pub realm_id: String,
    /// Host-side user id.
    pub user_id: String,
    /// Kafka principal name to provision.
    pub username: String,
    /// The intercepted cleartext password.
    pub cleartext: Zeroizing<String>,
    /// Mechanisms to provision.
    pub mechanisms: Vec<ScramMechanism>,
    /// Whether the username fell back to the user id.
    pub degraded: bool,
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("realm_id", &self.realm_id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("cleartext", &deboog::masking::HIDE_STR)
            .field("mechanisms", &self.mechanisms)
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Acknowledged result of a job.
#[derive(Clone, Debug)]
pub struct SyncOutcome {
    /// Mechanisms the cluster acknowledged.
    pub mechanisms: Vec<ScramMechanism>,
}

/// Seam between the event observer and the cluster-bound executor.
pub trait ScramSink {
    /// Synchronously provision SCRAM verifiers for the job's user.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the job is refused at the boundary or the cluster
    /// call fails.
    fn upsert_scram(&self, job: &SyncJob) -> Result<SyncOutcome, SyncError>;
}

/// Executor backed by the process-wide admin session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncExecutor;

/// Boundary validation; rejects jobs the cluster should never see.
fn validate(job: &SyncJob, allow_degraded: bool) -> Result<(), JobRejection> {
    if job.username.is_empty() {
        return Err(JobRejection::EmptyUsername);
    }
    if job.cleartext.is_empty() {
        return Err(JobRejection::EmptyPassword);
    }
    if job.mechanisms.is_empty() {
        return Err(JobRejection::EmptyMechanismSet);
    }
    if job.degraded && !allow_degraded {
        return Err(JobRejection::DegradedIdentity);
    }
    Ok(())
}

impl SyncExecutor {
    fn run(&self, job: &SyncJob) -> Result<SyncOutcome, SyncError> {
        let policy = session::sync_policy()?;
        validate(job, policy.allow_degraded_identity)?;
        if job.degraded {
            warn!(
                realm = %job.realm_id,
                user = %job.user_id,
                "provisioning a degraded identity as permitted by policy"
            );
        }
        let session = session::acquire()?;
        let credentials = job
            .mechanisms
            .iter()
            .map(|mechanism| {
                ScramCredential::generate(&job.cleartext, *mechanism, policy.iterations)
            })
            .collect::<Result<Vec<_>, _>>()?;
        session.alter_user_scram(&job.username, &credentials)?;
        Ok(SyncOutcome {
            mechanisms: job.mechanisms.clone(),
        })
    }
}

impl ScramSink for SyncExecutor {
    /// Run the job and emit the per-event outcome record.
    ///
    /// Exactly one structured log line per call, success or failure; never
    /// any cleartext, salt, or key material.
    fn upsert_scram(&self, job: &SyncJob) -> Result<SyncOutcome, SyncError> {
        let mechanisms: Vec<&str> = job.mechanisms.iter().map(AsRef::as_ref).collect();
        let started = Instant::now();
        let result = self.run(job);
        let latency_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                realm = %job.realm_id,
                user = %job.user_id,
                username = %job.username,
                mechanisms = ?mechanisms,
                latency_ms,
                outcome = "ok",
                "SCRAM credentials synchronised"
            ),
            Err(err) => {
                let class = match err {
                    SyncError::Client(client) => client.class().as_str(),
                    SyncError::Rejected(_) => "rejected",
                    SyncError::Config(_) => "config",
                    SyncError::SessionClosed => "closed",
                    _ => "error",
                };
                warn!(
                    realm = %job.realm_id,
                    user = %job.user_id,
                    username = %job.username,
                    mechanisms = ?mechanisms,
                    latency_ms,
                    outcome = class,
                    error = %err,
                    "SCRAM synchronisation failed"
                );
            }
        }
        result
    }
}
