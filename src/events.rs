//! Admin-event model and the password-synchronising event observer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::{
    context,
    provider::{AdminEventListener, UserDirectory},
    session,
    sync::{ScramSink, SyncJob},
};

/// Administrative operation kinds the host reports.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum OperationType {
    /// Resource created.
    Create,
    /// Resource updated.
    Update,
    /// Resource deleted.
    Delete,
    /// Out-of-band action, e.g. a password reset.
    Action,
}

/// Resource kinds the host reports.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ResourceType {
    /// A user entry.
    User,
    /// A group entry.
    Group,
    /// A client entry.
    Client,
    /// The realm itself.
    Realm,
    /// Anything this crate has no interest in.
    Other,
}

/// One admin-event notification as delivered by the host.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AdminEvent {
    /// Realm the operation happened in.
    pub realm_id: String,
    /// Operation kind.
    pub operation: OperationType,
    /// Resource kind the operation touched.
    pub resource_type: ResourceType,
    /// Resource path, e.g. `users/{id}` or `users/{id}/reset-password`.
    pub resource_path: String,
    /// Raw JSON representation of the resource, when the host attaches one.
    pub representation: Option<String>,
}

/// The two event shapes that carry a password change.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PasswordEventKind {
    CreateUser,
    ResetPassword,
}

/// Classify an event; `None` means it is not password-bearing.
fn password_event_kind(event: &AdminEvent) -> Option<PasswordEventKind> {
    match (event.operation, event.resource_type) {
        (OperationType::Create, ResourceType::User) => Some(PasswordEventKind::CreateUser),
        (OperationType::Action, _) if event.resource_path.contains("reset-password") => {
            Some(PasswordEventKind::ResetPassword)
        }
        _ => None,
    }
}

/// Extract the user id from a resource path.
///
/// Takes the segment following the last `users` component, so both
/// `users/{id}` and `realms/{realm}/users/{id}/reset-password` resolve.
fn user_id_from_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut user_id = None;
    while let Some(segment) = segments.next() {
        if segment == "users" {
            user_id = segments.next();
        }
    }
    user_id.filter(|id| !id.is_empty())
}

/// Subset of a user representation this crate reads.
#[derive(Debug, Deserialize)]
struct UserRepresentation {
    username: Option<String>,
    #[serde(default)]
    credentials: Vec<CredentialRepresentation>,
}

/// One entry of a representation's credentials array.
#[derive(Debug, Deserialize)]
struct CredentialRepresentation {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
}

impl UserRepresentation {
    /// Cleartext password embedded in the credentials array, if any.
    ///
    /// Older hosts inline the password on create-user requests.
    fn password(&self) -> Option<&str> {
        self.credentials
            .iter()
            .find(|c| c.kind.as_deref() == Some("password"))
            .and_then(|c| c.value.as_deref())
            .filter(|v| !v.is_empty())
    }
}

/// Event observer that turns password-bearing admin events into sync jobs.
///
/// All failures are logged and swallowed: admin-event dispatch must never
/// fail because of this component.
pub struct ScramSyncListener<S> {
    directory: Arc<dyn UserDirectory>,
    sink: S,
}

impl<S: ScramSink> ScramSyncListener<S> {
    /// Create a listener bound to the host's user directory.
    pub fn new(directory: Arc<dyn UserDirectory>, sink: S) -> Self {
        Self { directory, sink }
    }

    fn process(&self, event: &AdminEvent) {
        let Some(kind) = password_event_kind(event) else {
            trace!(path = %event.resource_path, "event is not password-bearing, ignoring");
            return;
        };
        // Password-bearing event from here on: the slot is consumed or
        // cleared on every path out, never left behind for a later request.
        let policy = match session::sync_policy() {
            Ok(policy) => policy,
            Err(err) => {
                context::clear();
                warn!(realm = %event.realm_id, error = %err, "sync configuration unavailable, skipping event");
                return;
            }
        };
        let Some(user_id) = user_id_from_path(&event.resource_path) else {
            context::clear();
            warn!(
                realm = %event.realm_id,
                path = %event.resource_path,
                "no user id in resource path, skipping event"
            );
            return;
        };

        let representation = event.representation.as_deref().and_then(|raw| {
            match serde_json::from_str::<UserRepresentation>(raw) {
                Ok(repr) => Some(repr),
                Err(err) => {
                    warn!(
                        realm = %event.realm_id,
                        user = %user_id,
                        error = %err,
                        "unparseable representation, continuing without it"
                    );
                    None
                }
            }
        });

        let (username, degraded) = match representation
            .as_ref()
            .and_then(|r| r.username.clone())
            .filter(|u| !u.is_empty())
        {
            Some(username) => (username, false),
            None => match self.directory.username_by_id(&event.realm_id, user_id) {
                Ok(username) => (username, false),
                Err(err) => {
                    warn!(
                        realm = %event.realm_id,
                        user = %user_id,
                        error = %err,
                        "username resolution failed, falling back to user id"
                    );
                    (user_id.to_string(), true)
                }
            },
        };

        // The slot is drained no matter which source wins, so one request's
        // cleartext can never leak into the next event on this thread.
        let slot = context::take(policy.correlation_max_age);
        let cleartext = match representation.as_ref().and_then(UserRepresentation::password) {
            Some(inline) => {
                if let Some(slot) = &slot {
                    if slot.as_str() != inline {
                        warn!(
                            realm = %event.realm_id,
                            user = %user_id,
                            "representation password differs from intercepted one, preferring representation"
                        );
                    }
                }
                Zeroizing::new(inline.to_string())
            }
            None => match slot {
                Some(cleartext) => cleartext,
                None => {
                    warn!(
                        realm = %event.realm_id,
                        user = %user_id,
                        kind = ?kind,
                        "no cleartext available for password event, skipping"
                    );
                    return;
                }
            },
        };

        let job = SyncJob {
            realm_id: event.realm_id.clone(),
            user_id: user_id.to_string(),
            username,
            cleartext,
            mechanisms: policy.mechanisms.clone(),
            degraded,
        };
        debug!(realm = %job.realm_id, user = %job.user_id, kind = ?kind, "dispatching sync job");
        // The executor emits the per-event outcome record, failures included.
        let _ = self.sink.upsert_scram(&job);
    }
}

impl<S: ScramSink + Send + Sync> AdminEventListener for ScramSyncListener<S> {
    fn on_event(&self, event: &AdminEvent) {
        self.process(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        context::DEFAULT_MAX_AGE,
        provider::DirectoryError,
        scram::ScramMechanism,
        sync::{SyncError, SyncOutcome},
    };

    struct StaticDirectory(Option<&'static str>);

    impl UserDirectory for StaticDirectory {
        fn username_by_id(&self, realm_id: &str, user_id: &str) -> Result<String, DirectoryError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| DirectoryError::NotFound {
                    realm_id: realm_id.to_string(),
                    user_id: user_id.to_string(),
                })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        jobs: Mutex<Vec<(String, String, Vec<ScramMechanism>, bool)>>,
    }

    impl ScramSink for &RecordingSink {
        fn upsert_scram(&self, job: &SyncJob) -> Result<SyncOutcome, SyncError> {
            self.jobs.lock().unwrap().push((
                job.username.clone(),
                job.cleartext.to_string(),
                job.mechanisms.clone(),
                job.degraded,
            ));
            Ok(SyncOutcome {
                mechanisms: job.mechanisms.clone(),
            })
        }
    }

    fn create_event(representation: Option<&str>) -> AdminEvent {
        AdminEvent {
            realm_id: "master".to_string(),
            operation: OperationType::Create,
            resource_type: ResourceType::User,
            resource_path: "users/7f3c2a".to_string(),
            representation: representation.map(str::to_string),
        }
    }

    fn reset_event() -> AdminEvent {
        AdminEvent {
            realm_id: "master".to_string(),
            operation: OperationType::Action,
            resource_type: ResourceType::User,
            resource_path: "users/29ce1f/reset-password".to_string(),
            representation: None,
        }
    }

    /// User ids resolve from both event path shapes.
    #[test]
    fn user_id_parsing() {
        assert_eq!(user_id_from_path("users/29ce1f"), Some("29ce1f"));
        assert_eq!(user_id_from_path("users/29ce1f/reset-password"), Some("29ce1f"));
        assert_eq!(
            user_id_from_path("realms/demo/users/42/reset-password"),
            Some("42")
        );
        assert_eq!(user_id_from_path("groups/42"), None);
        assert_eq!(user_id_from_path("users/"), None);
        assert_eq!(user_id_from_path(""), None);
    }

    /// Create-user with representation username and intercepted password.
    #[test]
    fn create_user_happy_path() {
        let sink = RecordingSink::default();
        let listener =
            ScramSyncListener::new(Arc::new(StaticDirectory(Some("ignored"))), &sink);
        context::deposit("pencil");
        listener.on_event(&create_event(Some(r#"{"username":"alice"}"#)));
        let jobs = sink.jobs.lock().unwrap();
        let (username, cleartext, mechanisms, degraded) = &jobs[0];
        assert_eq!(username, "alice");
        assert_eq!(cleartext, "pencil");
        assert_eq!(mechanisms, &ScramMechanism::all().to_vec());
        assert!(!degraded);
    }

    /// Password reset with no representation resolves the username through
    /// the directory.
    #[test]
    fn reset_resolves_username() {
        let sink = RecordingSink::default();
        let listener = ScramSyncListener::new(Arc::new(StaticDirectory(Some("bob"))), &sink);
        context::deposit("hunter2");
        listener.on_event(&reset_event());
        let jobs = sink.jobs.lock().unwrap();
        assert_eq!(jobs[0].0, "bob");
        assert_eq!(jobs[0].1, "hunter2");
    }

    /// No deposited cleartext means no job.
    #[test]
    fn correlation_miss_skips_job() {
        let sink = RecordingSink::default();
        let listener = ScramSyncListener::new(Arc::new(StaticDirectory(Some("bob"))), &sink);
        context::clear();
        listener.on_event(&reset_event());
        assert!(sink.jobs.lock().unwrap().is_empty());
    }

    /// Failed username resolution degrades the job to the user id.
    #[test]
    fn unresolved_username_degrades() {
        let sink = RecordingSink::default();
        let listener = ScramSyncListener::new(Arc::new(StaticDirectory(None)), &sink);
        context::deposit("hunter2");
        listener.on_event(&reset_event());
        let jobs = sink.jobs.lock().unwrap();
        assert_eq!(jobs[0].0, "29ce1f");
        assert!(jobs[0].3);
    }

    /// A representation password wins over the slot, which is still drained.
    #[test]
    fn representation_password_wins_and_drains_slot() {
        let sink = RecordingSink::default();
        let listener =
            ScramSyncListener::new(Arc::new(StaticDirectory(Some("ignored"))), &sink);
        context::deposit("stale-intercept");
        let repr = r#"{
            "username": "alice",
            "credentials": [{"type": "password", "value": "from-representation"}]
        }"#;
        listener.on_event(&create_event(Some(repr)));
        let jobs = sink.jobs.lock().unwrap();
        assert_eq!(jobs[0].1, "from-representation");
        drop(jobs);
        assert!(context::take(DEFAULT_MAX_AGE).is_none());
    }

    /// Events that do not carry a password change are ignored.
    #[test]
    fn irrelevant_events_ignored() {
        let sink = RecordingSink::default();
        let listener = ScramSyncListener::new(Arc::new(StaticDirectory(Some("bob"))), &sink);
        context::deposit("hunter2");
        let event = AdminEvent {
            realm_id: "master".to_string(),
            operation: OperationType::Update,
            resource_type: ResourceType::Group,
            resource_path: "groups/42".to_string(),
            representation: None,
        };
        listener.on_event(&event);
        assert!(sink.jobs.lock().unwrap().is_empty());
        context::clear();
    }

    /// A malformed representation is tolerated; the slot still supplies the
    /// password.
    #[test]
    fn malformed_representation_tolerated() {
        let sink = RecordingSink::default();
        let listener = ScramSyncListener::new(Arc::new(StaticDirectory(Some("carol"))), &sink);
        context::deposit("p4ss");
        listener.on_event(&create_event(Some("{not json")));
        let jobs = sink.jobs.lock().unwrap();
        assert_eq!(jobs[0].0, "carol");
        assert_eq!(jobs[0].1, "p4ss");
    }
}
