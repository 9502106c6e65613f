//! Host integration surface: extension-point traits and the factory registry.
//!
//! The host composes its capabilities from registered factories, picking the
//! highest-order factory for a given provider id. The intercepting hasher
//! registers under the stock PBKDF2-SHA256 id with an order above the
//! default's, which is what routes cleartext through this crate without any
//! change to the host itself.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    events::{AdminEvent, ScramSyncListener},
    hasher::{HashedCredential, InterceptingHasher, ALGORITHM_ID},
    sync::SyncExecutor,
};

/// Order the stock providers register with.
pub const DEFAULT_PROVIDER_ORDER: i32 = 0;

/// Order of the intercepting hasher; must beat every stock provider.
pub const INTERCEPTOR_ORDER: i32 = 100;

/// Error type for host user-directory lookups.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DirectoryError {
    /// No user with the given id exists in the realm.
    #[error("No user {user_id} in realm {realm_id}")]
    NotFound {
        /// Realm searched.
        realm_id: String,
        /// User id searched for.
        user_id: String,
    },
    /// The host's user store failed.
    #[error("User directory failure: {0}")]
    Backend(String),
}

/// Read access to the host's user directory.
///
/// Implemented by the host glue; used by the event observer to resolve a
/// username when the event payload omits it.
pub trait UserDirectory: Send + Sync {
    /// Resolve the username of `(realm_id, user_id)`.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the user does not exist or the backing store fails.
    fn username_by_id(&self, realm_id: &str, user_id: &str) -> Result<String, DirectoryError>;
}

/// The host's password-hash provider capability.
pub trait PasswordHashProvider: Send + Sync {
    /// Hash `raw` and return the encoded derived key.
    fn encode(&self, raw: &str, iterations: i32) -> String;
    /// Hash `raw` into a storable credential.
    fn encode_credential(&self, raw: &str, iterations: i32) -> HashedCredential;
    /// Verify `raw` against a stored credential.
    fn verify(&self, raw: &str, credential: &HashedCredential) -> bool;
    /// Whether a stored credential already satisfies the given policy.
    fn policy_check(&self, policy_iterations: i32, credential: &HashedCredential) -> bool;
}

impl PasswordHashProvider for InterceptingHasher {
    fn encode(&self, raw: &str, iterations: i32) -> String {
        Self::encode(self, raw, iterations)
    }

    fn encode_credential(&self, raw: &str, iterations: i32) -> HashedCredential {
        Self::encode_credential(self, raw, iterations)
    }

    fn verify(&self, raw: &str, credential: &HashedCredential) -> bool {
        Self::verify(self, raw, credential)
    }

    fn policy_check(&self, policy_iterations: i32, credential: &HashedCredential) -> bool {
        Self::policy_check(self, policy_iterations, credential)
    }
}

/// The host's admin-event listener capability.
pub trait AdminEventListener: Send + Sync {
    /// Handle one admin event. Must not fail the host's dispatch.
    fn on_event(&self, event: &AdminEvent);
}

/// Factory advertising a [`PasswordHashProvider`] to the host.
pub trait HashProviderFactory: Sync {
    /// Provider id this factory registers under.
    fn id(&self) -> &'static str;
    /// Precedence; the highest order wins for a shared id.
    fn order(&self) -> i32;
    /// Instantiate a provider for one host session.
    fn create(&self) -> Box<dyn PasswordHashProvider>;
}

// Factories are registered at this point, before `main()` is run.
// For more info see documentation on the [`inventory`] crate.
inventory::collect!(&'static dyn HashProviderFactory);

/// Factory advertising an [`AdminEventListener`] to the host.
pub trait ListenerFactory: Sync {
    /// Listener id this factory registers under.
    fn id(&self) -> &'static str;
    /// Instantiate a listener bound to the host's user directory.
    fn create(&self, directory: Arc<dyn UserDirectory>) -> Box<dyn AdminEventListener>;
}

inventory::collect!(&'static dyn ListenerFactory);

/// Select the effective hash-provider factory for an id.
///
/// Mirrors the host's composition rule: among all factories sharing the id,
/// the highest order wins.
#[must_use]
pub fn hash_provider_factory(id: &str) -> Option<&'static dyn HashProviderFactory> {
    inventory::iter::<&'static dyn HashProviderFactory>
        .into_iter()
        .filter(|factory| factory.id() == id)
        .max_by_key(|factory| factory.order())
        .copied()
}

/// Look up a listener factory by id.
#[must_use]
pub fn listener_factory(id: &str) -> Option<&'static dyn ListenerFactory> {
    inventory::iter::<&'static dyn ListenerFactory>
        .into_iter()
        .find(|factory| factory.id() == id)
        .copied()
}

/// Factory for the intercepting hasher, registered under the stock id.
#[derive(Clone, Copy, Debug, Default)]
pub struct InterceptingHasherFactory;

impl HashProviderFactory for InterceptingHasherFactory {
    fn id(&self) -> &'static str {
        ALGORITHM_ID
    }

    fn order(&self) -> i32 {
        INTERCEPTOR_ORDER
    }

    fn create(&self) -> Box<dyn PasswordHashProvider> {
        Box::new(InterceptingHasher::default())
    }
}

inventory::submit! { &InterceptingHasherFactory as &dyn HashProviderFactory }

/// Factory for the SCRAM sync listener.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScramSyncListenerFactory;

/// Listener id the sync observer registers under.
pub const LISTENER_ID: &str = "scram-sync";

impl ListenerFactory for ScramSyncListenerFactory {
    fn id(&self) -> &'static str {
        LISTENER_ID
    }

    fn create(&self, directory: Arc<dyn UserDirectory>) -> Box<dyn AdminEventListener> {
        Box::new(ScramSyncListener::new(directory, SyncExecutor::default()))
    }
}

inventory::submit! { &ScramSyncListenerFactory as &dyn ListenerFactory }

#[cfg(test)]
mod tests {
    use super::*;

    /// The intercepting factory shadows a stock-order registration.
    #[test]
    fn interceptor_wins_on_order() {
        let factory = hash_provider_factory(ALGORITHM_ID).unwrap();
        assert_eq!(factory.order(), INTERCEPTOR_ORDER);
        assert!(factory.order() > DEFAULT_PROVIDER_ORDER);
    }

    /// Unknown ids resolve to nothing.
    #[test]
    fn unknown_id_is_absent() {
        assert!(hash_provider_factory("argon2id").is_none());
        assert!(listener_factory("audit-log").is_none());
    }

    /// The listener factory produces a live listener.
    #[test]
    fn listener_factory_creates() {
        struct NoUsers;
        impl UserDirectory for NoUsers {
            fn username_by_id(
                &self,
                realm_id: &str,
                user_id: &str,
            ) -> Result<String, DirectoryError> {
                Err(DirectoryError::NotFound {
                    realm_id: realm_id.to_string(),
                    user_id: user_id.to_string(),
                })
            }
        }
        let factory = listener_factory(LISTENER_ID).unwrap();
        let _listener = factory.create(Arc::new(NoUsers));
    }
}
