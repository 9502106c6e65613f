#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

pub mod client;
pub mod config;
pub mod context;
pub mod events;
pub mod hasher;
pub mod provider;
pub mod scram;
pub mod session;
pub mod sync;

pub use self::{
    client::{ClientError, FailureClass},
    config::{
        ConfigError, KafkaSyncConfig, SaslConfig, SaslMechanism, Secret, SecurityProtocol,
        SslConfig, SyncPolicy,
    },
    events::{AdminEvent, OperationType, ResourceType, ScramSyncListener},
    hasher::{HashedCredential, InterceptingHasher, ALGORITHM_ID, DEFAULT_ITERATIONS},
    scram::{ScramCredential, ScramError, ScramMechanism, MIN_ITERATIONS, SALT_LEN},
    sync::{JobRejection, ScramSink, SyncError, SyncExecutor, SyncJob, SyncOutcome},
};
