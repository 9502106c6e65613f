//! Low-level Kafka admin-protocol client.
//!
//! Speaks the wire protocol directly instead of riding a producer/consumer
//! library: the only operation this crate needs is SCRAM credential
//! alteration, which high-level clients do not expose. One connection is kept
//! per client, authenticated on open and replaced after transport failures.

mod tls;

use std::{
    fmt,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use bytes::{Bytes, BytesMut};
use futures::{lock::Mutex, Sink, SinkExt, Stream, TryStreamExt};
use kafka_protocol::{
    messages::{
        alter_user_scram_credentials_request::{
            AlterUserScramCredentialsRequest, ScramCredentialUpsertion,
        },
        RequestHeader, ResponseHeader, SaslAuthenticateRequest, SaslHandshakeRequest,
    },
    protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes},
    ResponseError,
};
use rsasl::{config::SASLConfig, mechname::Mechname, prelude::SASLClient};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::{rustls::pki_types::ServerName, TlsConnector};
use tracing::debug;

use crate::{config::KafkaSyncConfig, scram::ScramCredential};

/// Client id advertised in every request header.
const CLIENT_ID: &str = "scramsync-admin";

/// Error type used by the admin client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// I/O failure on the broker connection.
    #[error("I/O failure talking to the cluster: {0}")]
    Io(#[from] std::io::Error),
    /// None of the bootstrap servers accepted a connection.
    #[error("No bootstrap server reachable: {0}")]
    NoBrokerReachable(String),
    /// A round trip exceeded the configured request timeout.
    #[error("Request timed out")]
    Timeout,
    /// The broker closed the connection mid-request.
    #[error("Connection closed by the cluster")]
    ConnectionClosed,
    /// TLS configuration could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),
    /// A trust- or key-store could not be loaded.
    #[error("Invalid key material in {path}: {reason}")]
    InvalidStore {
        /// Store path as configured.
        path: String,
        /// What went wrong with it.
        reason: String,
    },
    /// The local SASL machinery failed.
    #[error("SASL failure: {0}")]
    Sasl(String),
    /// The cluster rejected the admin session's credentials.
    #[error("Cluster rejected SASL authentication: {0}")]
    AuthRejected(String),
    /// The byte stream violated the protocol.
    #[error("Protocol violation: {0}")]
    Protocol(String),
    /// The cluster answered with an error code.
    #[error("Cluster error {code}: {message}")]
    Broker {
        /// Kafka protocol error code.
        code: i16,
        /// Broker-provided or derived message.
        message: String,
    },
}

/// Coarse failure classes the sync path reacts to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum FailureClass {
    /// Invalid local configuration; fatal until corrected.
    Config,
    /// Transport-level trouble; the next job reconnects and may succeed.
    Transient,
    /// The admin session's own credentials were rejected.
    Auth,
    /// The cluster refused the operation.
    Cluster,
}

impl FailureClass {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Transient => "transient",
            Self::Auth => "auth",
            Self::Cluster => "cluster",
        }
    }
}

impl AsRef<str> for FailureClass {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Classify this error for logging and retry decisions.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Io(_) | Self::NoBrokerReachable(_) | Self::Timeout | Self::ConnectionClosed => {
                FailureClass::Transient
            }
            Self::Tls(_) | Self::InvalidStore { .. } => FailureClass::Config,
            Self::Sasl(_) | Self::AuthRejected(_) => FailureClass::Auth,
            Self::Protocol(_) => FailureClass::Cluster,
            Self::Broker { code, .. } => classify_broker_code(*code),
        }
    }
}

/// Classify a Kafka protocol error code.
fn classify_broker_code(code: i16) -> FailureClass {
    match ResponseError::try_from_code(code) {
        Some(
            ResponseError::NetworkException
            | ResponseError::RequestTimedOut
            | ResponseError::BrokerNotAvailable
            | ResponseError::NotController,
        ) => FailureClass::Transient,
        Some(
            ResponseError::ClusterAuthorizationFailed
            | ResponseError::SaslAuthenticationFailed
            | ResponseError::UnsupportedSaslMechanism
            | ResponseError::IllegalSaslState,
        ) => FailureClass::Auth,
        _ => FailureClass::Cluster,
    }
}

/// Render a broker error code for logs and error messages.
fn broker_error_message(code: i16, message: Option<&str>) -> String {
    match message {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => ResponseError::try_from_code(code)
            .map(|err| format!("{err:?}"))
            .unwrap_or_else(|| format!("unknown error {code}")),
    }
}

/// One framed, possibly TLS-wrapped broker connection.
struct Connection {
    reader: Pin<Box<dyn Stream<Item = Result<BytesMut, std::io::Error>> + Send + Unpin>>,
    writer: Pin<Box<dyn Sink<Bytes, Error = std::io::Error> + Send + Unpin>>,
}

/// Kafka requests and responses are length-prefixed with a big-endian `int32`.
fn codec() -> tokio_util::codec::LengthDelimitedCodec {
    tokio_util::codec::LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(1 << 27) // 128 MiB
        .new_codec()
}

/// Split and frame a raw stream into a [`Connection`].
fn frame_stream<S>(stream: S) -> Connection
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    Connection {
        reader: Pin::new(Box::new(tokio_util::codec::FramedRead::new(reader, codec()))),
        writer: Pin::new(Box::new(tokio_util::codec::FramedWrite::new(writer, codec()))),
    }
}

/// Admin-protocol client bound to one cluster.
pub(crate) struct KafkaAdminClient {
    config: Arc<KafkaSyncConfig>,
    connection: Mutex<Option<Connection>>,
    tls: Option<TlsConnector>,
    sasl: Option<Arc<SASLConfig>>,
    correlation: AtomicI32,
}

impl KafkaAdminClient {
    /// Build a client from configuration. Does not connect yet; the
    /// connection is opened lazily by the first request.
    ///
    /// # Errors
    ///
    /// Returns `Err` when TLS material cannot be loaded or the SASL
    /// configuration is unusable.
    pub(crate) fn new(config: Arc<KafkaSyncConfig>) -> Result<Self, ClientError> {
        let tls = if config.security_protocol.uses_tls() {
            Some(TlsConnector::from(Arc::new(tls::client_config(&config.ssl)?)))
        } else {
            None
        };
        let sasl = match (config.security_protocol.uses_sasl(), &config.sasl) {
            (true, Some(sasl)) => Some(
                SASLConfig::with_credentials(
                    None,
                    sasl.username.clone(),
                    sasl.password.expose().to_string(),
                )
                .map_err(|err| ClientError::Sasl(err.to_string()))?,
            ),
            _ => None,
        };
        Ok(Self {
            config,
            connection: Mutex::new(None),
            tls,
            sasl,
            correlation: AtomicI32::new(1),
        })
    }

    /// Upsert SCRAM verifiers for one user, all mechanisms in one batch.
    ///
    /// # Errors
    ///
    /// Returns `Err` on transport failure or when the cluster reports an
    /// error for the user.
    pub(crate) async fn alter_user_scram(
        &self,
        username: &str,
        credentials: &[ScramCredential],
    ) -> Result<(), ClientError> {
        let mut upsertions = Vec::with_capacity(credentials.len());
        for credential in credentials {
            let iterations = i32::try_from(credential.iterations).map_err(|_| {
                ClientError::Protocol("iteration count exceeds protocol range".to_string())
            })?;
            upsertions.push(
                ScramCredentialUpsertion::default()
                    .with_name(StrBytes::from_string(username.to_string()))
                    .with_mechanism(credential.mechanism.wire_code())
                    .with_iterations(iterations)
                    .with_salt(Bytes::copy_from_slice(&credential.salt))
                    .with_salted_password(Bytes::copy_from_slice(&credential.salted_password)),
            );
        }
        let request = AlterUserScramCredentialsRequest::default().with_upsertions(upsertions);
        let response = self.call(request).await?;
        for result in &response.results {
            if result.error_code != 0 {
                return Err(ClientError::Broker {
                    code: result.error_code,
                    message: broker_error_message(
                        result.error_code,
                        result.error_message.as_deref(),
                    ),
                });
            }
        }
        Ok(())
    }

    /// Close the connection, if one is open. Safe to call repeatedly.
    pub(crate) async fn close(&self) {
        let mut guard = self.connection.lock().await;
        if guard.take().is_some() {
            debug!("admin connection closed");
        }
    }

    /// Send one request on the cached connection, opening and authenticating
    /// it first when necessary. Transport failures and desyncs invalidate the
    /// connection so the next call starts fresh.
    async fn call<Req: Request>(&self, request: Req) -> Result<Req::Response, ClientError> {
        let mut guard = self.connection.lock().await;
        let mut connection = match guard.take() {
            Some(connection) => connection,
            None => tokio::time::timeout(self.config.request_timeout, self.open())
                .await
                .map_err(|_| ClientError::Timeout)??,
        };
        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.send_on(&mut connection, request),
        )
        .await
        .map_err(|_| ClientError::Timeout)
        .and_then(|inner| inner);
        // Transport failures and desyncs poison the connection; the next call
        // starts from a fresh one.
        let reusable = match &result {
            Ok(_) => true,
            Err(err) => {
                err.class() != FailureClass::Transient && !matches!(err, ClientError::Protocol(_))
            }
        };
        if reusable {
            *guard = Some(connection);
        }
        result
    }

    /// Open a fresh connection to the first reachable bootstrap server and
    /// run the SASL exchange on it when configured.
    async fn open(&self) -> Result<Connection, ClientError> {
        let mut failures = Vec::new();
        for server in &self.config.bootstrap_servers {
            let (host, port) = match server.rsplit_once(':') {
                Some((host, port)) => match port.parse::<u16>() {
                    Ok(port) => (host, port),
                    Err(_) => {
                        failures.push(format!("{server}: invalid port"));
                        continue;
                    }
                },
                None => (server.as_str(), 9092),
            };
            match self.open_one(host, port).await {
                Ok(mut connection) => {
                    if let Some(sasl) = &self.sasl {
                        self.sasl_auth(&mut connection, Arc::clone(sasl)).await?;
                    }
                    return Ok(connection);
                }
                Err(err) => {
                    debug!(host, port, error = %err, "bootstrap server unreachable");
                    failures.push(format!("{server}: {err}"));
                }
            }
        }
        Err(ClientError::NoBrokerReachable(failures.join("; ")))
    }

    /// Connect one TCP stream, wrapping it in TLS when configured.
    async fn open_one(&self, host: &str, port: u16) -> Result<Connection, ClientError> {
        let stream = TcpStream::connect((host, port)).await?;
        match &self.tls {
            None => Ok(frame_stream(stream)),
            Some(connector) => {
                let name = ServerName::try_from(host.to_string())
                    .map_err(|err| ClientError::Tls(err.to_string()))?;
                let stream = connector.connect(name, stream).await?;
                Ok(frame_stream(stream))
            }
        }
    }

    /// Encode and send one request, then decode its response.
    async fn send_on<Req: Request>(
        &self,
        connection: &mut Connection,
        request: Req,
    ) -> Result<Req::Response, ClientError> {
        let api_version = Req::VERSIONS.max;
        let correlation_id = self.correlation.fetch_add(1, Ordering::Relaxed);
        let header = RequestHeader::default()
            .with_request_api_key(Req::KEY)
            .with_request_api_version(api_version)
            .with_correlation_id(correlation_id)
            .with_client_id(Some(StrBytes::from_static_str(CLIENT_ID)));

        let mut buf = BytesMut::new();
        header
            .encode(&mut buf, Req::header_version(api_version))
            .map_err(|err| ClientError::Protocol(err.to_string()))?;
        request
            .encode(&mut buf, api_version)
            .map_err(|err| ClientError::Protocol(err.to_string()))?;
        connection.writer.send(buf.freeze()).await?;

        let mut frame = connection
            .reader
            .try_next()
            .await?
            .ok_or(ClientError::ConnectionClosed)?;
        let response_header =
            ResponseHeader::decode(&mut frame, Req::Response::header_version(api_version))
                .map_err(|err| ClientError::Protocol(err.to_string()))?;
        if response_header.correlation_id != correlation_id {
            return Err(ClientError::Protocol(format!(
                "correlation id mismatch: sent {correlation_id}, got {}",
                response_header.correlation_id
            )));
        }
        Req::Response::decode(&mut frame, api_version)
            .map_err(|err| ClientError::Protocol(err.to_string()))
    }

    /// Run the SASL handshake and authentication exchange on a new
    /// connection.
    async fn sasl_auth(
        &self,
        connection: &mut Connection,
        config: Arc<SASLConfig>,
    ) -> Result<(), ClientError> {
        let mechanism = self
            .config
            .sasl
            .as_ref()
            .map(|sasl| sasl.mechanism.as_ref())
            .unwrap_or("PLAIN");
        let handshake = SaslHandshakeRequest::default()
            .with_mechanism(StrBytes::from_string(mechanism.to_string()));
        let handshake_resp = self.send_on(connection, handshake).await?;
        if handshake_resp.error_code != 0 {
            return Err(ClientError::AuthRejected(format!(
                "handshake refused: {}; broker offers {:?}",
                broker_error_message(handshake_resp.error_code, None),
                handshake_resp.mechanisms,
            )));
        }

        let sasl = SASLClient::new(config);
        let mechname = Mechname::parse(mechanism.as_bytes())
            .map_err(|err| ClientError::Sasl(err.to_string()))?;
        let mut session = sasl
            .start_suggested([&mechname])
            .map_err(|err| ClientError::Sasl(err.to_string()))?;
        debug!(mechanism, "starting SASL exchange");

        let mut input: Option<Vec<u8>> = None;
        loop {
            let mut output = Vec::new();
            let state = session
                .step(input.as_deref(), &mut output)
                .map_err(|err| ClientError::Sasl(err.to_string()))?;
            let sent = if output.is_empty() {
                false
            } else {
                let authenticate =
                    SaslAuthenticateRequest::default().with_auth_bytes(Bytes::from(output));
                let response = self.send_on(connection, authenticate).await?;
                if response.error_code != 0 {
                    return Err(ClientError::AuthRejected(broker_error_message(
                        response.error_code,
                        response.error_message.as_deref(),
                    )));
                }
                input = Some(response.auth_bytes.to_vec());
                true
            };
            if !state.is_running() {
                break;
            }
            if !sent {
                return Err(ClientError::Sasl(
                    "mechanism stalled without producing output".to_string(),
                ));
            }
        }
        debug!(mechanism, "SASL exchange complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use kafka_protocol::{
        messages::alter_user_scram_credentials_response::{
            AlterUserScramCredentialsResponse, AlterUserScramCredentialsResult,
        },
        protocol::Message,
    };
    use tokio_util::codec::Framed;

    use super::*;
    use crate::{
        config::ENV_BOOTSTRAP_SERVERS,
        scram::{ScramMechanism, SALT_LEN},
    };

    fn loopback_config(addr: std::net::SocketAddr) -> Arc<KafkaSyncConfig> {
        let server = addr.to_string();
        Arc::new(
            KafkaSyncConfig::from_vars(move |name| {
                (name == ENV_BOOTSTRAP_SERVERS).then(|| server.clone())
            })
            .unwrap(),
        )
    }

    /// Fake broker: answer one AlterUserScramCredentials request on `stream`
    /// and return the decoded upsertions.
    async fn serve_alter(
        stream: TcpStream,
        error_code: i16,
    ) -> Vec<ScramCredentialUpsertion> {
        let mut framed = Framed::new(stream, codec());
        let mut frame = framed.next().await.unwrap().unwrap();
        let version = AlterUserScramCredentialsRequest::VERSIONS.max;
        let header = RequestHeader::decode(
            &mut frame,
            AlterUserScramCredentialsRequest::header_version(version),
        )
        .unwrap();
        assert_eq!(header.request_api_key, AlterUserScramCredentialsRequest::KEY);
        let request = AlterUserScramCredentialsRequest::decode(&mut frame, version).unwrap();

        let user = request.upsertions[0].name.clone();
        let response = AlterUserScramCredentialsResponse::default().with_results(vec![
            AlterUserScramCredentialsResult::default()
                .with_user(user)
                .with_error_code(error_code),
        ]);
        let mut buf = BytesMut::new();
        ResponseHeader::default()
            .with_correlation_id(header.correlation_id)
            .encode(
                &mut buf,
                AlterUserScramCredentialsResponse::header_version(version),
            )
            .unwrap();
        response.encode(&mut buf, version).unwrap();
        framed.send(buf.freeze()).await.unwrap();
        request.upsertions
    }

    /// A full upsert round trip over a plaintext loopback broker.
    #[tokio::test]
    async fn alter_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_alter(stream, 0).await
        });

        let client = KafkaAdminClient::new(loopback_config(addr)).unwrap();
        let credentials = vec![
            ScramCredential::generate("pencil", ScramMechanism::Sha256, 4096).unwrap(),
            ScramCredential::generate("pencil", ScramMechanism::Sha512, 4096).unwrap(),
        ];
        client.alter_user_scram("alice", &credentials).await.unwrap();

        let upsertions = broker.await.unwrap();
        assert_eq!(upsertions.len(), 2);
        assert_eq!(&*upsertions[0].name, "alice");
        assert_eq!(upsertions[0].mechanism, 1);
        assert_eq!(upsertions[1].mechanism, 2);
        assert_eq!(upsertions[0].iterations, 4096);
        assert_eq!(upsertions[0].salt.len(), SALT_LEN);
        assert_eq!(upsertions[0].salted_password.len(), 32);
        assert_eq!(upsertions[1].salted_password.len(), 64);
    }

    /// A per-user broker error surfaces as a classified `Broker` failure.
    #[tokio::test]
    async fn alter_broker_error_classified() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_alter(stream, 31).await // CLUSTER_AUTHORIZATION_FAILED
        });

        let client = KafkaAdminClient::new(loopback_config(addr)).unwrap();
        let credentials =
            vec![ScramCredential::generate("pencil", ScramMechanism::Sha256, 4096).unwrap()];
        let err = client
            .alter_user_scram("alice", &credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Broker { code: 31, .. }));
        assert_eq!(err.class(), FailureClass::Auth);
        broker.await.unwrap();
    }

    /// An unreachable bootstrap list fails as transient.
    #[tokio::test]
    async fn unreachable_broker_is_transient() {
        // Reserve a port, then close the listener so connects are refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = KafkaAdminClient::new(loopback_config(addr)).unwrap();
        let credentials =
            vec![ScramCredential::generate("pencil", ScramMechanism::Sha256, 4096).unwrap()];
        let err = client
            .alter_user_scram("alice", &credentials)
            .await
            .unwrap_err();
        assert_eq!(err.class(), FailureClass::Transient);
    }

    /// Error-code classification follows the Kafka error table.
    #[test]
    fn broker_code_classes() {
        assert_eq!(classify_broker_code(7), FailureClass::Transient); // REQUEST_TIMED_OUT
        assert_eq!(classify_broker_code(13), FailureClass::Transient); // NETWORK_EXCEPTION
        assert_eq!(classify_broker_code(31), FailureClass::Auth); // CLUSTER_AUTHORIZATION_FAILED
        assert_eq!(classify_broker_code(58), FailureClass::Auth); // SASL_AUTHENTICATION_FAILED
        assert_eq!(classify_broker_code(9999), FailureClass::Cluster);
    }
}
