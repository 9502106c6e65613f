//! Transport trust material for the admin connection.
//!
//! Trust- and key-stores are accepted as PEM bundles or PKCS#12 archives,
//! matching what Kafka deployments ship today. JKS stores are refused with a
//! pointer to `keytool`, which converts them losslessly:
//! `keytool -importkeystore -srckeystore kafka.jks -destkeystore kafka.p12
//! -deststoretype pkcs12`.

use std::{fs, path::Path, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use tracing::warn;

use super::ClientError;
use crate::config::{Secret, SslConfig, ENV_SSL_ENDPOINT_IDENTIFICATION};

/// Ensure a process-wide rustls crypto provider is installed.
///
/// It is ok for `install_default()` to fail if a provider is already
/// installed.
fn ensure_default_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the rustls client configuration for the configured stores and
/// verification policy.
pub(super) fn client_config(ssl: &SslConfig) -> Result<ClientConfig, ClientError> {
    ensure_default_crypto_provider();

    let builder = if ssl.endpoint_identification {
        let mut roots = RootCertStore::empty();
        match &ssl.truststore_location {
            Some(path) => {
                for cert in load_certificates(path, ssl.truststore_password.as_ref())? {
                    roots.add(cert).map_err(|err| ClientError::InvalidStore {
                        path: path.display().to_string(),
                        reason: err.to_string(),
                    })?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        ClientConfig::builder().with_root_certificates(roots)
    } else {
        warn!(
            "server certificate verification is disabled; set {} to https to enable it",
            ENV_SSL_ENDPOINT_IDENTIFICATION
        );
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
    };

    match &ssl.keystore_location {
        None => Ok(builder.with_no_client_auth()),
        Some(path) => {
            let password = ssl
                .key_password
                .as_ref()
                .or(ssl.keystore_password.as_ref());
            let (chain, key) = load_identity(path, password)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|err| ClientError::Tls(err.to_string()))
        }
    }
}

/// Read CA certificates from a PEM bundle or PKCS#12 trust store.
fn load_certificates(
    path: &Path,
    password: Option<&Secret>,
) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let invalid = |reason: String| ClientError::InvalidStore {
        path: path.display().to_string(),
        reason,
    };
    reject_jks(path)?;
    let raw = fs::read(path).map_err(|err| invalid(err.to_string()))?;
    if is_pkcs12(path) {
        let parsed = parse_pkcs12(&raw, password, path)?;
        let mut certs = Vec::new();
        if let Some(cert) = parsed.cert {
            certs.push(CertificateDer::from(
                cert.to_der().map_err(|err| invalid(err.to_string()))?,
            ));
        }
        for cert in parsed.ca.into_iter().flatten() {
            certs.push(CertificateDer::from(
                cert.to_der().map_err(|err| invalid(err.to_string()))?,
            ));
        }
        if certs.is_empty() {
            return Err(invalid("no certificates in store".to_string()));
        }
        return Ok(certs);
    }
    let certs = rustls_pemfile::certs(&mut raw.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(err.to_string()))?;
    if certs.is_empty() {
        return Err(invalid("no certificates in PEM bundle".to_string()));
    }
    Ok(certs)
}

/// Read the client certificate chain and private key from a PEM pair or a
/// PKCS#12 key store.
fn load_identity(
    path: &Path,
    password: Option<&Secret>,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ClientError> {
    let invalid = |reason: String| ClientError::InvalidStore {
        path: path.display().to_string(),
        reason,
    };
    reject_jks(path)?;
    let raw = fs::read(path).map_err(|err| invalid(err.to_string()))?;
    if is_pkcs12(path) {
        let parsed = parse_pkcs12(&raw, password, path)?;
        let mut chain = Vec::new();
        if let Some(cert) = parsed.cert {
            chain.push(CertificateDer::from(
                cert.to_der().map_err(|err| invalid(err.to_string()))?,
            ));
        }
        for cert in parsed.ca.into_iter().flatten() {
            chain.push(CertificateDer::from(
                cert.to_der().map_err(|err| invalid(err.to_string()))?,
            ));
        }
        let pkey = parsed
            .pkey
            .ok_or_else(|| invalid("no private key in store".to_string()))?;
        let pem = pkey
            .private_key_to_pem_pkcs8()
            .map_err(|err| invalid(err.to_string()))?;
        let key = rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|err| invalid(err.to_string()))?
            .ok_or_else(|| invalid("unreadable private key".to_string()))?;
        if chain.is_empty() {
            return Err(invalid("no certificate chain in store".to_string()));
        }
        return Ok((chain, key));
    }
    let chain = rustls_pemfile::certs(&mut raw.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(err.to_string()))?;
    if chain.is_empty() {
        return Err(invalid("no certificate chain in PEM file".to_string()));
    }
    let key = rustls_pemfile::private_key(&mut raw.as_slice())
        .map_err(|err| invalid(err.to_string()))?
        .ok_or_else(|| invalid("no private key in PEM file; PKCS#8 expected".to_string()))?;
    Ok((chain, key))
}

/// Parse a PKCS#12 archive with the configured passphrase.
fn parse_pkcs12(
    raw: &[u8],
    password: Option<&Secret>,
    path: &Path,
) -> Result<openssl::pkcs12::ParsedPkcs12_2, ClientError> {
    openssl::pkcs12::Pkcs12::from_der(raw)
        .and_then(|store| store.parse2(password.map(Secret::expose).unwrap_or_default()))
        .map_err(|err| ClientError::InvalidStore {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
}

/// Whether a path smells like a PKCS#12 archive.
fn is_pkcs12(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("p12") || ext.eq_ignore_ascii_case("pfx")
    )
}

/// JKS cannot be read natively; tell the operator how to convert it.
fn reject_jks(path: &Path) -> Result<(), ClientError> {
    let jks = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("jks") || ext.eq_ignore_ascii_case("jceks")
    );
    if jks {
        return Err(ClientError::InvalidStore {
            path: path.display().to_string(),
            reason: "JKS stores are not supported; convert to PKCS#12 with keytool".to_string(),
        });
    }
    Ok(())
}

/// Verifier used when endpoint identification is disabled: accepts any
/// presented chain while still constraining signature schemes to the
/// installed provider's.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// JKS stores are refused with conversion guidance.
    #[test]
    fn jks_is_rejected() {
        let err = load_certificates(Path::new("/etc/kafka/trust.jks"), None).unwrap_err();
        match err {
            ClientError::InvalidStore { reason, .. } => assert!(reason.contains("keytool")),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Store-type sniffing keys off the file extension.
    #[test]
    fn store_type_sniffing() {
        assert!(is_pkcs12(Path::new("client.p12")));
        assert!(is_pkcs12(Path::new("client.PFX")));
        assert!(!is_pkcs12(Path::new("bundle.pem")));
        assert!(reject_jks(Path::new("trust.jceks")).is_err());
        assert!(reject_jks(Path::new("bundle.pem")).is_ok());
    }

    /// A plaintext-verification config builds without any store on disk.
    #[test]
    fn permissive_config_builds() {
        let cfg = client_config(&SslConfig::default()).unwrap();
        drop(cfg);
    }
}
