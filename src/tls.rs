//! TLS material handling
//!
//! Builds the mutual-TLS client configuration a device presents to its
//! broker, and the server configuration the gateway itself terminates
//! HTTPS with.
//!
//! The client side trusts only the configured CA pool. Native roots are
//! never loaded and there is no way to skip server verification.

use crate::error::DeviceError;
use color_eyre::{eyre::eyre, Result};
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, SignatureVerificationAlgorithm};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SignatureScheme};
use webpki::EndEntityCert;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the client configuration for a broker connection.
///
/// `ca_path` names a PEM file with one or more CA certificates. `key_pem`
/// and `cert_pem` are the device's private key and certificate chain as
/// supplied in the connect request.
///
/// # Errors
///
/// - [`DeviceError::CaCertLoad`] if the CA file cannot be read or holds no
///   certificate rustls accepts
/// - [`DeviceError::TlsConfig`] if the key or certificate cannot be parsed,
///   the key does not belong to the leaf certificate, or rustls rejects
///   the pair
pub async fn build_tls_config(
    ca_path: impl AsRef<Path>,
    key_pem: &str,
    cert_pem: &str,
) -> Result<Arc<ClientConfig>, DeviceError> {
    let root_store = load_ca_pool(ca_path.as_ref()).await?;

    let certs = parse_cert_chain(cert_pem).ok_or(DeviceError::TlsConfig)?;
    let key = parse_private_key(key_pem).ok_or(DeviceError::TlsConfig)?;
    if !key_matches_certificate(&key, &certs[0]) {
        warn!("Client key does not belong to the client certificate");
        return Err(DeviceError::TlsConfig);
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_client_auth_cert(certs, key)
        .map_err(|e| {
            warn!("Client key pair rejected: {}", e);
            DeviceError::TlsConfig
        })?;

    Ok(Arc::new(config))
}

async fn load_ca_pool(ca_path: &Path) -> Result<RootCertStore, DeviceError> {
    let pem = tokio::fs::read(ca_path).await.map_err(|e| {
        warn!(path = %ca_path.display(), "Failed to read CA certificate: {}", e);
        DeviceError::CaCertLoad
    })?;

    let mut root_store = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &pem[..]) {
        let cert = cert.map_err(|_| DeviceError::CaCertLoad)?;
        root_store.add(cert).map_err(|e| {
            warn!(path = %ca_path.display(), "CA certificate rejected: {}", e);
            DeviceError::CaCertLoad
        })?;
    }

    if root_store.is_empty() {
        warn!(path = %ca_path.display(), "CA file holds no certificate");
        return Err(DeviceError::CaCertLoad);
    }

    debug!(count = root_store.len(), "Loaded CA pool");
    Ok(root_store)
}

/// Parses every certificate in `pem`. `None` if there is none or any block
/// is malformed.
fn parse_cert_chain(pem: &str) -> Option<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;
    (!certs.is_empty()).then_some(certs)
}

/// Parses the first PKCS#8, PKCS#1 or SEC1 key in `pem`.
fn parse_private_key(pem: &str) -> Option<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem.as_bytes()).ok().flatten()
}

/// Signed by the client key and verified against the leaf certificate
const KEY_PAIR_CHALLENGE: &[u8] = b"device-virtual key pair check";

/// Schemes offered to the client key, one per key type rustls can load
const CHALLENGE_SCHEMES: [SignatureScheme; 4] = [
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ED25519,
    SignatureScheme::RSA_PSS_SHA256,
];

/// True if `key` is the private half of the public key in `leaf`.
///
/// rustls accepts any parseable key next to any certificate, so the pair is
/// checked by signing [`KEY_PAIR_CHALLENGE`] and verifying the signature
/// with the certificate's public key.
fn key_matches_certificate(key: &PrivateKeyDer<'_>, leaf: &CertificateDer<'_>) -> bool {
    let Ok(signing_key) = any_supported_type(key) else {
        return false;
    };
    let Some(signer) = signing_key.choose_scheme(&CHALLENGE_SCHEMES) else {
        return false;
    };
    let algorithm: &dyn SignatureVerificationAlgorithm = match signer.scheme() {
        SignatureScheme::ECDSA_NISTP256_SHA256 => webpki::ring::ECDSA_P256_SHA256,
        SignatureScheme::ECDSA_NISTP384_SHA384 => webpki::ring::ECDSA_P384_SHA384,
        SignatureScheme::ED25519 => webpki::ring::ED25519,
        SignatureScheme::RSA_PSS_SHA256 => webpki::ring::RSA_PSS_2048_8192_SHA256_LEGACY_KEY,
        _ => return false,
    };
    let Ok(signature) = signer.sign(KEY_PAIR_CHALLENGE) else {
        return false;
    };
    let Ok(certificate) = EndEntityCert::try_from(leaf) else {
        return false;
    };
    certificate
        .verify_signature(algorithm, KEY_PAIR_CHALLENGE, &signature)
        .is_ok()
}

/// Loads the certificate and key the gateway serves HTTPS with.
pub async fn load_server_tls(
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>> {
    let cert_file = cert_file.as_ref();
    let key_file = key_file.as_ref();

    let cert_pem = tokio::fs::read_to_string(cert_file)
        .await
        .map_err(|e| eyre!("Failed to read {}: {}", cert_file.display(), e))?;
    let key_pem = tokio::fs::read_to_string(key_file)
        .await
        .map_err(|e| eyre!("Failed to read {}: {}", key_file.display(), e))?;

    let certs = parse_cert_chain(&cert_pem)
        .ok_or_else(|| eyre!("No certificate found in {}", cert_file.display()))?;
    let key = parse_private_key(&key_pem)
        .ok_or_else(|| eyre!("No private key found in {}", key_file.display()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| eyre!("Invalid server certificate: {}", e))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CA_CRT: &str = include_str!("../tests/testdata/ca.crt");
    const VALID_CRT: &str = include_str!("../tests/testdata/valid.crt");
    const VALID_KEY: &str = include_str!("../tests/testdata/valid.key");
    const OTHER_KEY: &str = include_str!("../tests/testdata/other.key");

    fn pem_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn builds_config_from_valid_material() {
        let ca = pem_file(CA_CRT);
        let config = build_tls_config(ca.path(), VALID_KEY, VALID_CRT).await;
        assert!(config.is_ok());
    }

    #[tokio::test]
    async fn missing_ca_file() {
        let result = build_tls_config("/nonexistent/ca.crt", VALID_KEY, VALID_CRT).await;
        assert_eq!(result.unwrap_err(), DeviceError::CaCertLoad);
    }

    #[tokio::test]
    async fn ca_file_without_certificate() {
        let ca = pem_file("not a certificate\n");
        let result = build_tls_config(ca.path(), VALID_KEY, VALID_CRT).await;
        assert_eq!(result.unwrap_err(), DeviceError::CaCertLoad);
    }

    #[tokio::test]
    async fn invalid_key() {
        let ca = pem_file(CA_CRT);
        let result = build_tls_config(ca.path(), "thisIsNotAKey", VALID_CRT).await;
        assert_eq!(result.unwrap_err(), DeviceError::TlsConfig);
    }

    #[tokio::test]
    async fn invalid_certificate() {
        let ca = pem_file(CA_CRT);
        let result = build_tls_config(ca.path(), VALID_KEY, "thisIsNotACert").await;
        assert_eq!(result.unwrap_err(), DeviceError::TlsConfig);
    }

    #[tokio::test]
    async fn key_and_certificate_swapped() {
        let ca = pem_file(CA_CRT);
        let result = build_tls_config(ca.path(), VALID_CRT, VALID_KEY).await;
        assert_eq!(result.unwrap_err(), DeviceError::TlsConfig);
    }

    #[tokio::test]
    async fn mismatched_key_pair() {
        let ca = pem_file(CA_CRT);
        let result = build_tls_config(ca.path(), OTHER_KEY, VALID_CRT).await;
        assert_eq!(result.unwrap_err(), DeviceError::TlsConfig);
    }

    #[test]
    fn key_pair_check() {
        let cert = parse_cert_chain(VALID_CRT).unwrap().remove(0);
        let own = parse_private_key(VALID_KEY).unwrap();
        let other = parse_private_key(OTHER_KEY).unwrap();
        assert!(key_matches_certificate(&own, &cert));
        assert!(!key_matches_certificate(&other, &cert));
    }

    #[tokio::test]
    async fn loads_server_certificate() {
        let cert = pem_file(VALID_CRT);
        let key = pem_file(VALID_KEY);
        let config = load_server_tls(cert.path(), key.path()).await.unwrap();
        assert_eq!(config.alpn_protocols.len(), 2);
    }
}
