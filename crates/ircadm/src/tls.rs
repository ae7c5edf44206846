//! TLS connector construction for the administrative session.
//!
//! Self-hosted ircds almost always run on self-signed certificates, so
//! certificate verification is opt-in via `--verify-tls`. The verified path
//! trusts the platform certificate store.

use std::sync::Arc;

use tokio_rustls::TlsConnector;

use crate::errors::AdmError;

/// Build the connector used for the session transport.
pub fn connector(verify: bool) -> Result<TlsConnector, AdmError> {
    let config = if verify {
        verified_config()?
    } else {
        danger::skip_verification_config()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

fn verified_config() -> Result<rustls::ClientConfig, AdmError> {
    let mut roots = rustls::RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| AdmError::Tls(format!("load platform trust anchors: {}", e)))?;
    for cert in certs {
        // Tolerate the odd unparsable platform certificate.
        let _ = roots.add(cert);
    }
    if roots.is_empty() {
        return Err(AdmError::Tls("platform trust store is empty".to_string()));
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Certificate verification bypass for the default self-signed deployment.
pub mod danger {
    use std::sync::Arc;

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    /// Accepts any server certificate while still checking handshake
    /// signatures, so the wire is encrypted but the peer is unauthenticated.
    #[derive(Debug)]
    struct SkipServerVerification {
        provider: Arc<CryptoProvider>,
    }

    impl SkipServerVerification {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
            })
        }
    }

    impl ServerCertVerifier for SkipServerVerification {
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
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }

    /// Client config that performs no certificate verification.
    pub fn skip_verification_config() -> rustls::ClientConfig {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(SkipServerVerification::new())
            .with_no_client_auth()
    }
}
