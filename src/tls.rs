//! TLS capability probe built on rustls.
//!
//! Certificate trust is never checked: the handshake only has to prove that
//! the server agreed on a key exchange group from the offered list. The
//! handshake signature itself is still verified against the leaf key.
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, CryptoProvider, SupportedKxGroup, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, SignatureScheme};
use tokio::time::{self, Instant};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::ProbeError;
use crate::kex;
use crate::probe::dial;
use crate::types::{ScanTarget, TlsDetails};

#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
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
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Client config offering exactly `groups`.
///
/// Post-quantum groups are TLS 1.3 only, so a config without any classical
/// group does not enable TLS 1.2.
pub fn client_config(groups: &[&'static dyn SupportedKxGroup]) -> Result<ClientConfig, ProbeError> {
    if groups.is_empty() {
        return Err(ProbeError::EmptyKexSet);
    }
    let base = aws_lc_rs::default_provider();
    let algorithms = base.signature_verification_algorithms;
    let provider = CryptoProvider {
        kx_groups: groups.to_vec(),
        ..base
    };
    let tls12_usable = groups
        .iter()
        .any(|g| g.usable_for_version(ProtocolVersion::TLSv1_2));
    let versions: &[&'static rustls::SupportedProtocolVersion] = if tls12_usable {
        &[&rustls::version::TLS13, &rustls::version::TLS12]
    } else {
        &[&rustls::version::TLS13]
    };

    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(versions)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { algorithms }))
        .with_no_client_auth();
    Ok(config)
}

/// One TCP connection and one TLS handshake offering only `groups`.
pub async fn handshake(
    target: &ScanTarget,
    groups: &[&'static dyn SupportedKxGroup],
    deadline: Instant,
    timeout: Duration,
) -> Result<TlsDetails, ProbeError> {
    let config = client_config(groups)?;
    let tcp = dial(target, deadline, timeout).await?;

    let server_name = match ServerName::try_from(target.address.clone()) {
        Ok(name) => name,
        Err(_) => {
            let peer = tcp.peer_addr().map_err(ProbeError::Tls)?;
            ServerName::IpAddress(peer.ip().into())
        }
    };

    let connector = TlsConnector::from(Arc::new(config));
    let stream = time::timeout_at(deadline, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(ProbeError::Tls)?;

    let (_, conn) = stream.get_ref();
    if conn.is_handshaking() {
        return Err(ProbeError::Tls(io::Error::other("tls handshake did not complete")));
    }

    let details = TlsDetails {
        version: conn
            .protocol_version()
            .map(version_name)
            .unwrap_or_else(|| "unknown".to_string()),
        cipher_suite: conn
            .negotiated_cipher_suite()
            .map(|s| format!("{:?}", s.suite()))
            .unwrap_or_else(|| "unknown".to_string()),
        group: conn
            .negotiated_key_exchange_group()
            .map(|g| kex::tls_group_name(g.name()))
            .unwrap_or_else(|| "unknown".to_string()),
        cert_key_algorithm: conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|leaf| cert_key_algorithm(leaf.as_ref())),
    };
    debug!(target = %target, version = %details.version, group = %details.group, "tls handshake complete");
    Ok(details)
}

fn version_name(v: ProtocolVersion) -> String {
    match v {
        ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
        other => format!("{other:?}"),
    }
}

/// Public key algorithm of a DER certificate, named the way certificate
/// tooling prints it; unknown algorithms fall back to their OID.
pub fn cert_key_algorithm(der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    let oid = cert.public_key().algorithm.algorithm.to_id_string();
    let name = match oid.as_str() {
        "1.2.840.113549.1.1.1" | "1.2.840.113549.1.1.10" => "RSA",
        "1.2.840.10045.2.1" => "ECDSA",
        "1.2.840.10040.4.1" => "DSA",
        "1.3.101.112" => "Ed25519",
        "1.3.101.113" => "Ed448",
        "2.16.840.1.101.3.4.3.17" => "ML-DSA-44",
        "2.16.840.1.101.3.4.3.18" => "ML-DSA-65",
        "2.16.840.1.101.3.4.3.19" => "ML-DSA-87",
        _ => return Some(oid),
    };
    Some(name.to_string())
}
