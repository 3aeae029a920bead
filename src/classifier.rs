//! Protocol classifier: decides what a port is and which key exchange
//! classes it accepts.
//!
//! Two rounds of probing per port. The classical round runs first and
//! decides reachability and, in most cases, the protocol. The post-quantum
//! round then runs against the protocol the first round found. Classical
//! and post-quantum algorithms are never offered in the same handshake.
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::error::{classify_error, ErrorClass, ProbeError};
use crate::kex::KexClass;
use crate::probe::{Handshake, Prober, Protocol};
use crate::types::{PortType, ScanResult, ScanTarget};

/// Which handshakes the classifier tries on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProtocolHint {
    /// TLS first, SSH when the port does not answer TLS.
    #[default]
    Auto,
    Tls,
    Ssh,
}

impl ProtocolHint {
    /// First protocol to try, and the fallback when it is not recognised.
    fn candidates(self) -> (Protocol, Option<Protocol>) {
        match self {
            ProtocolHint::Auto => (Protocol::Tls, Some(Protocol::Ssh)),
            ProtocolHint::Tls => (Protocol::Tls, None),
            ProtocolHint::Ssh => (Protocol::Ssh, None),
        }
    }
}

impl From<Protocol> for ProtocolHint {
    fn from(p: Protocol) -> Self {
        match p {
            Protocol::Tls => ProtocolHint::Tls,
            Protocol::Ssh => ProtocolHint::Ssh,
        }
    }
}

impl fmt::Display for ProtocolHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolHint::Auto => f.write_str("auto"),
            ProtocolHint::Tls => f.write_str("tls"),
            ProtocolHint::Ssh => f.write_str("ssh"),
        }
    }
}

/// What one round of probing learned about the endpoint.
#[derive(Debug)]
enum Discovery {
    /// A handshake completed.
    Completed(Handshake),
    /// The protocol answered but shares no algorithm from the offered class.
    Rejected { protocol: Protocol, error: String },
    /// The first probe could not reach the endpoint.
    Unreachable(String),
    /// Reachable, but no candidate protocol was recognised.
    Unrecognized(String),
}

impl Discovery {
    fn handshake(&self) -> Option<&Handshake> {
        match self {
            Discovery::Completed(hs) => Some(hs),
            _ => None,
        }
    }

    fn completed_protocol(&self) -> Option<Protocol> {
        self.handshake().map(Handshake::protocol)
    }

    fn rejected_protocol(&self) -> Option<Protocol> {
        match self {
            Discovery::Rejected { protocol, .. } => Some(*protocol),
            _ => None,
        }
    }

    /// Protocol this round has evidence for, completed or rejected.
    fn protocol(&self) -> Option<Protocol> {
        self.completed_protocol().or_else(|| self.rejected_protocol())
    }

    fn error(&self) -> Option<&str> {
        match self {
            Discovery::Completed(_) => None,
            Discovery::Rejected { error, .. }
            | Discovery::Unreachable(error)
            | Discovery::Unrecognized(error) => Some(error),
        }
    }
}

fn describe(protocol: Protocol, err: &ProbeError) -> String {
    format!("{protocol}: {err}")
}

/// Run one round of probes with a single key exchange class.
///
/// A network error on the first candidate means the endpoint is
/// unreachable. On a fallback candidate it only means that protocol is not
/// spoken there: the first probe already reached the endpoint.
async fn discover<P: Prober + ?Sized>(
    prober: &P,
    target: &ScanTarget,
    hint: ProtocolHint,
    kex: KexClass,
    timeout: Duration,
) -> Discovery {
    let (primary, fallback) = hint.candidates();

    let first = prober.probe(target, primary, kex, timeout).await;
    let first_err = match first.result {
        Ok(hs) => return Discovery::Completed(hs),
        Err(e) => e,
    };
    match classify_error(&first_err) {
        ErrorClass::NetworkError => {
            return Discovery::Unreachable(describe(primary, &first_err));
        }
        ErrorClass::ProtocolNegotiationFailure => {
            return Discovery::Rejected {
                protocol: primary,
                error: describe(primary, &first_err),
            };
        }
        ErrorClass::Other => {}
    }

    let Some(fallback) = fallback else {
        return Discovery::Unrecognized(describe(primary, &first_err));
    };
    let second = prober.probe(target, fallback, kex, timeout).await;
    match second.result {
        Ok(hs) => Discovery::Completed(hs),
        Err(e) if classify_error(&e) == ErrorClass::ProtocolNegotiationFailure => {
            Discovery::Rejected {
                protocol: fallback,
                error: describe(fallback, &e),
            }
        }
        Err(e) => Discovery::Unrecognized(format!(
            "{}; {}",
            describe(primary, &first_err),
            describe(fallback, &e)
        )),
    }
}

/// Classify one port: protocol type plus post-quantum and classical key
/// exchange support.
///
/// Never fails. Every probe error ends up in the returned result, and
/// `test_duration` covers both rounds.
pub async fn classify_port<P: Prober + ?Sized>(
    prober: &P,
    target: &ScanTarget,
    hint: ProtocolHint,
    timeout: Duration,
) -> ScanResult {
    let started = Instant::now();

    let classical = discover(prober, target, hint, KexClass::Classical, timeout).await;
    if let Discovery::Unreachable(error) = &classical {
        return ScanResult::unrecognized(target, PortType::NoConn, error.as_str(), started.elapsed());
    }

    let pq_hint = classical.protocol().map(ProtocolHint::from).unwrap_or(hint);
    let post_quantum = discover(prober, target, pq_hint, KexClass::PostQuantum, timeout).await;

    let result = verdict(target, &classical, &post_quantum, started.elapsed());
    if result.port_type.is_recognized() {
        info!(
            target = %target,
            port_type = %result.port_type,
            pq = result.pq_kex_supported,
            non_pq = result.non_pq_kex_supported,
            "port recognized"
        );
    }
    result
}

/// Combine both rounds into one result.
///
/// The protocol is the one a handshake completed for, classical round
/// first. Without any completed handshake, a negotiation failure still
/// identifies the protocol and the port is reported with both capabilities
/// false. Detail fields come from the classical handshake when there is one.
fn verdict(
    target: &ScanTarget,
    classical: &Discovery,
    post_quantum: &Discovery,
    elapsed: Duration,
) -> ScanResult {
    let protocol = classical
        .completed_protocol()
        .or_else(|| post_quantum.completed_protocol())
        .or_else(|| classical.rejected_protocol())
        .or_else(|| post_quantum.rejected_protocol());

    let Some(protocol) = protocol else {
        let error = classical.error().unwrap_or("no handshake completed");
        return ScanResult::unrecognized(target, PortType::Other, error, elapsed);
    };

    let non_pq = classical.handshake().filter(|hs| hs.protocol() == protocol);
    let pq = post_quantum.handshake().filter(|hs| hs.protocol() == protocol);

    let mut result = ScanResult {
        target: target.clone(),
        port_type: protocol.port_type(),
        pq_kex_supported: pq.is_some(),
        non_pq_kex_supported: non_pq.is_some(),
        tls_version: None,
        cipher_suite: None,
        curve_name: None,
        server_cert_key_algorithm: None,
        ssh_host_key_algorithm: None,
        error: None,
        test_duration: elapsed,
    };
    match non_pq.or(pq) {
        Some(Handshake::Tls(d)) => {
            result.tls_version = Some(d.version.clone());
            result.cipher_suite = Some(d.cipher_suite.clone());
            result.curve_name = Some(d.group.clone());
            result.server_cert_key_algorithm = d.cert_key_algorithm.clone();
        }
        Some(Handshake::Ssh(d)) => {
            result.ssh_host_key_algorithm = d.host_key_algorithm.clone();
        }
        None => result.error = classical.error().map(str::to_string),
    }
    result
}
