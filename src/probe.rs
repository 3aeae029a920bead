//! Capability probe: one TCP connection, one handshake, one class of key
//! exchange algorithms.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::{classify_error, ProbeError};
use crate::kex::{self, KexClass};
use crate::types::{PortType, ScanTarget, SshDetails, TlsDetails};
use crate::{ssh, tls};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tls,
    Ssh,
}

impl Protocol {
    pub fn port_type(self) -> PortType {
        match self {
            Protocol::Tls => PortType::Tls,
            Protocol::Ssh => PortType::Ssh,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.port_type().as_str())
    }
}

/// Metadata of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Tls(TlsDetails),
    Ssh(SshDetails),
}

impl Handshake {
    pub fn protocol(&self) -> Protocol {
        match self {
            Handshake::Tls(_) => Protocol::Tls,
            Handshake::Ssh(_) => Protocol::Ssh,
        }
    }
}

/// Result of one probe. The connection is already closed when this exists.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub protocol: Protocol,
    pub kex: KexClass,
    pub elapsed: Duration,
    pub result: Result<Handshake, ProbeError>,
}

/// Runs capability probes. The scanner and classifier only see this seam.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(
        &self,
        target: &ScanTarget,
        protocol: Protocol,
        kex: KexClass,
        timeout: Duration,
    ) -> ProbeOutcome;
}

/// Probes real endpoints over TCP with rustls and russh.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(
        &self,
        target: &ScanTarget,
        protocol: Protocol,
        kex: KexClass,
        timeout: Duration,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let deadline = started + timeout;
        let result = match protocol {
            Protocol::Tls => tls::handshake(target, &kex::tls_groups(kex), deadline, timeout)
                .await
                .map(Handshake::Tls),
            Protocol::Ssh => ssh::handshake(target, &kex::ssh_kex(kex), deadline, timeout)
                .await
                .map(Handshake::Ssh),
        };
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => debug!(target = %target, %protocol, %kex, ?elapsed, "probe succeeded"),
            Err(e) => debug!(
                target = %target,
                %protocol,
                %kex,
                ?elapsed,
                class = %classify_error(e),
                error = %e,
                "probe failed"
            ),
        }
        ProbeOutcome {
            protocol,
            kex,
            elapsed,
            result,
        }
    }
}

/// TCP dial bounded by the probe deadline.
pub(crate) async fn dial(
    target: &ScanTarget,
    deadline: Instant,
    timeout: Duration,
) -> Result<TcpStream, ProbeError> {
    time::timeout_at(
        deadline,
        TcpStream::connect((target.address.as_str(), target.port)),
    )
    .await
    .map_err(|_| ProbeError::Timeout(timeout))?
    .map_err(|source| ProbeError::Connect {
        target: target.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn closed_port_fails_as_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ScanTarget::new("127.0.0.1", port);
        let outcome = NetworkProber
            .probe(&target, Protocol::Tls, KexClass::Classical, Duration::from_secs(2))
            .await;
        let err = outcome.result.unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }), "{err:?}");
        assert_eq!(classify_error(&err), ErrorClass::NetworkError);
    }

    #[tokio::test]
    async fn silent_listener_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = ScanTarget::new("127.0.0.1", port);
        let timeout = Duration::from_millis(200);

        let outcome = NetworkProber
            .probe(&target, Protocol::Tls, KexClass::Classical, timeout)
            .await;
        let err = outcome.result.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)), "{err:?}");
        assert!(outcome.elapsed < timeout + Duration::from_millis(500));
        drop(listener);
    }
}
