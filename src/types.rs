use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One host:port pair to classify.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanTarget {
    pub address: String,
    pub port: u16,
}

impl ScanTarget {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// What a port turned out to be.
///
/// - `NoConn`: no TCP connection, or it failed for network reasons.
/// - `Other`: TCP connected but neither a TLS nor an SSH handshake was recognised.
/// - `Tls` / `Ssh`: the respective handshake layer answered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "SSH")]
    Ssh,
    Other,
    NoConn,
}

impl PortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::Tls => "TLS",
            PortType::Ssh => "SSH",
            PortType::Other => "Other",
            PortType::NoConn => "NoConn",
        }
    }

    /// True for TLS and SSH.
    pub fn is_recognized(&self) -> bool {
        matches!(self, PortType::Tls | PortType::Ssh)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata from a completed TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsDetails {
    pub version: String,
    pub cipher_suite: String,
    /// Negotiated key exchange group, `unknown` when the TLS layer did not report one.
    pub group: String,
    pub cert_key_algorithm: Option<String>,
}

/// Metadata from a completed SSH key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshDetails {
    pub host_key_algorithm: Option<String>,
}

/// Outcome of classifying one port. Built once by the classifier and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(flatten)]
    pub target: ScanTarget,
    pub port_type: PortType,
    #[serde(rename = "isPQKexSupported")]
    pub pq_kex_supported: bool,
    #[serde(rename = "isNonPQKexSupported")]
    pub non_pq_kex_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_suite: Option<String>,
    #[serde(rename = "ecCurve", skip_serializing_if = "Option::is_none")]
    pub curve_name: Option<String>,
    #[serde(rename = "serverCertKeyAlgo", skip_serializing_if = "Option::is_none")]
    pub server_cert_key_algorithm: Option<String>,
    #[serde(rename = "sshHostKeyAlgo", skip_serializing_if = "Option::is_none")]
    pub ssh_host_key_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "testDurationMs", with = "duration_ms")]
    pub test_duration: Duration,
}

impl ScanResult {
    /// A result with no handshake evidence at all (`NoConn` or `Other`).
    pub fn unrecognized(
        target: &ScanTarget,
        port_type: PortType,
        error: impl Into<String>,
        test_duration: Duration,
    ) -> Self {
        Self {
            target: target.clone(),
            port_type,
            pq_kex_supported: false,
            non_pq_kex_supported: false,
            tls_version: None,
            cipher_suite: None,
            curve_name: None,
            server_cert_key_algorithm: None,
            ssh_host_key_algorithm: None,
            error: Some(error.into()),
            test_duration,
        }
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    pub fn port(&self) -> u16 {
        self.target.port
    }
}

/// Aggregate results and counters for one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub host: String,
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub recognized_count: u64,
    pub pq_capable_count: u64,
    pub started_at: String,
    pub finished_at: String,
    #[serde(rename = "elapsedMs", with = "duration_ms")]
    pub elapsed: Duration,
    pub results: Vec<ScanResult>,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
