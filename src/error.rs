//! Error types and the error classifier.
//!
//! Every failed probe is reduced to an [`ErrorClass`]. The classifier uses
//! the class to tell "endpoint unreachable" from "endpoint reachable, no
//! common algorithm" from "endpoint reachable, but not speaking the
//! expected protocol".
use std::fmt;
use std::io;
use std::time::Duration;

use rustls::AlertDescription;

/// Invalid scan parameters. Raised before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port out of range: {0} (expected 1-65535)")]
    PortOutOfRange(u32),

    #[error("invalid port range {start}-{end} (start > end)")]
    InvertedRange { start: u16, end: u16 },

    #[error("invalid port expression {input:?}: {reason}")]
    PortExpression { input: String, reason: String },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Failure of a single capability probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The TCP dial itself failed, so no connection exists.
    #[error("connect {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Dial and handshake together exceeded the probe deadline.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The TLS handshake failed. tokio-rustls reports protocol errors as
    /// `io::Error` wrapping the `rustls::Error`.
    #[error("tls handshake: {0}")]
    Tls(#[source] io::Error),

    #[error("tls config: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("ssh handshake: {0}")]
    Ssh(#[from] russh::Error),

    #[error("no key exchange algorithms to offer")]
    EmptyKexSet,

    #[error("panic: {0}")]
    Panicked(String),

    #[error("task cancelled: {0}")]
    Cancelled(String),
}

/// What a probe failure says about the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NetworkError,
    ProtocolNegotiationFailure,
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::NetworkError => f.write_str("network error"),
            ErrorClass::ProtocolNegotiationFailure => f.write_str("negotiation failure"),
            ErrorClass::Other => f.write_str("other"),
        }
    }
}

/// Map a probe error onto its class.
///
/// Priority: deadline, OS-level connection errors, handshake-layer
/// "no common algorithm" errors, everything else.
pub fn classify_error(err: &ProbeError) -> ErrorClass {
    match err {
        ProbeError::Timeout(_) => ErrorClass::NetworkError,
        ProbeError::Connect { .. } => ErrorClass::NetworkError,
        ProbeError::Tls(io) => classify_tls_io(io),
        ProbeError::Ssh(e) => classify_ssh(e),
        ProbeError::TlsConfig(_)
        | ProbeError::EmptyKexSet
        | ProbeError::Panicked(_)
        | ProbeError::Cancelled(_) => ErrorClass::Other,
    }
}

/// OS-level connection failures, whichever phase raised them.
pub fn is_network_io_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

fn classify_tls_io(err: &io::Error) -> ErrorClass {
    if is_network_io_error(err) {
        return ErrorClass::NetworkError;
    }
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        Some(tls) => classify_tls(tls),
        None => ErrorClass::Other,
    }
}

fn classify_tls(err: &rustls::Error) -> ErrorClass {
    match err {
        rustls::Error::PeerIncompatible(_) => ErrorClass::ProtocolNegotiationFailure,
        rustls::Error::AlertReceived(
            AlertDescription::HandshakeFailure
            | AlertDescription::InsufficientSecurity
            | AlertDescription::ProtocolVersion,
        ) => ErrorClass::ProtocolNegotiationFailure,
        _ => ErrorClass::Other,
    }
}

fn classify_ssh(err: &russh::Error) -> ErrorClass {
    match err {
        russh::Error::NoCommonAlgo { .. } => ErrorClass::ProtocolNegotiationFailure,
        russh::Error::IO(io) if is_network_io_error(io) => ErrorClass::NetworkError,
        _ => ErrorClass::Other,
    }
}
