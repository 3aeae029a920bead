//! Library crate for pqc-scan-rs: post-quantum / classical key exchange probing of TLS and SSH ports.
pub mod classifier;
pub mod config;
pub mod error;
pub mod kex;
pub mod logging;
pub mod output;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod ssh;
pub mod tls;
pub mod types;

pub use classifier::{classify_port, ProtocolHint};
pub use config::{PortSet, ScanConfig};
pub use error::{classify_error, ConfigError, ErrorClass, ProbeError};
pub use scanner::{scan, scan_ports, scan_ports_with_cancel};
pub use types::{PortType, ScanReport, ScanResult, ScanTarget};
