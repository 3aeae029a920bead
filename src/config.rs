//! Scan parameters and their validation.
use std::time::Duration;

use crate::classifier::ProtocolHint;
use crate::error::ConfigError;
use crate::ports::parse_ports_str;
use crate::types::ScanTarget;

/// Upper bound on simultaneous port classifications. Larger requests are clamped.
pub const MAX_CONCURRENCY: usize = 5_000;

/// A non-empty, sorted, duplicate-free set of ports in 1..=65535.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSet {
    ports: Vec<u16>,
}

impl PortSet {
    /// Every port in `start..=end`.
    pub fn range(start: u16, end: u16) -> Result<Self, ConfigError> {
        if start == 0 {
            return Err(ConfigError::PortOutOfRange(0));
        }
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }
        Ok(Self {
            ports: (start..=end).collect(),
        })
    }

    pub fn from_ports(ports: impl IntoIterator<Item = u16>) -> Result<Self, ConfigError> {
        let mut ports: Vec<u16> = ports.into_iter().collect();
        if ports.contains(&0) {
            return Err(ConfigError::PortOutOfRange(0));
        }
        ports.sort_unstable();
        ports.dedup();
        if ports.is_empty() {
            return Err(ConfigError::PortExpression {
                input: String::new(),
                reason: "no ports given".to_string(),
            });
        }
        Ok(Self { ports })
    }

    /// Parse a port expression such as `22,443,8000-8010`.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        Self::from_ports(parse_ports_str(expr)?)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }
}

/// Everything one scan needs.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub host: String,
    pub ports: PortSet,
    /// Per-probe deadline covering dial and handshake.
    pub timeout: Duration,
    pub concurrency: usize,
    pub protocol: ProtocolHint,
}

impl ScanConfig {
    /// Validated config probing TLS then SSH. Concurrency is clamped to [`MAX_CONCURRENCY`].
    pub fn new(
        host: impl Into<String>,
        ports: PortSet,
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            host: host.into().trim().to_string(),
            ports,
            timeout,
            concurrency,
            protocol: ProtocolHint::Auto,
        };
        config.validate()?;
        config.concurrency = config.concurrency.min(MAX_CONCURRENCY);
        Ok(config)
    }

    pub fn with_protocol(mut self, protocol: ProtocolHint) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.ports.is_empty() {
            return Err(ConfigError::PortExpression {
                input: String::new(),
                reason: "no ports given".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// One target per port, in ascending port order.
    pub fn targets(&self) -> impl Iterator<Item = ScanTarget> + '_ {
        self.ports
            .iter()
            .map(move |port| ScanTarget::new(self.host.clone(), port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn range_bounds() {
        assert_eq!(PortSet::range(1000, 1003).unwrap().len(), 4);
        assert_eq!(PortSet::range(22, 22).unwrap().iter().collect::<Vec<_>>(), vec![22]);
        assert_eq!(PortSet::range(65535, 65535).unwrap().len(), 1);
        assert_eq!(PortSet::range(0, 10), Err(ConfigError::PortOutOfRange(0)));
        assert_eq!(
            PortSet::range(10, 9),
            Err(ConfigError::InvertedRange { start: 10, end: 9 })
        );
    }

    #[test]
    fn parsed_set_is_sorted_and_unique() {
        let set = PortSet::parse("443,22,443,20-22").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![20, 21, 22, 443]);
    }

    #[test]
    fn rejects_bad_parameters() {
        let ports = PortSet::range(1, 2).unwrap();
        assert_eq!(
            ScanConfig::new("  ", ports.clone(), SECOND, 1).unwrap_err(),
            ConfigError::EmptyHost
        );
        assert_eq!(
            ScanConfig::new("localhost", ports.clone(), Duration::ZERO, 1).unwrap_err(),
            ConfigError::ZeroTimeout
        );
        assert_eq!(
            ScanConfig::new("localhost", ports, SECOND, 0).unwrap_err(),
            ConfigError::ZeroConcurrency
        );
    }

    #[test]
    fn concurrency_is_clamped() {
        let ports = PortSet::range(1, 2).unwrap();
        let config = ScanConfig::new("localhost", ports, SECOND, 1_000_000).unwrap();
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
        assert_eq!(config.protocol, ProtocolHint::Auto);
    }

    #[test]
    fn targets_follow_ports() {
        let config = ScanConfig::new("10.0.0.1", PortSet::range(80, 81).unwrap(), SECOND, 4)
            .unwrap()
            .with_protocol(ProtocolHint::Tls);
        let targets: Vec<_> = config.targets().collect();
        assert_eq!(
            targets,
            vec![ScanTarget::new("10.0.0.1", 80), ScanTarget::new("10.0.0.1", 81)]
        );
    }
}
