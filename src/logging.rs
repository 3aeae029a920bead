//! tracing subscriber setup for the binary.
//!
//! Logs go to stderr so stdout carries only the rendered report.
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber at `level`. `RUST_LOG` takes precedence
/// when set. Calling this again after a subscriber exists is a no-op.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_logging("debug");
        init_logging("not a level ((");
        tracing::debug!("logging initialized");
    }
}
