use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pqc_scan_rs::classifier::ProtocolHint;
use pqc_scan_rs::config::{PortSet, ScanConfig};
use pqc_scan_rs::output::{write_report, OutputFormat};
use pqc_scan_rs::{logging, scanner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// pqc-scan-rs: report which TLS/SSH ports accept post-quantum and classical key exchange.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pqc-scan-rs",
    version,
    about = "Concurrent TLS/SSH port prober reporting post-quantum and classical key exchange support.",
    long_about = None
)]
struct Cli {
    /// Target host name or IP address.
    #[arg(long)]
    host: String,

    /// Ports to scan: single ports, ranges and comma lists (e.g. 22,443,8000-8010).
    #[arg(long, default_value = "1-1024", conflicts_with_all = ["start", "end"])]
    ports: String,

    /// First port of a contiguous range (use together with --end).
    #[arg(long, requires = "end")]
    start: Option<u16>,

    /// Last port of a contiguous range (use together with --start).
    #[arg(long, requires = "start")]
    end: Option<u16>,

    /// Per-probe timeout in milliseconds, dial and handshake together.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Max ports classified at the same time.
    #[arg(long, default_value_t = 100)]
    concurrency: usize,

    /// Handshakes to try on each port.
    #[arg(long, value_enum, default_value = "auto")]
    protocol: ProtocolHint,

    /// Report format.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Write the report to this path instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Include unreachable (NoConn) ports in the report.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Log level for stderr logging; RUST_LOG overrides it.
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let ports = match (cli.start, cli.end) {
        (Some(start), Some(end)) => PortSet::range(start, end)?,
        _ => PortSet::parse(&cli.ports)?,
    };
    let config = ScanConfig::new(
        cli.host.clone(),
        ports,
        Duration::from_millis(cli.timeout_ms),
        cli.concurrency,
    )?
    .with_protocol(cli.protocol);

    info!(
        host = %config.host,
        ports = config.ports.len(),
        timeout_ms = cli.timeout_ms,
        concurrency = config.concurrency,
        protocol = %config.protocol,
        "starting scan"
    );

    // Ctrl-C stops submitting new ports; submitted ones still finish.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, waiting for submitted ports");
            cancel_ctrlc.cancel();
        }
    });

    let report = scanner::scan_ports_with_cancel(&config, cancel).await;

    match cli.output.as_deref() {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file: {}", path.display()))?;
            write_report(BufWriter::new(file), &report, cli.format, cli.all)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            eprintln!("Wrote {} results to {}", report.results.len(), path.display());
        }
        None => write_report(io::stdout().lock(), &report, cli.format, cli.all)
            .context("failed to write report to stdout")?,
    }
    Ok(())
}
