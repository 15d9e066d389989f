use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lts_scan::api::{SslLabsClient, DEFAULT_API_URL};
use lts_scan::config::ScanConfig;
use lts_scan::hosts;
use lts_scan::poller::{JobPoller, PollerConfig};
use lts_scan::queue::{HostQueue, QueueConfig, QueueSummary};
use lts_scan::sink::{self, OutputFormat};
use tokio_util::sync::CancellationToken;

/// lts-scan — Lightweight TLS scanner driving the SSL Labs assessment API.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lts-scan",
    version,
    about = "Submit hosts to the SSL Labs API, wait for each assessment and record per-endpoint grades.",
    long_about = None
)]
struct Cli {
    /// Path to the host list (one hostname per line, `#` comments allowed).
    #[arg(long, short, default_value = "hosts.txt")]
    input: PathBuf,

    /// Path of the results file.
    #[arg(long, short, default_value = "results.csv")]
    output: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Keep rows already in the output file instead of starting fresh.
    #[arg(long, default_value_t = false)]
    append: bool,

    /// Base URL of the assessment API.
    #[arg(long = "api-url", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Attempts per API call before a host is marked failed.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds between failed attempts.
    #[arg(long = "retry-delay-secs", default_value_t = 10)]
    retry_delay_secs: u64,

    /// Seconds between status queries while an assessment runs.
    #[arg(long = "poll-interval-secs", default_value_t = 90)]
    poll_interval_secs: u64,

    /// Seconds to wait before submitting each host.
    #[arg(long = "initial-delay-secs", default_value_t = 10)]
    initial_delay_secs: u64,

    /// Seconds to wait between hosts.
    #[arg(long = "pacing-secs", default_value_t = 15)]
    pacing_secs: u64,

    /// Give up on a host whose assessment is still running after this many seconds.
    #[arg(long = "max-wait-secs")]
    max_wait_secs: Option<u64>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,

    /// Assessments allowed in flight at once.
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> ScanConfig {
        ScanConfig {
            input: self.input,
            output: self.output,
            format: self.format,
            append: self.append,
            api_url: self.api_url,
            request_timeout: Duration::from_secs(self.timeout_secs),
            poller: PollerConfig {
                retries: self.retries,
                retry_delay: Duration::from_secs(self.retry_delay_secs),
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                initial_delay: Duration::from_secs(self.initial_delay_secs),
                max_wait: self.max_wait_secs.map(Duration::from_secs),
            },
            queue: QueueConfig {
                pacing: Duration::from_secs(self.pacing_secs),
                concurrency: self.concurrency,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.into_config();
    config.validate().context("invalid configuration")?;
    print_config(&config);

    let hosts = hosts::load_hosts_from_path(&config.input)?;
    info!(count = hosts.len(), "loaded host list");

    let client = SslLabsClient::new(&config.api_url, config.request_timeout)?;
    let sink = sink::open_sink(config.format, &config.output, config.append)?;
    let poller = JobPoller::new(client, config.poller.clone());

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing up");
            cancel_ctrlc.cancel();
        }
    });

    let queue = HostQueue::new(poller, sink, config.queue.clone()).with_cancel(cancel);
    let summary = queue.run(hosts).await;

    print_summary_table(&summary);
    println!("Wrote results to {}", config.output.display());
    Ok(())
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "lts_scan=info",
        1 => "lts_scan=debug",
        _ => "lts_scan=trace,reqwest=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_config(cfg: &ScanConfig) {
    println!("lts-scan configuration:");
    println!("  input        : {}", cfg.input.display());
    println!("  output       : {} ({:?})", cfg.output.display(), cfg.format);
    println!("  append       : {}", cfg.append);
    println!("  api          : {}", cfg.api_url);
    println!(
        "  retries      : {} x {}s",
        cfg.poller.retries,
        cfg.poller.retry_delay.as_secs()
    );
    println!("  poll every   : {}s", cfg.poller.poll_interval.as_secs());
    println!("  pacing       : {}s", cfg.queue.pacing.as_secs());
    println!(
        "  max wait     : {}",
        cfg.poller
            .max_wait
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "<unbounded>".to_string())
    );
    println!("  concurrency  : {}", cfg.queue.concurrency);
}

fn print_summary_table(summary: &QueueSummary) {
    let mut host_w = "host".len();
    for o in &summary.outcomes {
        host_w = host_w.max(o.host.as_str().len());
    }
    let status_w = "status".len().max(11);

    println!(
        "\nHosts: {} (completed: {}, failed: {}, skipped: {}) rows written: {}",
        summary.total, summary.completed, summary.failed, summary.skipped, summary.rows_written
    );
    println!(
        "{:<host_w$}  {:<status_w$}  grades",
        "host",
        "status",
        host_w = host_w,
        status_w = status_w
    );
    println!(
        "{:-<host_w$}  {:-<status_w$}  {:-<6}",
        "",
        "",
        "",
        host_w = host_w,
        status_w = status_w
    );
    for o in &summary.outcomes {
        let mut grades = if o.grades.is_empty() {
            "-".to_string()
        } else {
            o.grades.join(" ")
        };
        if let Some(message) = o.message.as_deref().filter(|m| !m.is_empty()) {
            grades.push_str(&format!(" ({message})"));
        }
        if o.write_error.is_some() {
            grades.push_str(" (not recorded)");
        }
        println!(
            "{:<host_w$}  {:<status_w$}  {}",
            o.host.as_str(),
            o.status,
            grades,
            host_w = host_w,
            status_w = status_w
        );
    }
    if summary.sink_errors > 0 {
        eprintln!("Warning: {} host(s) could not be written to the output file", summary.sink_errors);
    }
}
