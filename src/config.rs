use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::api::DEFAULT_API_URL;
use crate::poller::PollerConfig;
use crate::queue::{QueueConfig, MAX_CONCURRENCY};
use crate::sink::OutputFormat;

/// Everything one run needs, passed explicitly to each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Keep existing output instead of starting a fresh file.
    pub append: bool,
    pub api_url: String,
    pub request_timeout: Duration,
    pub poller: PollerConfig,
    pub queue: QueueConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("hosts.txt"),
            output: PathBuf::from("results.csv"),
            format: OutputFormat::Csv,
            append: false,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            poller: PollerConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Reject settings that would make the run meaningless before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            bail!("API url must not be empty");
        }
        if self.request_timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        if self.queue.concurrency == 0 || self.queue.concurrency > MAX_CONCURRENCY {
            bail!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.queue.concurrency
            );
        }
        if self.poller.max_wait.is_some_and(|d| d.is_zero()) {
            bail!("max wait must be greater than zero when set");
        }
        Ok(())
    }
}
