use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::api::AnalyzeApi;
use crate::error::PollFailure;
use crate::types::{AnalyzeResponse, Host, ScanRequest, ScanResult, ScanStatus};

/// Timing and retry policy for one host's job.
///
/// The delays are long on purpose: the remote service is shared and
/// rate-limited, and a full assessment takes minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Attempts per `analyze` call before the host is given up on. 0 acts as 1.
    pub retries: u32,
    /// Fixed pause between failed attempts.
    pub retry_delay: Duration,
    /// Pause between successful status queries while the job runs.
    pub poll_interval: Duration,
    /// Pause before the first submission for each host.
    pub initial_delay: Duration,
    /// Upper bound on the time spent waiting for a terminal status.
    pub max_wait: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(90),
            initial_delay: Duration::from_secs(10),
            max_wait: None,
        }
    }
}

/// Drives a single host's remote job from submission to a terminal status.
#[derive(Debug)]
pub struct JobPoller<A> {
    api: A,
    config: PollerConfig,
}

impl<A: AnalyzeApi> JobPoller<A> {
    pub fn new(api: A, config: PollerConfig) -> Self {
        Self { api, config }
    }

    /// Start a new job for `host` and poll it until `READY` or `ERROR`.
    ///
    /// - Each call is retried up to `retries` times with `retry_delay` between
    ///   attempts; running out yields [`PollFailure::RetriesExhausted`].
    /// - A response without a `status` ends the job with
    ///   [`PollFailure::MissingStatus`].
    /// - With `max_wait` set, the job is abandoned with
    ///   [`PollFailure::WaitExceeded`] once that much time has passed since
    ///   submission; sleeps and in-flight refreshes are cut short at the limit.
    pub async fn submit(&self, host: &Host) -> Result<ScanResult, PollFailure> {
        time::sleep(self.config.initial_delay).await;

        let started = Instant::now();
        let deadline = self.config.max_wait.map(|limit| started + limit);
        let mut response = self.query(host, &ScanRequest::start(host)).await?;
        info!(%host, "started new scan");

        let refresh = ScanRequest::refresh(host);
        loop {
            let Some(status) = response.status.clone() else {
                error!(%host, "no status in the response");
                return Err(PollFailure::MissingStatus { host: host.clone() });
            };

            if status.is_terminal() {
                debug!(%host, %status, "scan reached terminal status");
                return ScanResult::from_response(host, response)
                    .ok_or_else(|| PollFailure::MissingStatus { host: host.clone() });
            }

            let pause = match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(self.wait_exceeded(host, status, started));
                    }
                    self.config
                        .poll_interval
                        .min(deadline.saturating_duration_since(Instant::now()))
                }
                None => self.config.poll_interval,
            };
            time::sleep(pause).await;

            response = match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(self.wait_exceeded(host, status, started));
                    }
                    match time::timeout_at(deadline, self.query(host, &refresh)).await {
                        Ok(queried) => queried?,
                        Err(_) => return Err(self.wait_exceeded(host, status, started)),
                    }
                }
                None => self.query(host, &refresh).await?,
            };
            if let Some(status) = &response.status {
                info!(%host, %status, "scan progress");
            }
        }
    }

    fn wait_exceeded(&self, host: &Host, status: ScanStatus, started: Instant) -> PollFailure {
        let waited = started.elapsed();
        warn!(%host, %status, ?waited, "giving up on unfinished scan");
        PollFailure::WaitExceeded {
            host: host.clone(),
            status,
            waited,
        }
    }

    async fn query(&self, host: &Host, request: &ScanRequest) -> Result<AnalyzeResponse, PollFailure> {
        let budget = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.analyze(request).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(%host, attempt, "request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if attempt >= budget => {
                    error!(%host, attempt, error = %e, "max retries reached");
                    return Err(PollFailure::RetriesExhausted {
                        host: host.clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        %host,
                        attempt,
                        budget,
                        error = %e,
                        "request failed, retrying in {:?}",
                        self.config.retry_delay
                    );
                    time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}
