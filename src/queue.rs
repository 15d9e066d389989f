use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::AnalyzeApi;
use crate::error::PollFailure;
use crate::poller::JobPoller;
use crate::sink::ResultSink;
use crate::types::{Host, OutputRow, ScanResult, ScanStatus, FAILED_STATUS};

/// Hard ceiling on jobs in flight against the remote service.
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Pause between consecutive hosts, and minimum spacing between job starts.
    pub pacing: Duration,
    /// Jobs allowed in flight at once. 1 reproduces strict input order.
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(15),
            concurrency: 1,
        }
    }
}

/// Keeps successive job starts at least `spacing` apart.
#[derive(Debug, Clone)]
pub struct Pacer {
    spacing: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.spacing {
                time::sleep(self.spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// What happened to one host.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub host: Host,
    pub status: String,
    pub grades: Vec<String>,
    /// Remote explanation of the status, mostly set for `ERROR`.
    pub message: Option<String>,
    pub rows: usize,
    pub failure: Option<String>,
    pub write_error: Option<String>,
}

impl HostOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Aggregate of a queue run, outcomes in input order.
#[derive(Serialize, Debug, Clone, Default)]
pub struct QueueSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub sink_errors: usize,
    pub outcomes: Vec<HostOutcome>,
}

/// Runs one [`JobPoller`] per host and records every outcome to the sink.
pub struct HostQueue<A, S> {
    poller: Arc<JobPoller<A>>,
    sink: Arc<Mutex<S>>,
    config: QueueConfig,
    cancel: CancellationToken,
}

impl<A, S> HostQueue<A, S>
where
    A: AnalyzeApi + 'static,
    S: ResultSink + 'static,
{
    pub fn new(poller: JobPoller<A>, sink: S, config: QueueConfig) -> Self {
        Self {
            poller: Arc::new(poller),
            sink: Arc::new(Mutex::new(sink)),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an external token, e.g. one tied to Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process `hosts` in order. Per-host failures are recorded and never stop
    /// the queue; only cancellation leaves hosts unstarted.
    pub async fn run(&self, hosts: Vec<Host>) -> QueueSummary {
        let total = hosts.len();
        let sem = Arc::new(Semaphore::new(self.config.concurrency.clamp(1, MAX_CONCURRENCY)));
        let pacer = Pacer::new(self.config.pacing);
        let mut set = JoinSet::new();
        let mut started = 0usize;

        for (idx, host) in hosts.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = pacer.wait() => {}
            }

            started += 1;
            info!(%host, position = idx + 1, total, "scanning host");

            let poller = self.poller.clone();
            let sink = self.sink.clone();
            let cancel = self.cancel.clone();
            let pacing = self.config.pacing;
            let is_last = idx + 1 == total;

            set.spawn(async move {
                let _permit = permit; // held until pacing after this host is done

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(PollFailure::Cancelled { host: host.clone() }),
                    r = poller.submit(&host) => r,
                };
                let outcome = record(&sink, &host, result).await;

                if !is_last {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = time::sleep(pacing) => {}
                    }
                }
                (idx, outcome)
            });
        }

        let mut finished = Vec::with_capacity(started);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => finished.push(pair),
                Err(e) => error!(error = %e, "host task panicked"),
            }
        }
        finished.sort_by_key(|(idx, _)| *idx);

        let mut summary = QueueSummary {
            total,
            skipped: total - started,
            ..Default::default()
        };
        for (_, outcome) in finished {
            if outcome.is_failure() {
                summary.failed += 1;
            } else {
                summary.completed += 1;
            }
            if outcome.write_error.is_some() {
                summary.sink_errors += 1;
            } else {
                summary.rows_written += outcome.rows;
            }
            summary.outcomes.push(outcome);
        }
        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "queue cancelled before all hosts were started");
        }
        summary
    }
}

async fn record<S: ResultSink>(
    sink: &Mutex<S>,
    host: &Host,
    result: Result<ScanResult, PollFailure>,
) -> HostOutcome {
    let (rows, mut outcome) = match result {
        Ok(scan) => {
            let rows = OutputRow::from_result(&scan);
            let reason = scan.status_message.as_deref().unwrap_or("");
            if scan.status == ScanStatus::Error {
                warn!(%host, status = %scan.status, reason, "scan finished with an error");
            } else {
                info!(%host, status = %scan.status, endpoints = scan.endpoints.len(), reason, "scan finished");
            }
            let outcome = HostOutcome {
                host: host.clone(),
                status: scan.status.to_string(),
                grades: rows.iter().map(|r| r.grade.clone()).collect(),
                message: scan.status_message.clone(),
                rows: rows.len(),
                failure: None,
                write_error: None,
            };
            (rows, outcome)
        }
        Err(failure) => {
            error!(host = %failure.host(), error = %failure, "scan failed");
            let outcome = HostOutcome {
                host: host.clone(),
                status: FAILED_STATUS.into(),
                grades: Vec::new(),
                message: None,
                rows: 1,
                failure: Some(failure.to_string()),
                write_error: None,
            };
            (vec![OutputRow::failure(host)], outcome)
        }
    };

    let mut guard = sink.lock().await;
    if let Err(e) = guard.write(&rows) {
        error!(%host, error = %e, "failed to record result");
        outcome.write_error = Some(e.to_string());
    }
    outcome
}
