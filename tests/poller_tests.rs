mod common;

use std::time::Duration;

use common::{ready, running, timeout, unavailable, ScriptedApi};
use lts_scan::error::PollFailure;
use lts_scan::poller::{JobPoller, PollerConfig};
use lts_scan::types::{AnalyzeResponse, Host, OutputRow, ScanStatus};
use tokio::time::Instant;

fn poller(api: ScriptedApi) -> JobPoller<ScriptedApi> {
    JobPoller::new(api, PollerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn in_progress_then_ready_yields_result() {
    let api = ScriptedApi::new()
        .reply("github.com", Ok(running(ScanStatus::InProgress)))
        .reply("github.com", Ok(ready("github.com", &[("140.82.121.3", "A")])));
    let poller = poller(api.clone());

    let start = Instant::now();
    let result = poller.submit(&Host::from("github.com")).await.expect("scan completes");

    // initial delay + one poll interval
    assert_eq!(start.elapsed(), Duration::from_secs(100));
    assert_eq!(result.status, ScanStatus::Ready);
    let rows = OutputRow::from_result(&result);
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        OutputRow {
            host: "github.com".into(),
            status: "READY".into(),
            start_time: "t0".into(),
            test_time: "t1".into(),
            ip_address: "140.82.121.3".into(),
            grade: "A".into(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn only_first_request_starts_a_new_job() {
    let api = ScriptedApi::new()
        .reply("a.example", Ok(running(ScanStatus::Dns)))
        .reply("a.example", Ok(running(ScanStatus::InProgress)))
        .reply("a.example", Ok(ready("a.example", &[("10.0.0.1", "B")])));
    poller(api.clone()).submit(&Host::from("a.example")).await.unwrap();

    let requests = api.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].is_new_job());
    assert!(requests[0].ignore_mismatch.is_some());
    assert!(requests[1..].iter().all(|r| !r.is_new_job() && r.ignore_mismatch.is_none()));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_below_budget_recover() {
    let api = ScriptedApi::new()
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(unavailable()))
        .reply("a.example", Ok(ready("a.example", &[("10.0.0.1", "A")])));
    let start = Instant::now();
    let result = poller(api.clone()).submit(&Host::from("a.example")).await;

    assert!(result.is_ok());
    assert_eq!(api.requests().len(), 3);
    // initial delay + two retry delays
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn failures_reaching_budget_give_up() {
    let api = ScriptedApi::new()
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(timeout()))
        .reply("a.example", Ok(ready("a.example", &[("10.0.0.1", "A")])));
    let err = poller(api.clone()).submit(&Host::from("a.example")).await.unwrap_err();

    match err {
        PollFailure::RetriesExhausted { host, attempts, .. } => {
            assert_eq!(host.as_str(), "a.example");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected failure: {other}"),
    }
    assert_eq!(api.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_applies_to_refresh_queries() {
    let api = ScriptedApi::new().reply("a.example", Ok(running(ScanStatus::InProgress)));
    let err = poller(api.clone()).submit(&Host::from("a.example")).await.unwrap_err();

    assert!(matches!(err, PollFailure::RetriesExhausted { attempts: 3, .. }));
    let requests = api.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[0].is_new_job());
    assert!(!requests[3].is_new_job());
}

#[tokio::test(start_paused = true)]
async fn custom_retry_budget_is_respected() {
    let api = ScriptedApi::new()
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(timeout()))
        .reply("a.example", Err(timeout()))
        .reply("a.example", Ok(ready("a.example", &[])));
    let config = PollerConfig {
        retries: 5,
        ..PollerConfig::default()
    };
    let result = JobPoller::new(api.clone(), config).submit(&Host::from("a.example")).await;
    assert!(result.is_ok());
    assert_eq!(api.requests().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn missing_status_is_terminal_failure() {
    let api = ScriptedApi::new()
        .reply("a.example", Ok(running(ScanStatus::InProgress)))
        .reply("a.example", Ok(AnalyzeResponse::default()))
        .reply("a.example", Ok(ready("a.example", &[("10.0.0.1", "A")])));
    let err = poller(api.clone()).submit(&Host::from("a.example")).await.unwrap_err();

    assert!(matches!(err, PollFailure::MissingStatus { .. }));
    assert_eq!(err.host().as_str(), "a.example");
    assert_eq!(api.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn error_status_is_terminal_result() {
    let api = ScriptedApi::new().reply(
        "nx.example",
        Ok(AnalyzeResponse {
            host: Some("nx.example".into()),
            status: Some(ScanStatus::Error),
            status_message: Some("Unable to resolve domain name".into()),
            ..Default::default()
        }),
    );
    let result = poller(api).submit(&Host::from("nx.example")).await.unwrap();

    assert_eq!(result.status, ScanStatus::Error);
    assert_eq!(result.status_message.as_deref(), Some("Unable to resolve domain name"));
    assert!(result.endpoints.is_empty());
    assert!(OutputRow::from_result(&result).is_empty());
}

fn bounded(limit: u64) -> PollerConfig {
    PollerConfig {
        max_wait: Some(Duration::from_secs(limit)),
        ..PollerConfig::default()
    }
}

fn waited_for(err: PollFailure) -> Duration {
    match err {
        PollFailure::WaitExceeded { waited, status, .. } => {
            assert_eq!(status, ScanStatus::InProgress);
            waited
        }
        other => panic!("unexpected failure: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn max_wait_bounds_unfinished_jobs() {
    let mut api = ScriptedApi::new();
    for _ in 0..10 {
        api = api.reply("slow.example", Ok(running(ScanStatus::InProgress)));
    }
    let err = JobPoller::new(api.clone(), bounded(200))
        .submit(&Host::from("slow.example"))
        .await
        .unwrap_err();

    // queries at 0s, 90s and 180s; the last sleep is cut to the remaining 20s
    assert_eq!(waited_for(err), Duration::from_secs(200));
    assert_eq!(api.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn max_wait_shorter_than_two_intervals_is_not_overshot() {
    let api = ScriptedApi::new()
        .reply("slow.example", Ok(running(ScanStatus::InProgress)))
        .reply("slow.example", Ok(running(ScanStatus::InProgress)))
        .reply("slow.example", Ok(running(ScanStatus::InProgress)));
    let start = Instant::now();
    let err = JobPoller::new(api.clone(), bounded(100))
        .submit(&Host::from("slow.example"))
        .await
        .unwrap_err();

    let waited = waited_for(err);
    assert!(waited <= Duration::from_secs(100));
    assert_eq!(waited, Duration::from_secs(100));
    assert_eq!(start.elapsed(), Duration::from_secs(110));
    assert_eq!(api.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn max_wait_cuts_refresh_retries_short() {
    // after the first refresh fails the retry pause runs into the limit
    let api = ScriptedApi::new().reply("slow.example", Ok(running(ScanStatus::InProgress)));
    let err = JobPoller::new(api, bounded(100))
        .submit(&Host::from("slow.example"))
        .await
        .unwrap_err();

    assert_eq!(waited_for(err), Duration::from_secs(100));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_makes_one_attempt() {
    let api = ScriptedApi::new()
        .reply("a.example", Err(unavailable()))
        .reply("a.example", Ok(ready("a.example", &[("10.0.0.1", "A")])));
    let config = PollerConfig {
        retries: 0,
        ..PollerConfig::default()
    };
    let err = JobPoller::new(api.clone(), config)
        .submit(&Host::from("a.example"))
        .await
        .unwrap_err();

    assert!(matches!(err, PollFailure::RetriesExhausted { attempts: 1, .. }));
    assert_eq!(api.requests().len(), 1);
}
