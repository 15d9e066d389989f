#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lts_scan::api::AnalyzeApi;
use lts_scan::error::ApiError;
use lts_scan::sink::ResultSink;
use lts_scan::types::{AnalyzeResponse, Endpoint, OutputRow, ScanRequest, ScanStatus};

/// Replays canned replies per host; an exhausted script behaves like a timeout.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Result<AnalyzeResponse, ApiError>>>>>,
    requests: Arc<Mutex<Vec<ScanRequest>>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, host: &str, reply: Result<AnalyzeResponse, ApiError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<ScanRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, host: &str) -> Vec<ScanRequest> {
        self.requests().into_iter().filter(|r| r.host == host).collect()
    }
}

#[async_trait]
impl AnalyzeApi for ScriptedApi {
    async fn analyze(&self, request: &ScanRequest) -> Result<AnalyzeResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.host)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(timeout()))
    }
}

/// Collects rows in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub rows: Arc<Mutex<Vec<OutputRow>>>,
    pub writes: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn rows(&self) -> Vec<OutputRow> {
        self.rows.lock().unwrap().clone()
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, rows: &[OutputRow]) -> anyhow::Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

pub fn timeout() -> ApiError {
    ApiError::Timeout(Duration::from_secs(30))
}

pub fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        url: "https://api.example.test/analyze".into(),
    }
}

pub fn running(status: ScanStatus) -> AnalyzeResponse {
    AnalyzeResponse {
        status: Some(status),
        ..Default::default()
    }
}

pub fn ready(host: &str, endpoints: &[(&str, &str)]) -> AnalyzeResponse {
    AnalyzeResponse {
        host: Some(host.to_string()),
        status: Some(ScanStatus::Ready),
        start_time: Some("t0".into()),
        test_time: Some("t1".into()),
        endpoints: Some(
            endpoints
                .iter()
                .map(|(ip, grade)| Endpoint {
                    ip_address: ip.to_string(),
                    grade: Some(grade.to_string()),
                    status_message: None,
                })
                .collect(),
        ),
        ..Default::default()
    }
}
