use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status written for a host whose job never reached a terminal state.
pub const FAILED_STATUS: &str = "FAILED";
/// Grade written alongside [`FAILED_STATUS`].
pub const TIMEOUT_GRADE: &str = "TIMEOUT";

/// A domain name submitted for analysis.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Host(String);

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Host {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

/// Query parameters for one call to the `analyze` endpoint.
///
/// Only the first call for a host carries `startNew` and `ignoreMismatch`;
/// refresh calls omit them so the remote job keeps running instead of
/// restarting.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub host: String,
    pub publish: Toggle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_new: Option<Toggle>,
    pub all: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_mismatch: Option<Toggle>,
}

impl ScanRequest {
    pub fn start(host: &Host) -> Self {
        Self {
            host: host.to_string(),
            publish: Toggle::Off,
            start_new: Some(Toggle::On),
            all: "done".into(),
            ignore_mismatch: Some(Toggle::On),
        }
    }

    pub fn refresh(host: &Host) -> Self {
        Self {
            start_new: None,
            ignore_mismatch: None,
            ..Self::start(host)
        }
    }

    pub fn is_new_job(&self) -> bool {
        self.start_new == Some(Toggle::On)
    }
}

/// Job status reported by the remote service.
///
/// Only `READY` and `ERROR` are meaningful to the poller; anything else is
/// carried through verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ScanStatus {
    InProgress,
    Ready,
    Error,
    Dns,
    Other(String),
}

impl ScanStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ScanStatus::InProgress => "IN_PROGRESS",
            ScanStatus::Ready => "READY",
            ScanStatus::Error => "ERROR",
            ScanStatus::Dns => "DNS",
            ScanStatus::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Ready | ScanStatus::Error)
    }
}

impl From<String> for ScanStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "IN_PROGRESS" => ScanStatus::InProgress,
            "READY" => ScanStatus::Ready,
            "ERROR" => ScanStatus::Error,
            "DNS" => ScanStatus::Dns,
            _ => ScanStatus::Other(s),
        }
    }
}

impl From<ScanStatus> for String {
    fn from(status: ScanStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved address of a host and the grade it received.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// Raw body returned by every `analyze` call, finished or not.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub status: Option<ScanStatus>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "opaque_text")]
    pub test_time: Option<String>,
    #[serde(default)]
    pub endpoints: Option<Vec<Endpoint>>,
}

/// Terminal payload of a finished job.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub host: Host,
    pub status: ScanStatus,
    pub status_message: Option<String>,
    pub start_time: Option<String>,
    pub test_time: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

impl ScanResult {
    /// Build a result from a response, or `None` while the job is still running.
    ///
    /// The host echoed by the service wins over the requested one.
    pub fn from_response(requested: &Host, response: AnalyzeResponse) -> Option<Self> {
        let status = response.status.filter(ScanStatus::is_terminal)?;
        Some(Self {
            host: response.host.map(Host::new).unwrap_or_else(|| requested.clone()),
            status,
            status_message: response.status_message,
            start_time: response.start_time,
            test_time: response.test_time,
            endpoints: response.endpoints.unwrap_or_default(),
        })
    }
}

/// One flattened (host, endpoint) line of output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputRow {
    pub host: String,
    pub status: String,
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "testTime")]
    pub test_time: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub grade: String,
}

impl OutputRow {
    /// Column order shared by every sink.
    pub const COLUMNS: [&'static str; 6] =
        ["host", "status", "startTime", "testTime", "ipAddress", "grade"];

    /// One row per endpoint; a result without endpoints yields no rows.
    pub fn from_result(result: &ScanResult) -> Vec<OutputRow> {
        result
            .endpoints
            .iter()
            .map(|endpoint| OutputRow {
                host: result.host.to_string(),
                status: result.status.to_string(),
                start_time: result.start_time.clone().unwrap_or_default(),
                test_time: result.test_time.clone().unwrap_or_default(),
                ip_address: endpoint.ip_address.clone(),
                grade: endpoint.grade.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Placeholder recorded when a host could not be driven to completion.
    pub fn failure(host: &Host) -> OutputRow {
        OutputRow {
            host: host.to_string(),
            status: FAILED_STATUS.into(),
            grade: TIMEOUT_GRADE.into(),
            ..Default::default()
        }
    }
}

/// Timestamps arrive as epoch millis from the live service but are treated as
/// opaque text, so accept strings and numbers alike.
fn opaque_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
