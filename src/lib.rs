//! Library crate for lts-scan: drives SSL Labs assessments host by host and
//! records per-endpoint grades.
pub mod api;
pub mod config;
pub mod error;
pub mod hosts;
pub mod poller;
pub mod queue;
pub mod sink;
pub mod types;
