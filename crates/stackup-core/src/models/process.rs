use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A process launched by the supervisor, persisted so the next run can stop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisedProcess {
    pub service: String,
    pub binary: String,
    pub args: Vec<String>,
    pub pid: u32,
    /// Kernel start time of `pid` at launch, used to detect PID reuse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    pub log_file: PathBuf,
    pub launched_at: DateTime<Utc>,
}

/// Liveness of a recorded process as seen by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessStatus {
    Running,
    Exited,
    /// The PID is alive but belongs to a different process.
    Reused,
}
