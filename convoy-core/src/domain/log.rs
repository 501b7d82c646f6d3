//! Log domain types

use serde::{Deserialize, Serialize};

/// A structured log entry attached to a run or stage run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Stage the entry belongs to, if any
    pub stage: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, stage: Option<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
            stage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
