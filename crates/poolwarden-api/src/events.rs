//! Pool event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert topic for pool fetch failures
pub const TOPIC_POOL_FETCH: &str = "poolwarden.pool.fetch";
/// Alert topic for failed resize actions
pub const TOPIC_RESIZE: &str = "poolwarden.pool.resize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoolEvent {
    Alert {
        topic: String,
        severity: AlertSeverity,
        message: String,
        at: DateTime<Utc>,
    },
    MachinesStarted {
        machines: Vec<String>,
    },
    MachinesTerminated {
        machines: Vec<String>,
    },
    TerminationScheduled {
        machine: String,
        at: DateTime<Utc>,
    },
    DesiredSizeChanged {
        from: Option<usize>,
        to: usize,
    },
    ControllerStateChanged {
        from: String,
        to: String,
    },
}

impl PoolEvent {
    /// Build an alert stamped with the current time
    pub fn alert(
        topic: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        PoolEvent::Alert {
            topic: topic.into(),
            severity,
            message: message.into(),
            at: Utc::now(),
        }
    }
}
