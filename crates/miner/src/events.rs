use serde::{Deserialize, Serialize};

use crate::types::{InstanceId, InstanceStats, ResultStatus};

/// Notifications broadcast by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MinerEvent {
    InstanceStarted {
        instance_id: InstanceId,
        name: String,
    },
    UrlProcessed {
        instance_id: InstanceId,
        url: String,
        status: ResultStatus,
        attempts: u32,
        processed: u64,
        total: u64,
    },
    InstanceCompleted {
        instance_id: InstanceId,
        summary: InstanceStats,
    },
    InstanceFailed {
        instance_id: InstanceId,
        error: String,
    },
    ProxyAdded {
        proxy_id: String,
        server: String,
    },
    /// Forwarded from the browser pool.
    BrowserRecovered {
        failed_browser_id: String,
        replacement_id: Option<String>,
    },
}

impl MinerEvent {
    /// Instance the event belongs to, if any.
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::InstanceStarted { instance_id, .. }
            | Self::UrlProcessed { instance_id, .. }
            | Self::InstanceCompleted { instance_id, .. }
            | Self::InstanceFailed { instance_id, .. } => Some(instance_id),
            Self::ProxyAdded { .. } | Self::BrowserRecovered { .. } => None,
        }
    }
}
