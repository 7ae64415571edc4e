use std::{collections::BTreeMap, fmt, sync::Arc};

use {
    pagemine_extract::PageStructure,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

pub type InstanceId = String;

/// `Ready → Running → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Ready,
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
    /// Blocked by robots.txt. Not counted as a failure.
    Disallowed,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Disallowed => "disallowed",
        }
    }
}

/// Outcome of mining one URL. Immutable once appended to a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    /// URL after redirects, when the page loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub timestamp: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<Arc<PageStructure>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Navigation attempts made; 0 when robots.txt blocked the URL.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub(crate) fn new(url: &str, status: ResultStatus) -> Self {
        Self {
            url: url.to_string(),
            final_url: None,
            timestamp: pagemine_common::time::now_rfc3339(),
            status,
            structure: None,
            attributes: BTreeMap::new(),
            attribute_errors: BTreeMap::new(),
            custom: BTreeMap::new(),
            custom_errors: BTreeMap::new(),
            error: None,
            attempts: 0,
            proxy: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Progress of one instance, also used as the completion summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub instance_id: InstanceId,
    pub name: String,
    pub topic: String,
    pub status: InstanceStatus,
    /// URLs known to the instance: configured, seeded and discovered.
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub disallowed: u64,
    /// Results appended to the topic bundle by this instance.
    pub results: u64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
