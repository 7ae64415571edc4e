use {pagemine_browser::BrowserError, pagemine_extract::ExtractError, thiserror::Error};

use crate::types::InstanceStatus;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("invalid instance config: {message}")]
    InvalidConfig { message: String },

    #[error("custom extractor already registered: {name}")]
    DuplicateExtractor { name: String },

    #[error("cannot {action} instance {instance_id} while {from}")]
    InvalidTransition {
        instance_id: String,
        from: InstanceStatus,
        action: &'static str,
    },

    #[error("seeding closed for instance {instance_id}")]
    SeedingClosed { instance_id: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("result store: {message}")]
    Store { message: String },
}

impl MinerError {
    #[must_use]
    pub fn instance_not_found(instance_id: impl Into<String>) -> Self {
        Self::InstanceNotFound {
            instance_id: instance_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn seeding_closed(instance_id: impl Into<String>) -> Self {
        Self::SeedingClosed {
            instance_id: instance_id.into(),
        }
    }

    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// The pool can no longer serve pages: every later URL would fail the same way.
    #[must_use]
    pub fn is_capacity_lost(&self, browsers: usize) -> bool {
        match self {
            Self::Browser(BrowserError::PoolClosed) => true,
            Self::Browser(BrowserError::LaunchFailed(_)) => browsers == 0,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MinerError>;
