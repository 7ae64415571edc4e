use {pagemine_browser::BrowserError, thiserror::Error};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("malformed DOM snapshot: {0}")]
    Snapshot(String),

    #[error("unexpected script result: {0}")]
    Json(#[from] serde_json::Error),
}
