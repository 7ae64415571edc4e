use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("robots.txt fetch failed: {0}")]
    RobotsFetch(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
