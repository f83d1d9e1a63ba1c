use crate::model::FieldRole;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("no element matches {0}")]
    NotFound(String),

    #[error("interaction with {0} was intercepted")]
    Intercepted(String),

    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("invalid target expression: {0}")]
    InvalidTarget(String),

    #[error("page load failed: {0}")]
    Load(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("no control for {role} exposing {wanted:?} within {timeout_ms}ms")]
    LocatorNotFound {
        role: FieldRole,
        wanted: Vec<String>,
        timeout_ms: u64,
    },

    #[error("could not select {value:?} for {role}: {detail}")]
    SelectionFailed {
        role: FieldRole,
        value: String,
        detail: String,
    },

    #[error("search submission failed: {0}")]
    SubmissionFailed(String),

    #[error("link resolution failed for {url}: {detail}")]
    FetchFailed { url: String, detail: String },

    #[error("could not open {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("page session could not be opened: {0}")]
    Session(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::LocatorNotFound { .. } => "locator_not_found",
            ScrapeError::SelectionFailed { .. } => "selection_failed",
            ScrapeError::SubmissionFailed(_) => "submission_failed",
            ScrapeError::FetchFailed { .. } => "fetch_failed",
            ScrapeError::Navigation { .. } => "navigation_failed",
            ScrapeError::Session(_) => "session_failed",
            ScrapeError::Driver(_) => "driver_failed",
        }
    }
}
