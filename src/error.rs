use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionPlanError {
    #[error("Missing expected columns: expected {expected:?}, found {found:?}")]
    MissingColumns {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Header row {header_row} is out of range: the sheet only has {rows} rows")]
    HeaderRowOutOfRange { header_row: usize, rows: usize },

    #[error("No header row with the expected columns within the first {within} rows")]
    HeaderNotFound { within: usize },

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("The provider returned an empty response")]
    EmptyResponse,

    #[error("Action '{action}' is not allowed while the current item is {state}")]
    InvalidTransition { state: String, action: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "providers")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ActionPlanError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ActionPlanError::QuotaExceeded(_))
    }

    /// Failures worth resending the same request for. Provider rejections
    /// (bad request, safety filter) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionPlanError::QuotaExceeded(_) => true,
            #[cfg(feature = "providers")]
            ActionPlanError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ActionPlanError>;
