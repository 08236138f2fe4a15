use thiserror::Error;

pub type Result<T, E = ChartError> = std::result::Result<T, E>;

/// Everything that can go wrong between the history service and the screen.
#[derive(Debug, Error)]
pub enum ChartError {
    /// Non-2xx reply or network failure while talking to the history service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Sample buffer shorter than its header claims, or malformed metadata.
    #[error("decode error: {0}")]
    Decode(String),

    /// A required panel configuration key is missing or has the wrong shape.
    #[error("panel configuration: '{field}' missing or invalid, expected {hint}")]
    Config { field: String, hint: String },

    /// Bad manual entry (time range, timespan preset, ...).
    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("formula '{formula}': {reason}")]
    Formula { formula: String, reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image encoding: {0}")]
    Image(String),

    /// Adapter, device or text preparation failure in the painter.
    #[error("render error: {0}")]
    Render(String),
}

impl ChartError {
    pub fn config(field: impl Into<String>, hint: impl Into<String>) -> Self {
        ChartError::Config {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Errors that background loading reports and then retries on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChartError::Transport(_) | ChartError::Decode(_))
    }
}
