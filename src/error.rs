use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("schema mismatch on column {column:?}: {reason}")]
    SchemaMismatch { column: String, reason: String },
    #[error("invalid input format {path:?}")]
    InputFormat { path: PathBuf },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion request failed with status {status}: {body}")]
    Completion { status: u16, body: String },
    #[error("completion response contained no choices")]
    EmptyCompletion,
}

impl AdvisorError {
    pub fn missing_column(column: &str) -> Self {
        AdvisorError::SchemaMismatch {
            column: column.to_string(),
            reason: "column not present in dataset".to_string(),
        }
    }

    /// True for failures caused by the caller's request rather than by IO.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, AdvisorError::SchemaMismatch { .. })
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
