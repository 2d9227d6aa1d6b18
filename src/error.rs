//! Error types of the wikitext parser and of the collaborators around it.

use thiserror::Error;

/// Failure while turning wikitext into structured values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Table delimiters are missing or a data row carries no cell prefix.
    #[error("malformed table{}: {reason}", .row.map(|row| format!(" at row {row}")).unwrap_or_default())]
    MalformedTable {
        /// Index of the offending `|-` separated row, if the fault is row-local.
        row: Option<usize>,
        reason: &'static str,
    },
    /// A coordinate cell of the location list is not a finite float.
    #[error("invalid number in record {row}, field '{field}': '{value}'")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },
    /// Rows with `rowspan`/`colspan` are dropped. Only ever logged.
    #[error("unsupported row shape at row {row}: row-/colspan is not supported")]
    UnsupportedRowShape { row: usize },
}

/// A [`ParseError`] tied to the section it happened in.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("section '{title}': {source}")]
pub struct SectionError {
    pub title: String,
    #[source]
    pub source: ParseError,
}

/// Failure talking to the MediaWiki API.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("wiki request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("wiki page '{page}' not found: {info}")]
    PageNotFound { page: String, info: String },
    #[error("unexpected wiki response for '{page}': {details}")]
    UnexpectedResponse { page: String, details: String },
    #[error("invalid wiki url: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure of the image classification pipeline.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image is larger than the allowed {limit} bytes")]
    ImageTooLarge { limit: usize },
    #[error("unsupported image format")]
    UnsupportedImage,
    #[error("image download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("vision model failed: {0}")]
    Model(String),
    #[error("vision model answered outside the expected schema: {0}")]
    Schema(String),
}
