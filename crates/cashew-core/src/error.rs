//! Error types for cashew-import

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The file matches none of the supported bank formats (fatal for that file)
    #[error("Could not detect bank format of {file}")]
    DialectDetection { file: String },

    /// The file's account number matches no configured account (fatal for that file)
    #[error(
        "No configured account matches account number '{found}' in {file} (considered: {})",
        .candidates.join(", ")
    )]
    UnresolvedAccount {
        file: String,
        found: String,
        candidates: Vec<String>,
    },

    #[error("Import error: {0}")]
    Import(String),

    /// A classification batch failed at the transport or service level
    #[error("Remote classification failed: {0}")]
    RemoteClassification(String),

    /// The classification service answered with a category outside the category set
    #[error("Classifier returned unknown category '{0}'")]
    InvalidCategoryResponse(String),

    /// A field cannot be represented in the link format (fatal for the run)
    #[error("Cannot encode {field} of transaction on line {line}: {reason}")]
    Encoding {
        field: &'static str,
        line: usize,
        reason: String,
    },

    #[error("Transaction on line {line} is already categorized as '{category}'")]
    AlreadyCategorized { line: usize, category: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
