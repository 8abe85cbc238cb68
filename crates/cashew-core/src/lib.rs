//! Cashew Import Core Library
//!
//! Shared functionality for the cashew-import tool:
//! - CSV import for DKB, Migros Bank and Capital One exports
//! - Description cleanup rules
//! - Two-tier categorization: keyword rules, then a remote classifier
//! - Pluggable OpenAI-compatible classification backends
//! - Deterministic Cashew deep-link encoding
//! - Configuration loading and validation

pub mod ai;
pub mod categorize;
pub mod config;
pub mod error;
pub mod import;
pub mod keywords;
pub mod link;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod remote;

/// Test utilities including mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OpenAICompatibleBackend};
pub use categorize::{CategorizationSummary, Categorizer, ClassificationState};
pub use config::{ClassifierConfig, Config, EmailConfig, LinkConfig, SmtpConfig};
pub use error::{Error, Result};
pub use import::{import_file, ImportedFile, RowParseWarning};
pub use keywords::KeywordClassifier;
pub use link::{decode_link, CashewLink, LinkEncoder, LinkEntry, LinkFormat};
pub use models::{
    Account, Category, CategorySet, CategorySource, Dialect, KeywordRule, MatchMode, Transaction,
    UNCATEGORIZED,
};
pub use normalize::{Normalizer, NormalizerRule};
pub use pipeline::{FileOutcome, InputFile, Pipeline, RunReport};
pub use remote::{RemoteClassifier, RemoteRequest, RemoteSettings};
