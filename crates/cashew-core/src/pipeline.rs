//! End-to-end run over a set of input files
//!
//! Ingestion errors stay with their file and are reported in the
//! [`RunReport`]. Classification problems degrade to "Uncategorized".
//! Only an encoding error aborts the whole run.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::ai::{AIBackend, AIClient};
use crate::categorize::{CategorizationSummary, Categorizer};
use crate::config::Config;
use crate::error::Result;
use crate::import::{import_file, RowParseWarning};
use crate::keywords::KeywordClassifier;
use crate::link::{CashewLink, LinkEncoder};
use crate::models::{Account, Dialect, Transaction};
use crate::normalize::Normalizer;
use crate::remote::{RemoteClassifier, RemoteSettings};

/// One input file as read from disk
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Why the file could not be read; such a file fails on its own
    pub read_error: Option<String>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            read_error: None,
        }
    }

    pub fn unreadable(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: Vec::new(),
            read_error: Some(error.into()),
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file_name: String,
    pub dialect: Option<Dialect>,
    /// Transactions ingested
    pub transactions: usize,
    pub warnings: Vec<RowParseWarning>,
    /// Set when the file failed entirely
    pub error: Option<String>,
}

impl FileOutcome {
    fn failed(file_name: &str, error: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            dialect: None,
            transactions: 0,
            warnings: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub files: Vec<FileOutcome>,
    pub summary: CategorizationSummary,
    pub links: Vec<CashewLink>,
    /// All categorized transactions, in input order
    pub transactions: Vec<Transaction>,
}

impl RunReport {
    /// Whether any input file failed ingestion entirely
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileOutcome::is_failed)
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.is_failed())
    }

    pub fn succeeded_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.is_failed())
    }

    pub fn warning_count(&self) -> usize {
        self.files.iter().map(|f| f.warnings.len()).sum()
    }
}

pub struct Pipeline {
    accounts: Vec<Arc<Account>>,
    normalizer: Normalizer,
    categorizer: Categorizer,
    encoder: LinkEncoder,
}

impl Pipeline {
    pub fn new(
        accounts: Vec<Arc<Account>>,
        normalizer: Normalizer,
        categorizer: Categorizer,
        encoder: LinkEncoder,
    ) -> Self {
        Self {
            accounts,
            normalizer,
            categorizer,
            encoder,
        }
    }

    /// Build every stage from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote = AIClient::from_config(&config.classifier)?.map(|client| {
            info!(
                "Remote classification via {} at {}",
                client.model(),
                client.host()
            );
            RemoteClassifier::new(client, RemoteSettings::from(&config.classifier))
        });
        let categorizer =
            Categorizer::new(config.keyword_classifier()?, remote, config.category_set());

        Ok(Self::new(
            config.shared_accounts(),
            config.normalizer()?,
            categorizer,
            LinkEncoder::from(&config.link),
        ))
    }

    /// Replace the remote classifier's client
    pub fn with_client(self, client: AIClient, settings: RemoteSettings) -> Self {
        Self {
            categorizer: self
                .categorizer
                .with_remote(RemoteClassifier::new(client, settings)),
            ..self
        }
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn keywords(&self) -> &KeywordClassifier {
        self.categorizer.keywords()
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    pub async fn run(&self, inputs: &[InputFile]) -> Result<RunReport> {
        self.run_until(inputs, std::future::pending::<()>()).await
    }

    /// Run unless `cancel` completes during categorization
    pub async fn run_until<F>(&self, inputs: &[InputFile], cancel: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let mut files = Vec::with_capacity(inputs.len());
        let mut transactions = Vec::new();

        for input in inputs {
            if let Some(error) = &input.read_error {
                warn!("Skipping {}: {}", input.name, error);
                files.push(FileOutcome::failed(&input.name, error.clone()));
                continue;
            }
            match import_file(&input.name, &input.bytes, &self.accounts) {
                Ok(imported) => {
                    for warning in &imported.warnings {
                        warn!(
                            "{} line {}: {}",
                            imported.file_name, warning.line, warning.reason
                        );
                    }
                    info!(
                        "Imported {} transactions from {} ({})",
                        imported.transactions.len(),
                        imported.file_name,
                        imported.dialect
                    );
                    files.push(FileOutcome {
                        file_name: imported.file_name,
                        dialect: Some(imported.dialect),
                        transactions: imported.transactions.len(),
                        warnings: imported.warnings,
                        error: None,
                    });
                    transactions.extend(imported.transactions);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", input.name, e);
                    files.push(FileOutcome::failed(&input.name, e.to_string()));
                }
            }
        }

        self.normalizer.apply(&mut transactions);
        let summary = self
            .categorizer
            .categorize_until(&mut transactions, cancel)
            .await?;
        let links = self.encoder.encode_by_account(&transactions)?;

        Ok(RunReport {
            files,
            summary,
            links,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::{CategorySet, KeywordRule, MatchMode, UNCATEGORIZED};
    use crate::Error;

    const MIGROS: &str = "Kontonummer / IBAN:;CH12 3456 7890\n\
Datum;Buchungstext;Mitteilung;Referenznummer;Betrag;Saldo;Valuta\n\
01.04.2025;COFFEE SHOP;;1;-4,50;100,00;01.04.2025\n\
02.04.2025;Bakery;;2;-3,20;96,80;02.04.2025\n";

    fn pipeline(client: Option<AIClient>) -> Pipeline {
        let accounts = vec![Arc::new(Account::new("Migros", "CH1234567890", 1.0))];
        let keywords =
            KeywordClassifier::new(&[KeywordRule::new("coffee", "Dining", MatchMode::Contains)])
                .unwrap();
        let remote = client.map(|c| {
            RemoteClassifier::new(
                c,
                RemoteSettings {
                    retry_backoff: std::time::Duration::from_millis(1),
                    ..RemoteSettings::default()
                },
            )
        });
        Pipeline::new(
            accounts,
            Normalizer::with_default_rules().unwrap(),
            Categorizer::new(
                keywords,
                remote,
                CategorySet::from_names(&["Dining", "Groceries"]),
            ),
            LinkEncoder::default(),
        )
    }

    #[tokio::test]
    async fn test_run_single_file() {
        let mock = MockBackend::new().with_rule("bakery", "Groceries");
        let report = pipeline(Some(AIClient::Mock(mock)))
            .run(&[InputFile::new("bookings-export.csv", MIGROS)])
            .await
            .unwrap();

        assert!(!report.has_failures());
        assert_eq!(report.files[0].dialect, Some(Dialect::Migrosbank));
        assert_eq!(report.files[0].transactions, 2);
        assert_eq!(report.summary.by_keyword, 1);
        assert_eq!(report.summary.by_remote, 1);
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].account, "Migros");
        assert_eq!(report.links[0].transactions[1].category, "Groceries");
    }

    #[tokio::test]
    async fn test_failed_file_is_isolated() {
        let report = pipeline(None)
            .run(&[
                InputFile::new("random.csv", "a,b,c\n1,2,3\n"),
                InputFile::new("bookings-export.csv", MIGROS),
            ])
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_eq!(report.failed_files().count(), 1);
        assert_eq!(report.succeeded_files().count(), 1);
        assert!(report.files[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Could not detect bank format"));
        assert_eq!(report.transactions.len(), 2);
        assert_eq!(report.transactions[1].category(), Some(UNCATEGORIZED));
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_alone() {
        let report = pipeline(None)
            .run(&[
                InputFile::unreadable("locked.csv", "Permission denied"),
                InputFile::new("bookings-export.csv", MIGROS),
            ])
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_eq!(report.files[0].file_name, "locked.csv");
        assert_eq!(report.files[0].error.as_deref(), Some("Permission denied"));
        assert_eq!(report.files[1].transactions, 2);
        assert_eq!(report.links.len(), 1);
    }

    #[tokio::test]
    async fn test_no_input_no_links() {
        let report = pipeline(None).run(&[]).await.unwrap();
        assert!(report.links.is_empty());
        assert_eq!(report.summary.total(), 0);
    }

    #[tokio::test]
    async fn test_encoding_error_aborts_run() {
        let bad = MIGROS.replace("Bakery", "Bak\u{1}ery");
        let err = pipeline(None)
            .run(&[InputFile::new("bookings-export.csv", bad)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoding { field: "title", .. }));
    }

    #[tokio::test]
    async fn test_with_client_replaces_remote() {
        let mock = MockBackend::new().with_rule("bakery", "Groceries");
        let report = pipeline(None)
            .with_client(AIClient::Mock(mock.clone()), RemoteSettings::default())
            .run(&[InputFile::new("bookings-export.csv", MIGROS)])
            .await
            .unwrap();
        assert_eq!(report.summary.by_remote, 1);
        assert_eq!(mock.calls(), 1);
    }
}
