//! Two-tier categorization
//!
//! Every transaction walks a small state machine:
//!
//! ```text
//! Unclassified ──keyword hit──▶ KeywordMatched ──▶ Resolved(Keyword)
//!      │
//!      └──no hit──▶ RemoteCandidate ──valid answer──▶ Resolved(Remote)
//!                                  └─anything else──▶ Resolved(Fallback)
//! ```
//!
//! Each tier is tried at most once per transaction. Categories are written
//! to the transactions only after every tier has finished, so a cancelled
//! run leaves its input untouched.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::keywords::KeywordClassifier;
use crate::models::{CategorySet, CategorySource, Transaction, UNCATEGORIZED};
use crate::remote::{RemoteClassifier, RemoteRequest};

/// Per-transaction progress through the tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationState {
    Unclassified,
    KeywordMatched(String),
    RemoteCandidate,
    Resolved {
        category: String,
        source: CategorySource,
    },
}

/// Counts per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorizationSummary {
    pub by_keyword: usize,
    pub by_remote: usize,
    pub uncategorized: usize,
}

impl CategorizationSummary {
    pub fn total(&self) -> usize {
        self.by_keyword + self.by_remote + self.uncategorized
    }

    fn record(&mut self, source: CategorySource) {
        match source {
            CategorySource::Keyword => self.by_keyword += 1,
            CategorySource::Remote => self.by_remote += 1,
            CategorySource::Fallback => self.uncategorized += 1,
        }
    }
}

pub struct Categorizer {
    keywords: KeywordClassifier,
    remote: Option<RemoteClassifier>,
    categories: Arc<CategorySet>,
}

impl Categorizer {
    /// Without a remote classifier, keyword misses resolve straight to "Uncategorized"
    pub fn new(
        keywords: KeywordClassifier,
        remote: Option<RemoteClassifier>,
        categories: CategorySet,
    ) -> Self {
        Self {
            keywords,
            remote,
            categories: Arc::new(categories),
        }
    }

    pub fn with_remote(self, remote: RemoteClassifier) -> Self {
        Self {
            remote: Some(remote),
            ..self
        }
    }

    pub fn keywords(&self) -> &KeywordClassifier {
        &self.keywords
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Categorize all transactions
    pub async fn categorize(
        &self,
        transactions: &mut [Transaction],
    ) -> Result<CategorizationSummary> {
        self.categorize_until(transactions, std::future::pending::<()>())
            .await
    }

    /// Categorize unless `cancel` completes first
    ///
    /// On cancellation in-flight remote batches are aborted, no transaction
    /// is modified and `Error::Cancelled` is returned. Transactions that
    /// already carry a category are left alone and not counted.
    pub async fn categorize_until<F>(
        &self,
        transactions: &mut [Transaction],
        cancel: F,
    ) -> Result<CategorizationSummary>
    where
        F: Future<Output = ()>,
    {
        // Keyword tier
        let mut states: Vec<ClassificationState> = transactions
            .iter()
            .map(|tx| {
                if let Some(category) = tx.category() {
                    return ClassificationState::Resolved {
                        category: category.to_string(),
                        source: CategorySource::Keyword,
                    };
                }
                match self.keywords.classify(tx.description()) {
                    Some(category) => ClassificationState::KeywordMatched(category.to_string()),
                    None => ClassificationState::RemoteCandidate,
                }
            })
            .collect();
        let preset: Vec<bool> = transactions.iter().map(|tx| tx.is_categorized()).collect();

        for state in states.iter_mut() {
            if let ClassificationState::KeywordMatched(category) = state {
                *state = ClassificationState::Resolved {
                    category: std::mem::take(category),
                    source: CategorySource::Keyword,
                };
            }
        }

        // Remote tier
        let candidates: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ClassificationState::RemoteCandidate)
            .map(|(i, _)| i)
            .collect();

        let verdicts: Vec<Option<String>> = match (&self.remote, candidates.is_empty()) {
            (Some(remote), false) => {
                let requests: Vec<RemoteRequest> = candidates
                    .iter()
                    .map(|&i| RemoteRequest {
                        description: transactions[i].description().to_string(),
                        amount: transactions[i].amount,
                        date: transactions[i].date,
                    })
                    .collect();
                tokio::select! {
                    verdicts = remote.classify(&requests, &self.categories) => verdicts,
                    _ = cancel => {
                        info!("Categorization cancelled, discarding results");
                        return Err(Error::Cancelled);
                    }
                }
            }
            _ => vec![None; candidates.len()],
        };

        for (&i, verdict) in candidates.iter().zip(verdicts) {
            states[i] = match verdict {
                Some(category) if self.categories.contains(&category) => {
                    ClassificationState::Resolved {
                        category,
                        source: CategorySource::Remote,
                    }
                }
                _ => ClassificationState::Resolved {
                    category: UNCATEGORIZED.to_string(),
                    source: CategorySource::Fallback,
                },
            };
        }

        // Commit
        let mut summary = CategorizationSummary::default();
        for ((tx, state), was_preset) in transactions.iter_mut().zip(states).zip(preset) {
            if was_preset {
                continue;
            }
            match state {
                ClassificationState::Resolved { category, source } => {
                    debug!(
                        "'{}' -> {} ({})",
                        tx.description(),
                        category,
                        source.as_str()
                    );
                    tx.assign_category(&category)?;
                    summary.record(source);
                }
                other => {
                    return Err(Error::InvalidData(format!(
                        "Transaction on line {} left in state {:?}",
                        tx.source_line, other
                    )))
                }
            }
        }

        info!(
            "Categorized {} transactions: {} by keyword, {} by classifier, {} uncategorized",
            summary.total(),
            summary.by_keyword,
            summary.by_remote,
            summary.uncategorized
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIClient, MockBackend};
    use crate::models::{Account, KeywordRule, MatchMode};
    use crate::remote::RemoteSettings;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn tx(description: &str) -> Transaction {
        let mut tx = Transaction::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            Decimal::new(-500, 2),
            description.to_string(),
            Arc::new(Account::new("Main", "1", 1.0)),
            1,
        );
        tx.set_clean_description(description.to_string());
        tx
    }

    fn keywords() -> KeywordClassifier {
        KeywordClassifier::new(&[KeywordRule::new("coffee", "Dining", MatchMode::Contains)])
            .unwrap()
    }

    fn categories() -> CategorySet {
        CategorySet::from_names(&["Dining", "Groceries"])
    }

    fn remote(mock: MockBackend) -> RemoteClassifier {
        RemoteClassifier::new(
            AIClient::Mock(mock),
            RemoteSettings {
                retry_backoff: Duration::from_millis(1),
                ..RemoteSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_keyword_then_remote() {
        let mock = MockBackend::new().with_rule("supermarket", "Groceries");
        let categorizer = Categorizer::new(keywords(), Some(remote(mock.clone())), categories());
        let mut txs = vec![tx("COFFEE SHOP"), tx("SUPERMARKET XYZ")];

        let summary = categorizer.categorize(&mut txs).await.unwrap();
        assert_eq!(txs[0].category(), Some("Dining"));
        assert_eq!(txs[1].category(), Some("Groceries"));
        assert_eq!(
            summary,
            CategorizationSummary {
                by_keyword: 1,
                by_remote: 1,
                uncategorized: 0
            }
        );

        // Keyword hits are never sent
        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 1);
        assert_eq!(sent[0][0].description, "SUPERMARKET XYZ");
    }

    #[tokio::test]
    async fn test_every_transaction_gets_a_category() {
        let mock = MockBackend::new().with_rule("market", "Groceries");
        let categorizer = Categorizer::new(keywords(), Some(remote(mock)), categories());
        let mut txs: Vec<Transaction> = ["coffee", "market", "???", "", "Café"]
            .iter()
            .map(|d| tx(d))
            .collect();

        let summary = categorizer.categorize(&mut txs).await.unwrap();
        assert!(txs.iter().all(|t| t.is_categorized()));
        assert!(txs
            .iter()
            .all(|t| categorizer.categories().contains(t.category().unwrap())));
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.uncategorized, 3);
    }

    #[tokio::test]
    async fn test_without_remote_misses_are_uncategorized() {
        let categorizer = Categorizer::new(keywords(), None, categories());
        let mut txs = vec![tx("coffee"), tx("SUPERMARKET")];

        let summary = categorizer.categorize(&mut txs).await.unwrap();
        assert_eq!(txs[1].category(), Some(UNCATEGORIZED));
        assert_eq!(summary.by_keyword, 1);
        assert_eq!(summary.uncategorized, 1);
        assert!(!categorizer.has_remote());
    }

    #[tokio::test]
    async fn test_remote_failure_never_aborts() {
        let mock = MockBackend::new().with_rule("", "Groceries").failing();
        let categorizer = Categorizer::new(keywords(), Some(remote(mock)), categories());
        let mut txs = vec![tx("A"), tx("B"), tx("C")];

        let summary = categorizer.categorize(&mut txs).await.unwrap();
        assert!(txs.iter().all(|t| t.category() == Some(UNCATEGORIZED)));
        assert_eq!(summary.uncategorized, 3);
    }

    #[tokio::test]
    async fn test_precategorized_transactions_untouched() {
        let mock = MockBackend::new().with_rule("coffee", "Groceries");
        let categorizer = Categorizer::new(keywords(), Some(remote(mock.clone())), categories());
        let mut done = tx("coffee");
        done.assign_category("Groceries").unwrap();
        let mut txs = vec![done, tx("coffee")];

        let summary = categorizer.categorize(&mut txs).await.unwrap();
        assert_eq!(txs[0].category(), Some("Groceries"));
        assert_eq!(txs[1].category(), Some("Dining"));
        assert_eq!(summary.total(), 1);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_discards_results() {
        let mock = MockBackend::new()
            .with_rule("market", "Groceries")
            .with_delay(Duration::from_secs(5));
        let categorizer = Categorizer::new(keywords(), Some(remote(mock)), categories());
        let mut txs = vec![tx("coffee"), tx("market")];

        let result = categorizer
            .categorize_until(&mut txs, tokio::time::sleep(Duration::from_millis(10)))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        // Even the keyword hit was not committed
        assert!(txs.iter().all(|t| !t.is_categorized()));
    }
}
