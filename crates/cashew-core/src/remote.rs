//! Batched remote classification
//!
//! Candidates are deduplicated, split into batches and sent concurrently
//! (bounded by a semaphore). A failed batch is retried once after a
//! backoff; if the retry fails too, every transaction of that batch degrades
//! to "Uncategorized". Answers are checked against the category set and
//! merged back by index, so completion order never matters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient, CategoryAssignment, ClassificationItem, UNKNOWN_CATEGORY};
use crate::config::ClassifierConfig;
use crate::error::Error;
use crate::models::{CategorySet, UNCATEGORIZED};

/// Batching and retry knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSettings {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub retry_backoff: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 4,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&ClassifierConfig> for RemoteSettings {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// What gets sent for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRequest {
    pub description: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

#[derive(Clone)]
pub struct RemoteClassifier {
    client: AIClient,
    settings: RemoteSettings,
}

impl RemoteClassifier {
    pub fn new(client: AIClient, settings: RemoteSettings) -> Self {
        Self { client, settings }
    }

    /// Classify every request
    ///
    /// Returns one entry per request, in request order: `Some(category)` for
    /// a valid answer, `None` when the transaction must degrade. Never fails.
    pub async fn classify(
        &self,
        requests: &[RemoteRequest],
        categories: &Arc<CategorySet>,
    ) -> Vec<Option<String>> {
        if requests.is_empty() {
            return Vec::new();
        }

        // Identical requests are sent once
        let mut unique: Vec<&RemoteRequest> = Vec::new();
        let mut positions: HashMap<&RemoteRequest, usize> = HashMap::new();
        let slots: Vec<usize> = requests
            .iter()
            .map(|r| {
                *positions.entry(r).or_insert_with(|| {
                    unique.push(r);
                    unique.len() - 1
                })
            })
            .collect();

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = unique.len().div_ceil(batch_size);
        info!(
            "Classifying {} transactions ({} unique) in {} batches via {} ({})",
            requests.len(),
            unique.len(),
            batch_count,
            self.client.host(),
            self.client.model()
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (batch_no, chunk) in unique.chunks(batch_size).enumerate() {
            let start = batch_no * batch_size;
            let items: Vec<ClassificationItem> = chunk
                .iter()
                .enumerate()
                .map(|(id, r)| ClassificationItem {
                    id,
                    description: r.description.clone(),
                    amount: r.amount,
                    date: r.date,
                })
                .collect();
            let client = self.client.clone();
            let categories = Arc::clone(categories);
            let semaphore = Arc::clone(&semaphore);
            let backoff = self.settings.retry_backoff;

            tasks.spawn(async move {
                let verdicts = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        classify_with_retry(&client, &items, &categories, backoff, batch_no).await
                    }
                    Err(_) => vec![None; items.len()],
                };
                (start, verdicts)
            });
        }

        let mut verdicts: Vec<Option<String>> = vec![None; unique.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((start, batch)) => {
                    for (offset, verdict) in batch.into_iter().enumerate() {
                        if let Some(slot) = verdicts.get_mut(start + offset) {
                            *slot = verdict;
                        }
                    }
                }
                Err(e) => warn!("Classification task aborted: {}", e),
            }
        }

        slots.into_iter().map(|i| verdicts[i].clone()).collect()
    }
}

async fn classify_with_retry(
    client: &AIClient,
    items: &[ClassificationItem],
    categories: &CategorySet,
    backoff: Duration,
    batch_no: usize,
) -> Vec<Option<String>> {
    let answer = match client.classify_batch(items, categories).await {
        Ok(answer) => Ok(answer),
        Err(e) => {
            warn!(
                "Batch {} failed, retrying in {}ms: {}",
                batch_no,
                backoff.as_millis(),
                e
            );
            tokio::time::sleep(backoff).await;
            client.classify_batch(items, categories).await
        }
    };

    match answer {
        Ok(assignments) => validate_assignments(items, &assignments, categories),
        Err(e) => {
            let err = Error::RemoteClassification(format!("batch {}: {}", batch_no, e));
            warn!(
                "{}; {} transactions degrade to {}",
                err,
                items.len(),
                UNCATEGORIZED
            );
            vec![None; items.len()]
        }
    }
}

/// Match answers to items and keep only categories from the set
///
/// Entries are matched by id when every entry carries one, else by
/// position. Missing entries, "unknown" and categories outside the set
/// degrade.
fn validate_assignments(
    items: &[ClassificationItem],
    assignments: &[CategoryAssignment],
    categories: &CategorySet,
) -> Vec<Option<String>> {
    let by_id: Option<HashMap<usize, &CategoryAssignment>> =
        if !assignments.is_empty() && assignments.iter().all(|a| a.id.is_some()) {
            let mut map = HashMap::new();
            for a in assignments {
                if let Some(id) = a.id {
                    map.entry(id).or_insert(a);
                }
            }
            Some(map)
        } else {
            None
        };

    if by_id.is_none() && assignments.len() != items.len() {
        warn!(
            "Classifier returned {} entries for {} transactions",
            assignments.len(),
            items.len()
        );
    }

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let entry = match &by_id {
                Some(map) => map.get(&item.id).copied(),
                None => assignments.get(position),
            };
            let Some(entry) = entry else {
                warn!("No classifier answer for '{}'", item.description);
                return None;
            };

            let category = entry.category.trim();
            if category.eq_ignore_ascii_case(UNKNOWN_CATEGORY) || category == UNCATEGORIZED {
                debug!("Classifier unsure about '{}'", item.description);
                None
            } else if categories.contains(category) {
                debug!("Classifier: '{}' -> {}", item.description, category);
                Some(category.to_string())
            } else {
                let err = Error::InvalidCategoryResponse(category.to_string());
                warn!("{} for '{}'", err, item.description);
                None
            }
        })
        .collect()
}
