//! Mock backend for testing
//!
//! Answers from a list of substring rules instead of a model, and can be
//! told to fail, to drop entries or to be slow. Useful for unit tests and
//! development without a running LLM server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::CategorySet;

use super::types::{CategoryAssignment, ClassificationItem, UNKNOWN_CATEGORY};
use super::AIBackend;

/// Mock AI backend for testing
///
/// Clones share call counters and the request log.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Uppercased substring → category, first match wins
    rules: Vec<(String, String)>,
    /// Calls that should fail before answers succeed (`usize::MAX` = always)
    failures_left: Arc<AtomicUsize>,
    /// Items whose description contains one of these get no entry
    omit: Vec<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<ClassificationItem>>>>,
}

impl MockBackend {
    /// Create a mock that answers "unknown" to everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `category` for descriptions containing `pattern` (case-insensitive)
    pub fn with_rule(mut self, pattern: &str, category: &str) -> Self {
        self.rules
            .push((pattern.to_uppercase(), category.to_string()));
        self
    }

    /// Fail every call
    pub fn failing(self) -> Self {
        self.failing_times(usize::MAX)
    }

    /// Fail the first `n` calls
    pub fn failing_times(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Leave out the entry of items whose description contains `pattern`
    pub fn omitting(mut self, pattern: &str) -> Self {
        self.omit.push(pattern.to_uppercase());
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `classify_batch` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every batch received, in arrival order
    pub fn requests(&self) -> Vec<Vec<ClassificationItem>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn category_for(&self, description: &str) -> &str {
        let upper = description.to_uppercase();
        self.rules
            .iter()
            .find(|(pattern, _)| upper.contains(pattern.as_str()))
            .map(|(_, category)| category.as_str())
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn classify_batch(
        &self,
        items: &[ClassificationItem],
        _categories: &CategorySet,
    ) -> Result<Vec<CategoryAssignment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(items.to_vec());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(Error::InvalidData("mock backend failure".into()));
        }

        Ok(items
            .iter()
            .filter(|item| {
                let upper = item.description.to_uppercase();
                !self.omit.iter().any(|p| upper.contains(p.as_str()))
            })
            .map(|item| CategoryAssignment {
                id: Some(item.id),
                category: self.category_for(&item.description).to_string(),
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn item(id: usize, description: &str) -> ClassificationItem {
        ClassificationItem {
            id,
            description: description.to_string(),
            amount: Decimal::new(-100, 2),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_rules_and_unknown() {
        let mock = MockBackend::new().with_rule("market", "Groceries");
        let categories = CategorySet::from_names(&["Groceries"]);
        let answer = mock
            .classify_batch(&[item(0, "SUPERMARKET 42"), item(1, "???")], &categories)
            .await
            .unwrap();
        assert_eq!(answer[0].category, "Groceries");
        assert_eq!(answer[1].category, UNKNOWN_CATEGORY);
        assert_eq!(answer[1].id, Some(1));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_times() {
        let mock = MockBackend::new().failing_times(1);
        let categories = CategorySet::from_names(&[]);
        assert!(mock.classify_batch(&[item(0, "A")], &categories).await.is_err());
        assert!(mock.classify_batch(&[item(0, "A")], &categories).await.is_ok());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_always() {
        let mock = MockBackend::new().failing();
        let categories = CategorySet::from_names(&[]);
        for _ in 0..3 {
            assert!(mock.classify_batch(&[item(0, "A")], &categories).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_omitting_and_request_log() {
        let mock = MockBackend::new().omitting("drop");
        let categories = CategorySet::from_names(&[]);
        let answer = mock
            .classify_batch(&[item(0, "keep"), item(1, "DROP me")], &categories)
            .await
            .unwrap();
        assert_eq!(answer.len(), 1);
        assert_eq!(mock.clone().requests()[0].len(), 2);
    }
}
