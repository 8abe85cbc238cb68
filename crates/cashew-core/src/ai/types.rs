//! Classification request/response types
//!
//! These types are backend-agnostic and shared by every AI implementation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sentinel answer meaning "no confident category"
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// One transaction as sent to the classification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationItem {
    /// Position within the batch
    pub id: usize,
    pub description: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// One entry of the service's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    /// Echo of the item id; entries are matched by position when absent
    #[serde(default)]
    pub id: Option<usize>,
    pub category: String,
}

/// Structured answer of the classification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub categorized_transactions: Vec<CategoryAssignment>,
}
