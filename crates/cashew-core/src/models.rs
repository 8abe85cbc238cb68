//! Domain models for cashew-import

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category assigned when no classifier produced a valid answer
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A configured bank account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Display name, also used as the Cashew account name
    pub name: String,
    /// Account number, IBAN or card number as printed in the export
    pub number: String,
    /// Preferred when several accounts match a file equally well
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Account {
    pub fn new(name: &str, number: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            number: number.to_string(),
            weight,
        }
    }
}

/// Supported bank export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// DKB Girokonto "Umsatzliste" export
    Dkb,
    /// Migros Bank "bookings-export"
    Migrosbank,
    /// Capital One card export (separate Debit/Credit columns)
    CapitalOne,
}

impl Dialect {
    /// Detection order: filename conventions first, then header signatures
    pub const ALL: [Dialect; 3] = [Dialect::Dkb, Dialect::Migrosbank, Dialect::CapitalOne];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dkb => "dkb",
            Self::Migrosbank => "migrosbank",
            Self::CapitalOne => "capitalone",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dkb" => Ok(Self::Dkb),
            "migrosbank" | "migros" => Ok(Self::Migrosbank),
            "capitalone" | "capital_one" => Ok(Self::CapitalOne),
            _ => Err(format!("Unknown bank format: {}", s)),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transaction flowing through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    /// Negative = debit, positive = credit
    pub amount: Decimal,
    pub raw_description: String,
    clean_description: Option<String>,
    pub account: Arc<Account>,
    category: Option<String>,
    /// 1-based line in the source file
    pub source_line: usize,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        amount: Decimal,
        raw_description: String,
        account: Arc<Account>,
        source_line: usize,
    ) -> Self {
        Self {
            date,
            amount,
            raw_description,
            clean_description: None,
            account,
            category: None,
            source_line,
        }
    }

    /// Cleaned description, or the raw one if the normalizer has not run
    pub fn description(&self) -> &str {
        self.clean_description
            .as_deref()
            .unwrap_or(&self.raw_description)
    }

    pub fn clean_description(&self) -> Option<&str> {
        self.clean_description.as_deref()
    }

    pub fn set_clean_description(&mut self, clean: String) {
        self.clean_description = Some(clean);
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    /// Set the category. A category can only be assigned once.
    pub fn assign_category(&mut self, category: &str) -> Result<()> {
        if let Some(existing) = &self.category {
            return Err(Error::AlreadyCategorized {
                line: self.source_line,
                category: existing.clone(),
            });
        }
        self.category = Some(category.to_string());
        Ok(())
    }
}

/// How a keyword rule pattern is matched against a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive substring match
    #[default]
    Contains,
    /// Case-insensitive whole-word match
    Word,
    /// Case-insensitive regular expression
    Regex,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Word => "word",
            Self::Regex => "regex",
        }
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" | "substring" => Ok(Self::Contains),
            "word" | "whole_word" => Ok(Self::Word),
            "regex" => Ok(Self::Regex),
            _ => Err(format!("Unknown match mode: {}", s)),
        }
    }
}

/// A user-defined keyword → category rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub pattern: String,
    pub category: String,
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl KeywordRule {
    pub fn new(pattern: &str, category: &str, match_mode: MatchMode) -> Self {
        Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
            match_mode,
        }
    }
}

/// A valid category and its prompt hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub hint: Option<String>,
}

/// The fixed set of categories a transaction may end up in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    categories: Vec<Category>,
}

impl CategorySet {
    /// Build a set from configured categories. "Uncategorized" is always a member.
    pub fn new(mut categories: Vec<Category>) -> Self {
        if !categories.iter().any(|c| c.name == UNCATEGORIZED) {
            categories.push(Category {
                name: UNCATEGORIZED.to_string(),
                hint: None,
            });
        }
        Self { categories }
    }

    /// Convenience constructor without hints
    pub fn from_names(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|n| Category {
                    name: n.to_string(),
                    hint: None,
                })
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Which tier produced a transaction's category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    /// Matched a configured keyword rule
    Keyword,
    /// Assigned by the remote classifier
    Remote,
    /// Degraded to "Uncategorized"
    Fallback,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Remote => "remote",
            Self::Fallback => "fallback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            Decimal::new(-1234, 2),
            "COFFEE SHOP".to_string(),
            Arc::new(Account::new("Main", "CH123", 1.0)),
            2,
        )
    }

    #[test]
    fn test_description_falls_back_to_raw() {
        let mut tx = sample();
        assert_eq!(tx.description(), "COFFEE SHOP");
        assert!(tx.clean_description().is_none());

        tx.set_clean_description("Coffee".to_string());
        assert_eq!(tx.description(), "Coffee");
    }

    #[test]
    fn test_category_assigned_once() {
        let mut tx = sample();
        tx.assign_category("Dining").unwrap();
        assert_eq!(tx.category(), Some("Dining"));

        let err = tx.assign_category("Groceries").unwrap_err();
        assert!(matches!(err, Error::AlreadyCategorized { line: 2, .. }));
        assert_eq!(tx.category(), Some("Dining"));
    }

    #[test]
    fn test_category_set_always_has_uncategorized() {
        let set = CategorySet::from_names(&["Dining", "Groceries"]);
        assert!(set.contains(UNCATEGORIZED));
        assert_eq!(set.len(), 3);

        let set = CategorySet::from_names(&["Uncategorized", "Dining"]);
        assert_eq!(set.names(), vec!["Uncategorized", "Dining"]);
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("DKB".parse::<Dialect>().unwrap(), Dialect::Dkb);
        assert_eq!("migros".parse::<Dialect>().unwrap(), Dialect::Migrosbank);
        assert_eq!(
            "capital_one".parse::<Dialect>().unwrap(),
            Dialect::CapitalOne
        );
        assert!("chase".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_match_mode_from_str() {
        assert_eq!("word".parse::<MatchMode>().unwrap(), MatchMode::Word);
        assert_eq!("REGEX".parse::<MatchMode>().unwrap(), MatchMode::Regex);
        assert_eq!(MatchMode::default(), MatchMode::Contains);
    }
}
