//! Cashew deep-link encoding
//!
//! A link is `<base>/addTransaction?JSON=<percent-encoded JSON>` where the
//! JSON document is `{"transactions": [...]}`. Output is deterministic:
//! fixed key order, amounts with exactly two decimals, dates as
//! `dd.mm.yyyy`, and everything outside the RFC 3986 unreserved set
//! percent-encoded.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{LinkConfig, DEFAULT_BASE_URL};
use crate::error::{Error, Result};
use crate::models::Transaction;

pub const DEFAULT_MAX_PER_LINK: usize = 50;

/// Link scheme version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkFormat {
    /// `addTransaction?JSON=` with dd.mm.yyyy dates
    #[default]
    V1,
}

impl LinkFormat {
    fn path(&self) -> &'static str {
        match self {
            Self::V1 => "addTransaction",
        }
    }

    fn query_key(&self) -> &'static str {
        match self {
            Self::V1 => "JSON",
        }
    }

    fn date_format(&self) -> &'static str {
        match self {
            Self::V1 => "%d.%m.%Y",
        }
    }
}

/// One transaction inside a link (field order is the wire order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub amount: String,
    pub title: String,
    pub date: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub transactions: Vec<LinkEntry>,
}

/// An encoded link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashewLink {
    /// Account of the entries (links built per account hold a single one)
    pub account: String,
    pub transactions: Vec<LinkEntry>,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct LinkEncoder {
    base_url: String,
    format: LinkFormat,
    max_per_link: usize,
}

impl Default for LinkEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MAX_PER_LINK)
    }
}

impl From<&LinkConfig> for LinkEncoder {
    fn from(config: &LinkConfig) -> Self {
        Self::new(&config.base_url, config.max_per_link)
    }
}

impl LinkEncoder {
    pub fn new(base_url: &str, max_per_link: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            format: LinkFormat::V1,
            max_per_link: max_per_link.max(1),
        }
    }

    pub fn format(&self) -> LinkFormat {
        self.format
    }

    /// Build the wire entry of one categorized transaction
    pub fn entry(&self, tx: &Transaction) -> Result<LinkEntry> {
        let title = tx.description();
        let category = tx.category().unwrap_or("");

        check_text("title", tx.source_line, title, true)?;
        check_text("category", tx.source_line, category, true)?;
        check_text("account", tx.source_line, &tx.account.name, false)?;

        Ok(LinkEntry {
            amount: format_amount(tx.amount),
            title: title.to_string(),
            date: tx.date.format(self.format.date_format()).to_string(),
            category: category.to_string(),
            account: tx.account.name.clone(),
        })
    }

    /// Encode transactions into a single link
    pub fn encode(&self, transactions: &[Transaction]) -> Result<CashewLink> {
        let entries = transactions
            .iter()
            .map(|tx| self.entry(tx))
            .collect::<Result<Vec<_>>>()?;

        let payload = LinkPayload {
            transactions: entries,
        };
        let json = serde_json::to_string(&payload)?;
        let url = format!(
            "{}/{}?{}={}",
            self.base_url,
            self.format.path(),
            self.format.query_key(),
            urlencoding::encode(&json)
        );
        debug!(
            "Encoded link with {} transactions ({} bytes)",
            payload.transactions.len(),
            url.len()
        );

        Ok(CashewLink {
            account: transactions
                .first()
                .map(|tx| tx.account.name.clone())
                .unwrap_or_default(),
            transactions: payload.transactions,
            url,
        })
    }

    /// Encode into links of at most `max_per_link` transactions each
    pub fn encode_chunked(&self, transactions: &[Transaction]) -> Result<Vec<CashewLink>> {
        transactions
            .chunks(self.max_per_link)
            .map(|chunk| self.encode(chunk))
            .collect()
    }

    /// One chunked link set per account, accounts in first-appearance order
    pub fn encode_by_account(&self, transactions: &[Transaction]) -> Result<Vec<CashewLink>> {
        let mut groups: Vec<(String, Vec<Transaction>)> = Vec::new();
        for tx in transactions {
            match groups.iter_mut().find(|(name, _)| *name == tx.account.name) {
                Some((_, group)) => group.push(tx.clone()),
                None => groups.push((tx.account.name.clone(), vec![tx.clone()])),
            }
        }

        let mut links = Vec::new();
        for (account, group) in &groups {
            let account_links = self.encode_chunked(group)?;
            info!(
                "Created {} links for {} transactions of account '{}'",
                account_links.len(),
                group.len(),
                account
            );
            links.extend(account_links);
        }
        Ok(links)
    }
}

/// Decode a link produced by [`LinkEncoder`]
pub fn decode_link(url: &str) -> Result<LinkPayload> {
    let (_, encoded) = url
        .split_once("?JSON=")
        .ok_or_else(|| Error::InvalidData(format!("Not a Cashew link: {}", url)))?;
    let json = urlencoding::decode(encoded)
        .map_err(|e| Error::InvalidData(format!("Invalid percent-encoding: {}", e)))?;
    Ok(serde_json::from_str(&json)?)
}

/// Two decimals, midpoint rounded away from zero
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    rounded.rescale(2);
    rounded.to_string()
}

fn check_text(field: &'static str, line: usize, value: &str, required: bool) -> Result<()> {
    if required && value.trim().is_empty() {
        return Err(Error::Encoding {
            field,
            line,
            reason: "empty".to_string(),
        });
    }
    if let Some(c) = value.chars().find(|c| c.is_control()) {
        return Err(Error::Encoding {
            field,
            line,
            reason: format!("contains control character U+{:04X}", c as u32),
        });
    }
    Ok(())
}
