//! Description cleanup
//!
//! Bank descriptions carry timestamps, masked card numbers and reference
//! noise that only confuse the classifiers. The normalizer strips them with
//! an ordered list of regex rules and collapses whitespace.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Passes allowed beyond one per character of input
const EXTRA_PASSES: usize = 8;

/// Rules applied when the configuration lists none
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    (r"\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}", ""),
    (r"Karte: \d+\*+\d+", ""),
    (r"Betrag: [A-Z]{3} \d+\.\d+", ""),
    (r"^Einkauf\s+", ""),
    (r"\d+/PP\.\d+\.PP/\.", ""),
    (r"Ihr Einkauf bei", ""),
];

/// A `(pattern, replacement)` pair as written in the configuration
///
/// The replacement may reference capture groups (`$1`) and may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

impl NormalizerRule {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<(Regex, String)>,
}

impl Normalizer {
    /// Compile the rules. Invalid patterns are rejected here, never at use.
    ///
    /// A pattern that matches the empty string with a non-empty replacement
    /// inserts text on every pass and never settles, so it is rejected too.
    pub fn new(rules: &[NormalizerRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|r| -> Result<(Regex, String)> {
                let re = Regex::new(&r.pattern)?;
                if re.is_match("") && !r.replacement.is_empty() {
                    return Err(Error::Config(format!(
                        "Normalizer rule '{}' matches empty text and would grow it forever",
                        r.pattern
                    )));
                }
                Ok((re, r.replacement.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn default_rules() -> Vec<NormalizerRule> {
        DEFAULT_RULES
            .iter()
            .map(|(p, r)| NormalizerRule::new(p, r))
            .collect()
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&Self::default_rules())
    }

    /// Clean a description
    ///
    /// Rules are re-applied until the text stops changing, so the result is
    /// a fixed point: `normalize(normalize(d)) == normalize(d)`.
    ///
    /// Rules that shorten the text settle within one pass per character.
    /// Only rule sets that rewrite text in a cycle reach the pass limit.
    pub fn normalize(&self, text: &str) -> String {
        let limit = text.chars().count() + self.rules.len() + EXTRA_PASSES;
        let mut current = self.single_pass(text);
        for _ in 1..limit {
            let next = self.single_pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
        warn!(
            "Normalizer rules did not settle on '{}' after {} passes",
            text, limit
        );
        current
    }

    fn single_pass(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, replacement) in &self.rules {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        collapse_whitespace(&out)
    }

    /// Set `clean_description` on every transaction
    pub fn apply(&self, transactions: &mut [Transaction]) {
        for tx in transactions.iter_mut() {
            let clean = self.normalize(&tx.raw_description);
            if clean != tx.raw_description {
                debug!("Cleaned '{}' -> '{}'", tx.raw_description, clean);
            }
            tx.set_clean_description(clean);
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
