//! Deterministic keyword classification
//!
//! Rules are scanned in configured order and the first match wins.
//! Matching is always case-insensitive and runs against the cleaned
//! description.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{KeywordRule, MatchMode};

#[derive(Debug, Clone)]
enum Matcher {
    /// Uppercased alternatives (`A|B|C`)
    Contains(Vec<String>),
    Pattern(Regex),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: KeywordRule,
    matcher: Matcher,
}

impl CompiledRule {
    fn compile(rule: &KeywordRule) -> Result<Self> {
        if rule.pattern.split('|').all(|p| p.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Keyword rule for '{}' has an empty pattern",
                rule.category
            )));
        }
        let matcher = match rule.match_mode {
            MatchMode::Contains => Matcher::Contains(
                rule.pattern
                    .split('|')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_uppercase)
                    .collect(),
            ),
            MatchMode::Word => {
                let alternatives = rule
                    .pattern
                    .split('|')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join("|");
                Matcher::Pattern(
                    RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives))
                        .case_insensitive(true)
                        .build()?,
                )
            }
            MatchMode::Regex => Matcher::Pattern(
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()?,
            ),
        };
        // A pattern matching the empty string matches every description
        if let Matcher::Pattern(re) = &matcher {
            if re.is_match("") {
                return Err(Error::Config(format!(
                    "Keyword rule '{}' matches every description",
                    rule.pattern
                )));
            }
        }
        Ok(Self {
            rule: rule.clone(),
            matcher,
        })
    }

    fn matches(&self, description: &str, desc_upper: &str) -> bool {
        match &self.matcher {
            Matcher::Contains(patterns) => patterns.iter().any(|p| desc_upper.contains(p.as_str())),
            Matcher::Pattern(re) => re.is_match(description),
        }
    }
}

/// Ordered, compiled keyword rules
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<CompiledRule>,
}

impl KeywordClassifier {
    pub fn new(rules: &[KeywordRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category of the first rule matching `description`
    pub fn classify(&self, description: &str) -> Option<&str> {
        let desc_upper = description.to_uppercase();
        let hit = self
            .rules
            .iter()
            .find(|r| r.matches(description, &desc_upper))?;
        debug!(
            "Keyword rule '{}' ({}) matched '{}' -> {}",
            hit.rule.pattern,
            hit.rule.match_mode.as_str(),
            description,
            hit.rule.category
        );
        Some(hit.rule.category.as_str())
    }

    /// Every rule matching `description`, in configured order
    pub fn test(&self, description: &str) -> Vec<&KeywordRule> {
        let desc_upper = description.to_uppercase();
        self.rules
            .iter()
            .filter(|r| r.matches(description, &desc_upper))
            .map(|r| &r.rule)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(rules: &[(&str, &str, MatchMode)]) -> KeywordClassifier {
        let rules: Vec<KeywordRule> = rules
            .iter()
            .map(|(p, c, m)| KeywordRule::new(p, c, *m))
            .collect();
        KeywordClassifier::new(&rules).unwrap()
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let c = classifier(&[("coffee", "Dining", MatchMode::Contains)]);
        assert_eq!(c.classify("COFFEE SHOP"), Some("Dining"));
        assert_eq!(c.classify("Tea House"), None);
    }

    #[test]
    fn test_contains_pipe_alternatives() {
        let c = classifier(&[("migros|coop|aldi", "Groceries", MatchMode::Contains)]);
        assert_eq!(c.classify("Coop Pronto Bern"), Some("Groceries"));
        assert_eq!(c.classify("ALDI SUED"), Some("Groceries"));
        assert_eq!(c.classify("Lidl"), None);
    }

    #[test]
    fn test_word_mode_requires_word_boundaries() {
        let c = classifier(&[("bar", "Dining", MatchMode::Word)]);
        assert_eq!(c.classify("Hotel Bar Zurich"), Some("Dining"));
        assert_eq!(c.classify("BARBER SHOP"), None);
    }

    #[test]
    fn test_word_mode_escapes_pattern() {
        let c = classifier(&[("c.o", "Other", MatchMode::Word)]);
        assert_eq!(c.classify("c.o store"), Some("Other"));
        assert_eq!(c.classify("cxo store"), None);
    }

    #[test]
    fn test_regex_mode() {
        let c = classifier(&[(r"^sbb\s+\d+", "Transport", MatchMode::Regex)]);
        assert_eq!(c.classify("SBB 1234 Bern"), Some("Transport"));
        assert_eq!(c.classify("Ticket SBB 1234"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let c = classifier(&[
            ("shop", "Shopping", MatchMode::Contains),
            ("coffee", "Dining", MatchMode::Contains),
        ]);
        assert_eq!(c.classify("COFFEE SHOP"), Some("Shopping"));

        let c = classifier(&[
            ("coffee", "Dining", MatchMode::Contains),
            ("shop", "Shopping", MatchMode::Contains),
        ]);
        assert_eq!(c.classify("COFFEE SHOP"), Some("Dining"));
    }

    #[test]
    fn test_deterministic() {
        let c = classifier(&[
            ("netflix", "Subscriptions", MatchMode::Contains),
            ("net", "Utilities", MatchMode::Word),
        ]);
        let first = c.classify("NETFLIX.COM");
        for _ in 0..10 {
            assert_eq!(c.classify("NETFLIX.COM"), first);
        }
    }

    #[test]
    fn test_lists_all_matching_rules() {
        let c = classifier(&[
            ("shop", "Shopping", MatchMode::Contains),
            ("tea", "Dining", MatchMode::Contains),
            ("coffee", "Dining", MatchMode::Word),
        ]);
        let hits = c.test("Coffee Shop");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].category, "Shopping");
        assert_eq!(hits[1].pattern, "coffee");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let rules = vec![KeywordRule::new("([", "Other", MatchMode::Regex)];
        assert!(KeywordClassifier::new(&rules).is_err());
    }

    #[test]
    fn test_blank_patterns_rejected_in_every_mode() {
        for mode in [MatchMode::Contains, MatchMode::Word, MatchMode::Regex] {
            for pattern in ["", "   ", " | ", "|"] {
                let rules = vec![KeywordRule::new(pattern, "Dining", mode)];
                assert!(
                    KeywordClassifier::new(&rules).is_err(),
                    "{:?} {:?}",
                    mode,
                    pattern
                );
            }
        }
    }

    #[test]
    fn test_regex_matching_everything_rejected() {
        for pattern in [".*", "^", "x?"] {
            let rules = vec![KeywordRule::new(pattern, "Dining", MatchMode::Regex)];
            assert!(KeywordClassifier::new(&rules).is_err(), "{}", pattern);
        }
        // Blank alternatives next to a real one are ignored
        let c = classifier(&[("coffee | ", "Dining", MatchMode::Word)]);
        assert_eq!(c.classify("TOTALLY UNRELATED"), None);
        assert_eq!(c.classify("Coffee Bar"), Some("Dining"));
    }
}
