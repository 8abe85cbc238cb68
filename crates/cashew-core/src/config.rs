//! Configuration loading and validation
//!
//! Everything lives in one TOML file (default `config/cashew.toml`, else
//! `<config dir>/cashew-import/cashew.toml`). The file is parsed, overridden
//! from the environment and validated once; afterwards the configuration is
//! read-only.
//!
//! ```toml
//! [[accounts]]
//! name = "DKB Giro"
//! number = "DE12 3456 7890 1234 5678 90"
//! weight = 1.0
//!
//! [[categories]]
//! name = "Groceries"
//! hint = "Supermarkets like Migros, Coop, Aldi"
//!
//! [[keyword_rules]]
//! pattern = "migros|coop"
//! category = "Groceries"
//!
//! [classifier]
//! backend = "openai_compatible"
//! api_key = "sk-..."
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::keywords::KeywordClassifier;
use crate::models::{Account, Category, CategorySet, KeywordRule};
use crate::normalize::{Normalizer, NormalizerRule};

/// Config file location relative to the working directory
pub const LOCAL_CONFIG_PATH: &str = "config/cashew.toml";

/// Host used when only an API key is configured
pub const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";

pub const DEFAULT_BASE_URL: &str = "https://cashewapp.web.app";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub accounts: Vec<Account>,
    pub categories: Vec<Category>,
    pub keyword_rules: Vec<KeywordRule>,
    pub normalizer: NormalizerConfig,
    pub classifier: ClassifierConfig,
    pub link: LinkConfig,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Applied in order; the built-in cleanup rules are used when empty
    pub rules: Vec<NormalizerRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// openai_compatible | mock | none
    pub backend: String,
    pub host: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    /// Maximum transactions per request
    pub batch_size: usize,
    /// Maximum requests in flight
    pub max_concurrency: usize,
    /// Wait before the single retry of a failed batch
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: "openai_compatible".to_string(),
            host: None,
            model: "gpt-4.1-nano".to_string(),
            api_key: None,
            batch_size: 50,
            max_concurrency: 4,
            retry_backoff_ms: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_url: String,
    /// Transactions per link
    pub max_per_link: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_per_link: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub sender: String,
    pub recipient: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    pub smtp: SmtpConfig,
}

fn default_subject() -> String {
    "Your Cashew App Links".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Config {
    /// Load, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(
            "Loaded config from {}: {} accounts, {} categories, {} keyword rules",
            path.display(),
            config.accounts.len(),
            config.categories.len(),
            config.keyword_rules.len()
        );
        Ok(config)
    }

    /// Parse and validate without consulting the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `config/cashew.toml` if present, else the platform config directory
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG_PATH);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("cashew-import").join("cashew.toml"))
            .unwrap_or(local)
    }

    /// Override classifier settings from `AI_BACKEND` and `OPENAI_COMPATIBLE_*`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("AI_BACKEND") {
            self.classifier.backend = backend;
        }
        if let Some(host) = lookup("OPENAI_COMPATIBLE_HOST") {
            self.classifier.host = Some(host);
        }
        if let Some(model) = lookup("OPENAI_COMPATIBLE_MODEL") {
            self.classifier.model = model;
        }
        if let Some(api_key) = lookup("OPENAI_COMPATIBLE_API_KEY") {
            self.classifier.api_key = Some(api_key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(Error::Config("No accounts configured".into()));
        }
        for account in &self.accounts {
            if account.name.trim().is_empty() || account.number.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Account '{}' needs a name and a number",
                    account.name
                )));
            }
            if !account.weight.is_finite() || account.weight <= 0.0 {
                return Err(Error::Config(format!(
                    "Account '{}' has invalid weight {}",
                    account.name, account.weight
                )));
            }
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(Error::Config("Category with empty name".into()));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate category '{}'",
                    category.name
                )));
            }
        }

        let categories = self.category_set();
        for rule in &self.keyword_rules {
            if rule.pattern.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Keyword rule for '{}' has an empty pattern",
                    rule.category
                )));
            }
            if !categories.contains(&rule.category) {
                return Err(Error::Config(format!(
                    "Keyword rule '{}' uses unknown category '{}'",
                    rule.pattern, rule.category
                )));
            }
        }
        self.keyword_classifier()
            .map_err(|e| Error::Config(format!("Invalid keyword rule: {}", e)))?;
        self.normalizer()
            .map_err(|e| Error::Config(format!("Invalid normalizer rule: {}", e)))?;

        if self.classifier.batch_size == 0 || self.classifier.max_concurrency == 0 {
            return Err(Error::Config(
                "classifier.batch_size and classifier.max_concurrency must be at least 1".into(),
            ));
        }
        if !matches!(
            self.classifier.backend.to_lowercase().as_str(),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" | "mock" | "none" | ""
        ) {
            return Err(Error::Config(format!(
                "Unknown classifier backend: {}",
                self.classifier.backend
            )));
        }

        if self.link.max_per_link == 0 {
            return Err(Error::Config("link.max_per_link must be at least 1".into()));
        }
        if self.link.base_url.trim().is_empty() {
            return Err(Error::Config("link.base_url must not be empty".into()));
        }

        if let Some(email) = &self.email {
            if email.sender.trim().is_empty()
                || email.recipient.trim().is_empty()
                || email.smtp.server.trim().is_empty()
            {
                return Err(Error::Config(
                    "email needs sender, recipient and smtp.server".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn category_set(&self) -> CategorySet {
        CategorySet::new(self.categories.clone())
    }

    /// Accounts as shared references for ingestion
    pub fn shared_accounts(&self) -> Vec<Arc<Account>> {
        self.accounts.iter().cloned().map(Arc::new).collect()
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        if self.normalizer.rules.is_empty() {
            Normalizer::with_default_rules()
        } else {
            Normalizer::new(&self.normalizer.rules)
        }
    }

    pub fn keyword_classifier(&self) -> Result<KeywordClassifier> {
        KeywordClassifier::new(&self.keyword_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchMode;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[accounts]]
name = "DKB Giro"
number = "DE12 3456 7890 1234 5678 90"

[[accounts]]
name = "Venture"
number = "1234"
weight = 2.0

[[categories]]
name = "Groceries"
hint = "Supermarkets"

[[categories]]
name = "Dining"

[[keyword_rules]]
pattern = "migros|coop"
category = "Groceries"

[[keyword_rules]]
pattern = "bar"
category = "Dining"
match_mode = "word"

[classifier]
backend = "mock"
batch_size = 10

[email]
sender = "me@example.com"
recipient = "me@example.com"

[email.smtp]
server = "smtp.example.com"
port = 465
user = "me"
password = "secret"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].weight, 1.0);
        assert_eq!(config.accounts[1].weight, 2.0);
        assert_eq!(config.keyword_rules[0].match_mode, MatchMode::Contains);
        assert_eq!(config.keyword_rules[1].match_mode, MatchMode::Word);
        assert_eq!(config.classifier.batch_size, 10);
        assert_eq!(config.classifier.max_concurrency, 4);
        assert_eq!(config.classifier.retry_backoff_ms, 500);
        assert_eq!(config.link.max_per_link, 50);
        assert_eq!(config.link.base_url, DEFAULT_BASE_URL);

        let email = config.email.as_ref().unwrap();
        assert_eq!(email.smtp.port, 465);
        assert_eq!(email.subject, "Your Cashew App Links");

        let set = config.category_set();
        assert_eq!(set.names(), vec!["Groceries", "Dining", "Uncategorized"]);
        assert_eq!(config.shared_accounts().len(), 2);
    }

    #[test]
    fn test_empty_normalizer_uses_default_rules() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let normalizer = config.normalizer().unwrap();
        assert_eq!(normalizer.normalize("Einkauf Migros"), "Migros");
    }

    #[test]
    fn test_custom_normalizer_rules() {
        let toml = format!(
            "{}\n[[normalizer.rules]]\npattern = \"\\\\s*#\\\\d+\"\nreplacement = \"\"\n",
            SAMPLE
        );
        let config = Config::from_toml_str(&toml).unwrap();
        let normalizer = config.normalizer().unwrap();
        assert_eq!(normalizer.normalize("Shop #123"), "Shop");
        // Built-in rules are replaced, not extended
        assert_eq!(normalizer.normalize("Einkauf Migros"), "Einkauf Migros");
    }

    #[test]
    fn test_keyword_rule_with_unknown_category_rejected() {
        let toml = format!(
            "{}\n[[keyword_rules]]\npattern = \"sbb\"\ncategory = \"Transport\"\n",
            SAMPLE
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown category 'Transport'"));
    }

    #[test]
    fn test_empty_keyword_pattern_rejected() {
        for (pattern, mode) in [("", "regex"), (" | ", "word"), ("  ", "contains")] {
            let toml = format!(
                "{}\n[[keyword_rules]]\npattern = \"{}\"\ncategory = \"Dining\"\nmatch_mode = \"{}\"\n",
                SAMPLE, pattern, mode
            );
            let err = Config::from_toml_str(&toml).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{:?} {}", pattern, mode);
        }
    }

    #[test]
    fn test_keyword_rule_may_target_uncategorized() {
        let toml = format!(
            "{}\n[[keyword_rules]]\npattern = \"twint\"\ncategory = \"Uncategorized\"\n",
            SAMPLE
        );
        assert!(Config::from_toml_str(&toml).is_ok());
    }

    #[test]
    fn test_invalid_regex_rejected_at_load() {
        let toml = format!(
            "{}\n[[keyword_rules]]\npattern = \"([\"\ncategory = \"Dining\"\nmatch_mode = \"regex\"\n",
            SAMPLE
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let no_accounts = "[[categories]]\nname = \"Dining\"\n";
        assert!(Config::from_toml_str(no_accounts).is_err());

        let bad_weight = "[[accounts]]\nname = \"A\"\nnumber = \"1\"\nweight = -1.0\n";
        assert!(Config::from_toml_str(bad_weight).is_err());

        let zero_batch = "[[accounts]]\nname = \"A\"\nnumber = \"1\"\n[classifier]\nbatch_size = 0\n";
        assert!(Config::from_toml_str(zero_batch).is_err());

        let bad_backend = "[[accounts]]\nname = \"A\"\nnumber = \"1\"\n[classifier]\nbackend = \"ollama\"\n";
        assert!(Config::from_toml_str(bad_backend).is_err());

        let duplicate = "[[accounts]]\nname = \"A\"\nnumber = \"1\"\n[[categories]]\nname = \"X\"\n[[categories]]\nname = \"X\"\n";
        assert!(Config::from_toml_str(duplicate).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("AI_BACKEND", "openai_compatible"),
            ("OPENAI_COMPATIBLE_HOST", "http://localhost:8000"),
            ("OPENAI_COMPATIBLE_MODEL", "llama3.2"),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.classifier.backend, "openai_compatible");
        assert_eq!(config.classifier.host.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.classifier.model, "llama3.2");
        assert!(config.classifier.api_key.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.accounts[0].name, "DKB Giro");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/cashew.toml")).unwrap_err();
        assert!(err.to_string().contains("Cannot read config file"));
    }
}
