//! Prompt and response schema for batch classification

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::CategorySet;

use super::types::{ClassificationItem, UNKNOWN_CATEGORY};

/// Embedded system prompt template
const CLASSIFY_TRANSACTIONS: &str = include_str!("../../../../prompts/classify_transactions.md");

/// System message listing the categories and their hints
pub fn system_prompt(categories: &CategorySet) -> String {
    let names = categories
        .iter()
        .map(|c| format!("- {}", c.name))
        .collect::<Vec<_>>()
        .join("\n");
    let hints = categories
        .iter()
        .filter_map(|c| c.hint.as_ref().map(|h| format!("- {}: {}", c.name, h)))
        .collect::<Vec<_>>()
        .join("\n");

    CLASSIFY_TRANSACTIONS
        .replace("{{categories}}", &names)
        .replace("{{hints}}", if hints.is_empty() { "(none)" } else { hints.as_str() })
}

/// User message carrying the batch
pub fn user_prompt(items: &[ClassificationItem]) -> Result<String> {
    Ok(format!(
        "Please categorize these transactions:\n{}",
        serde_json::to_string_pretty(items)?
    ))
}

/// JSON schema for structured output
///
/// The category enum is the category set plus the "unknown" sentinel.
pub fn response_schema(categories: &CategorySet) -> Value {
    let mut allowed: Vec<&str> = categories.names();
    allowed.push(UNKNOWN_CATEGORY);

    json!({
        "type": "object",
        "properties": {
            "categorized_transactions": {
                "type": "array",
                "description": "One entry per transaction, in request order",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "integer",
                            "description": "The id of the transaction"
                        },
                        "category": {
                            "type": "string",
                            "description": "The assigned category of the transaction",
                            "enum": allowed
                        }
                    },
                    "required": ["id", "category"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["categorized_transactions"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn categories() -> CategorySet {
        CategorySet::new(vec![
            Category {
                name: "Groceries".to_string(),
                hint: Some("Supermarkets like Migros, Coop".to_string()),
            },
            Category {
                name: "Dining".to_string(),
                hint: None,
            },
        ])
    }

    #[test]
    fn test_system_prompt_lists_categories_and_hints() {
        let prompt = system_prompt(&categories());
        assert!(prompt.contains("- Groceries\n- Dining\n- Uncategorized"));
        assert!(prompt.contains("- Groceries: Supermarkets like Migros, Coop"));
        assert!(!prompt.contains("- Dining:"));
        assert!(prompt.contains("\"unknown\""));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_system_prompt_without_hints() {
        let prompt = system_prompt(&CategorySet::from_names(&["Dining"]));
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn test_user_prompt_embeds_items() {
        let items = vec![ClassificationItem {
            id: 0,
            description: "Café & Co.".to_string(),
            amount: Decimal::new(-450, 2),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        }];
        let prompt = user_prompt(&items).unwrap();
        assert!(prompt.contains("\"description\": \"Café & Co.\""));
        assert!(prompt.contains("\"date\": \"2025-04-01\""));
    }

    #[test]
    fn test_schema_enum_includes_unknown() {
        let schema = response_schema(&categories());
        let allowed = &schema["properties"]["categorized_transactions"]["items"]["properties"]
            ["category"]["enum"];
        let allowed: Vec<&str> = allowed
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(allowed, vec!["Groceries", "Dining", "Uncategorized", "unknown"]);
    }
}
