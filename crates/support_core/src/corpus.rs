use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::FaqRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub category: String,
    /// Position inside the category, `None` when the whole category was skipped.
    pub index: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusLoad {
    pub records: Vec<FaqRecord>,
    pub skipped: Vec<SkippedItem>,
}

/// Flattens a nested `category -> [{question, answer}]` structure.
///
/// Accepts either an array of category objects or a single object keyed by
/// category. Malformed items are skipped and reported in `skipped`.
pub fn load_corpus(value: &Value) -> CorpusLoad {
    let mut load = CorpusLoad::default();

    match value {
        Value::Array(groups) => {
            for (position, group) in groups.iter().enumerate() {
                match group {
                    Value::Object(categories) => load_categories(categories, &mut load),
                    _ => load.skipped.push(SkippedItem {
                        category: format!("#{position}"),
                        index: None,
                        reason: "category group is not an object".to_string(),
                    }),
                }
            }
        }
        Value::Object(categories) => load_categories(categories, &mut load),
        _ => load.skipped.push(SkippedItem {
            category: String::new(),
            index: None,
            reason: "corpus root is neither an array nor an object".to_string(),
        }),
    }

    let mut seen = HashSet::new();
    for record in &load.records {
        if !seen.insert(record.question.as_str()) {
            warn!(
                question = %record.question,
                category = %record.category,
                "duplicate FAQ question; matches will not distinguish between them"
            );
        }
    }

    load
}

fn load_categories(categories: &Map<String, Value>, load: &mut CorpusLoad) {
    for (category, items) in categories {
        let Value::Array(items) = items else {
            load.skipped.push(SkippedItem {
                category: category.clone(),
                index: None,
                reason: "category value is not an array".to_string(),
            });
            continue;
        };

        for (index, item) in items.iter().enumerate() {
            match parse_item(category, item) {
                Ok(record) => load.records.push(record),
                Err(reason) => load.skipped.push(SkippedItem {
                    category: category.clone(),
                    index: Some(index),
                    reason,
                }),
            }
        }
    }
}

fn parse_item(category: &str, item: &Value) -> Result<FaqRecord, String> {
    let field = |name: &str| -> Result<String, String> {
        match item.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::String(_)) => Err(format!("empty '{name}'")),
            Some(_) => Err(format!("'{name}' is not a string")),
            None => Err(format!("missing '{name}'")),
        }
    };

    Ok(FaqRecord {
        category: category.to_string(),
        question: field("question")?,
        answer: field("answer")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_array_of_categories_in_order() {
        let value = json!([
            {"Stores": [
                {"question": "What are your store hours?", "answer": "9am-5pm daily"},
                {"question": "Where are you?", "answer": "High Street"}
            ]},
            {"Delivery": [
                {"question": "Do you deliver?", "answer": "Yes"}
            ]}
        ]);

        let load = load_corpus(&value);
        assert!(load.skipped.is_empty());
        let questions: Vec<&str> = load.records.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(
            questions,
            ["What are your store hours?", "Where are you?", "Do you deliver?"]
        );
        assert_eq!(load.records[2].category, "Delivery");
    }

    #[test]
    fn accepts_object_keyed_by_category() {
        let value = json!({
            "Zeta": [{"question": "q1", "answer": "a1"}],
            "Alpha": [{"question": "q2", "answer": "a2"}]
        });

        let load = load_corpus(&value);
        let categories: Vec<&str> = load.records.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, ["Zeta", "Alpha"]);
    }

    #[test]
    fn malformed_items_are_skipped_and_reported() {
        let value = json!([
            {"General": [
                {"question": "ok?", "answer": "yes"},
                {"question": "no answer"},
                {"answer": "no question"},
                {"question": "   ", "answer": "blank question"},
                {"question": 42, "answer": "numeric"}
            ]},
            {"Broken": "not a list"}
        ]);

        let load = load_corpus(&value);
        assert_eq!(load.records.len(), 1);
        assert_eq!(load.records[0].question, "ok?");
        assert_eq!(load.skipped.len(), 5);
        assert_eq!(load.skipped[0].index, Some(1));
        assert_eq!(load.skipped[0].reason, "missing 'answer'");
        assert_eq!(load.skipped[4].category, "Broken");
        assert_eq!(load.skipped[4].index, None);
    }

    #[test]
    fn duplicate_questions_are_kept() {
        let value = json!({
            "A": [{"question": "Same?", "answer": "one"}],
            "B": [{"question": "Same?", "answer": "two"}]
        });

        let load = load_corpus(&value);
        assert_eq!(load.records.len(), 2);
    }

    #[test]
    fn scalar_root_yields_nothing() {
        let load = load_corpus(&json!("nope"));
        assert!(load.records.is_empty());
        assert_eq!(load.skipped.len(), 1);
    }
}
