//! Transaction record types recovered from an extraction response

use serde_json::{Map, Value};

/// Keys the extraction service uses for the category, in lookup order.
const CATEGORY_KEYS: [&str; 4] = [
    "category",
    "transaction category",
    "transaction_category",
    "transactionCategory",
];

/// One transaction as returned by the extraction service.
///
/// Nothing is validated: every field is carried as text and absent fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRecord {
    pub date: String,
    pub description: String,
    /// Numeric amounts are kept in their JSON text form (`25.00` stays `25.00`).
    pub amount: String,
    /// The `type` field (`debit`, `credit`, ...).
    pub kind: String,
    pub category: Option<String>,
}

/// Records in the order the service returned them.
pub type RecordSequence = Vec<TransactionRecord>;

impl TransactionRecord {
    /// Build a record from one element of the parsed JSON array.
    /// Non-object elements produce a record with every field empty.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let field = |key: &str| map.get(key).map(cell_text).unwrap_or_default();

        let category = CATEGORY_KEYS
            .iter()
            .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
            .map(cell_text);

        Self {
            date: field("date"),
            description: field("description"),
            amount: field("amount"),
            kind: field("type"),
            category,
        }
    }
}

/// Render a JSON value as a CSV cell.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
