//! Tolerant parser for extraction-service responses.
//!
//! Text generation services are asked for "ONLY valid JSON" but routinely wrap it in
//! markdown fences, add a sentence of prose, or break lines inside string values.
//! The response is normalized first, then handed to an ordered chain of parse
//! strategies. The first strategy that yields JSON wins; if none does, the result is
//! an empty sequence. Nothing in here returns an error to the caller.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::record::{RecordSequence, TransactionRecord};

/// One way of turning cleaned response text into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole cleaned text is JSON.
    Strict,
    /// The text contains JSON: take the span from the first `[` (or `{`) to the last
    /// `]` (or `}`).
    EmbeddedSpan,
}

impl ParseStrategy {
    /// Strategies in the order they are tried.
    pub const CHAIN: [ParseStrategy; 2] = [ParseStrategy::Strict, ParseStrategy::EmbeddedSpan];

    fn attempt(self, text: &str, patterns: &Patterns) -> Option<Value> {
        match self {
            ParseStrategy::Strict => serde_json::from_str(text).ok(),
            ParseStrategy::EmbeddedSpan => {
                let span = patterns.span.find(text)?;
                serde_json::from_str(span.as_str()).ok()
            }
        }
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::new);

struct Patterns {
    leading_fence: Regex,
    trailing_fence: Regex,
    line_breaks: Regex,
    span: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            leading_fence: Regex::new(r"(?i)^```[a-z0-9_+\-]*")?,
            trailing_fence: Regex::new(r"```$")?,
            line_breaks: Regex::new(r"[\r\n]+")?,
            span: Regex::new(r"(?s)\[.*\]|\{.*\}")?,
        })
    }

    /// Trim, strip one leading and one trailing fence, fold line breaks into spaces.
    fn clean(&self, raw: &str) -> String {
        let text = raw.trim();
        let text = self.leading_fence.replace(text, "");
        let text = self.trailing_fence.replace(&text, "");
        let text = self.line_breaks.replace_all(&text, " ");
        text.trim().to_string()
    }
}

/// Recover the transaction records from a raw extraction response.
///
/// Never fails: unparseable input yields an empty sequence (logged at `warn`).
pub fn parse_records(raw: &str) -> RecordSequence {
    match try_parse_records(raw) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "failed to parse extraction response");
            Vec::new()
        }
    }
}

fn try_parse_records(raw: &str) -> Result<RecordSequence> {
    let patterns = PATTERNS.as_ref().map_err(Clone::clone)?;
    let cleaned = patterns.clean(raw);
    if cleaned.is_empty() {
        debug!("extraction response is empty");
        return Ok(Vec::new());
    }

    for strategy in ParseStrategy::CHAIN {
        match strategy.attempt(&cleaned, patterns) {
            Some(value) => {
                debug!(?strategy, "extraction response parsed");
                return Ok(records_from_value(&value));
            }
            None => warn!(?strategy, "parse attempt failed"),
        }
    }

    warn!(len = cleaned.len(), "no JSON found in extraction response");
    Ok(Vec::new())
}

/// An array is the sequence; `{"data": [...]}` yields the inner array; anything else is empty.
fn records_from_value(value: &Value) -> RecordSequence {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("JSON object has no `data` array");
                return Vec::new();
            }
        },
        _ => {
            warn!("JSON value is neither an array nor an object");
            return Vec::new();
        }
    };

    items.iter().map(TransactionRecord::from_value).collect()
}
