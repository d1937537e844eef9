//! Project a record sequence onto the fixed statement CSV layout.
//!
//! Header: `Date,Description,Amount,Type` (plus `Category` when enabled).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::record::TransactionRecord;

const HEADER: [&str; 4] = ["Date", "Description", "Amount", "Type"];
const CATEGORY_HEADER: &str = "Category";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Append a `Category` column. Off by default: the download stays four columns.
    #[serde(default)]
    pub include_category: bool,
}

/// Render records as CSV text. The header row is always written.
pub fn project(records: &[TransactionRecord], options: &CsvOptions) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if options.include_category {
        let mut header = HEADER.to_vec();
        header.push(CATEGORY_HEADER);
        wtr.write_record(&header)?;
    } else {
        wtr.write_record(HEADER)?;
    }

    for r in records {
        if options.include_category {
            wtr.write_record([
                r.date.as_str(),
                r.description.as_str(),
                r.amount.as_str(),
                r.kind.as_str(),
                r.category.as_deref().unwrap_or(""),
            ])?;
        } else {
            wtr.write_record([
                r.date.as_str(),
                r.description.as_str(),
                r.amount.as_str(),
                r.kind.as_str(),
            ])?;
        }
    }

    let bytes = wtr.into_inner().context("flush csv writer")?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}
