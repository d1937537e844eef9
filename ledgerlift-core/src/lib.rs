//! ledgerlift-core: transaction records, tolerant extraction-response parsing, CSV projection

pub mod record;
pub mod response;
pub mod csv_out;

pub use record::{RecordSequence, TransactionRecord};
pub use response::{parse_records, ParseStrategy};
pub use csv_out::{project, CsvOptions};

/// Parse a raw extraction response and project it straight to CSV text.
pub fn response_to_csv(raw: &str, options: &CsvOptions) -> anyhow::Result<String> {
    let records = parse_records(raw);
    project(&records, options)
}
