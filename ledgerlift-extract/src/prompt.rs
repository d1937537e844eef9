/// System instruction sent with every statement.
pub const SYSTEM_INSTRUCTION: &str = "You are a financial data parser. Output ONLY valid JSON, no explanations. Return a JSON array with fields: date, description, amount, type, transaction category";

/// User turn accompanying the attached file.
pub const USER_INSTRUCTION: &str = "Extract transactions from this file.";
