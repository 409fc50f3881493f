use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Sanitize string for database (remove null bytes, trim)
pub fn sanitize_string(input: &str) -> String {
    input.replace('\0', "").trim().to_string()
}

/// Parse an optional numeric query value; empty or malformed means absent.
pub fn parse_optional_id(value: Option<&str>) -> Option<i64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}
