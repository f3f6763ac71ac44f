use chrono::{DateTime, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// `?, ?, ?` for an `IN (...)` list of `count` bound values.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count.max(1)].join(", ")
}
