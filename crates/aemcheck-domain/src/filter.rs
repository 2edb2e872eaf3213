//! OData filter strings for Table service queries.
//!
//! Only the subset the verifier needs: string equality, a `datetime`
//! lower bound, and conjunction.

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFilter(String);

impl TableFilter {
    /// `field eq 'value'`. Single quotes in `value` are doubled.
    pub fn eq(field: &str, value: &str) -> Self {
        TableFilter(format!("{} eq '{}'", field, value.replace('\'', "''")))
    }

    /// `field ge datetime'2024-01-01T00:00:00.0000000Z'`.
    pub fn ge_datetime(field: &str, at: DateTime<Utc>) -> Self {
        // Table service expects seven fractional digits; chrono emits nine at most.
        let ts = at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let ts = match ts.split_once('.') {
            Some((head, frac)) => {
                let digits: String = frac.trim_end_matches('Z').chars().take(7).collect();
                format!("{}.{:0<7}Z", head, digits)
            }
            None => ts,
        };
        TableFilter(format!("{} ge datetime'{}'", field, ts))
    }

    /// `(self) and (other)`.
    pub fn and(self, other: TableFilter) -> Self {
        TableFilter(format!("({}) and ({})", self.0, other.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for TableFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
