use crate::domain::request::RequestNumber;

/// Rendering shared by every request-number generator: a fixed prefix, the
/// fiscal year, and a zero-padded per-year sequence, e.g. `PR-2026-00042`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestNumberFormat {
    prefix: String,
}

impl RequestNumberFormat {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn render(&self, fiscal_year: i32, sequence: u64) -> RequestNumber {
        RequestNumber(format!("{}-{}-{:05}", self.prefix, fiscal_year, sequence))
    }
}

impl Default for RequestNumberFormat {
    fn default() -> Self {
        Self::new("PR")
    }
}
