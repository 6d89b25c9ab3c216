// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Opens one distribution pass on the stats mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionStarted {
    /// When the pass started.
    pub at: DateTime<Utc>,
}

/// Closes one distribution pass.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionFinished {
    /// When the pass finished.
    pub at: DateTime<Utc>,
    /// How many sources contributed.
    pub sources: usize,
}

/// One measured value.
///
/// The prefix names the entity (`disp/one_thread/default`), the suffix the
/// metric (`/demands.count`); together they form a stable identifier the
/// way run-time monitoring consumers expect.
#[derive(Debug, Clone, Serialize)]
pub struct Quantity {
    /// Entity identifier.
    pub prefix: String,
    /// Metric identifier.
    pub suffix: &'static str,
    /// The value.
    pub value: usize,
}

impl Quantity {
    /// Build one quantity.
    pub fn new(prefix: impl Into<String>, suffix: &'static str, value: usize) -> Self {
        Self {
            prefix: prefix.into(),
            suffix,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_serializes() {
        let quantity = Quantity::new("coop_repository", "/coop.reg.count", 3);
        let json = serde_json::to_string(&quantity).unwrap();
        assert!(json.contains("coop_repository"));
        assert!(json.contains("/coop.reg.count"));
        assert!(json.contains('3'));
    }
}
