use crate::delivery::DeliveryOutcome;

/// Tally of one notification batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BatchStats {
    pub(crate) recipients: usize,
    pub(crate) units: usize,
    pub(crate) delivered: usize,
    pub(crate) failed: usize,
    pub(crate) attempts: u64,
    /// Addresses with at least one undelivered unit, in batch order.
    pub(crate) failed_recipients: Vec<String>,
}

impl BatchStats {
    pub(crate) fn record(&mut self, address: &str, outcome: DeliveryOutcome) {
        self.units += 1;
        self.attempts += u64::from(outcome.attempts);
        if outcome.delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
            if !self.failed_recipients.iter().any(|a| a == address) {
                self.failed_recipients.push(address.to_string());
            }
        }
    }
}

pub(crate) fn build_stats_json(stats: &BatchStats) -> serde_json::Value {
    serde_json::json!({
        "recipients": stats.recipients,
        "units": stats.units,
        "delivered": stats.delivered,
        "failed": stats.failed,
        "attempts": stats.attempts,
        "failed_recipients": stats.failed_recipients,
        "version": env!("CARGO_PKG_VERSION"),
    })
}
