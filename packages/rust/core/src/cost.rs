//! Fixed per-operation cost estimates used for budget alerting.

use ledgersync_shared::CostConfig;

/// A billable answering-service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Answer,
    Review,
    CheckUpdates,
    Plan,
    ReadmeAudit,
}

/// Estimates per [`Operation`] plus the run-level alert threshold (USD).
#[derive(Debug, Clone, PartialEq)]
pub struct CostTable {
    answer: f64,
    review: f64,
    check_updates: f64,
    plan: f64,
    readme_audit: f64,
    threshold: f64,
}

impl CostTable {
    pub fn from_config(config: &CostConfig) -> Self {
        Self {
            answer: config.answer,
            review: config.review,
            check_updates: config.check_updates,
            plan: config.plan,
            readme_audit: config.readme_audit,
            threshold: config.alert_threshold,
        }
    }

    /// Estimate charged for one successful call of `op`.
    pub fn charge(&self, op: Operation) -> f64 {
        match op {
            Operation::Answer => self.answer,
            Operation::Review => self.review,
            Operation::CheckUpdates => self.check_updates,
            Operation::Plan => self.plan,
            Operation::ReadmeAudit => self.readme_audit,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Strictly greater than the threshold; reaching it exactly is fine.
    pub fn exceeds(&self, total: f64) -> bool {
        total > self.threshold
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self::from_config(&CostConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_follow_config() {
        let table = CostTable::from_config(&CostConfig {
            answer: 0.5,
            plan: 0.25,
            ..CostConfig::default()
        });
        assert_eq!(table.charge(Operation::Answer), 0.5);
        assert_eq!(table.charge(Operation::Plan), 0.25);
        assert_eq!(table.charge(Operation::Review), 0.01);
    }

    #[test]
    fn threshold_is_strict() {
        let table = CostTable::from_config(&CostConfig {
            alert_threshold: 0.5,
            ..CostConfig::default()
        });
        assert!(!table.exceeds(0.5));
        assert!(!table.exceeds(0.49));
        assert!(table.exceeds(0.5001));
    }
}
