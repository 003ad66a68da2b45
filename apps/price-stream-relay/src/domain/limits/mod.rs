//! Risk Limit Values
//!
//! In-memory holder for the two account-level limits the dashboard edits:
//! maximum tolerated loss and total capital allocated. Values are optional
//! until a client sets them and partial updates leave other fields intact.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current limit values.
///
/// Accepts JSON numbers or strings, but always serializes as decimal strings,
/// so a `maxLoss` sent as `5000` is echoed back as `"5000"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    /// Maximum tolerated loss.
    pub max_loss: Option<Decimal>,
    /// Total capital allocated.
    pub total_amount: Option<Decimal>,
}

impl RiskLimits {
    /// Overlay the fields present in `update`.
    #[must_use]
    pub fn merged(self, update: Self) -> Self {
        Self {
            max_loss: update.max_loss.or(self.max_loss),
            total_amount: update.total_amount.or(self.total_amount),
        }
    }
}

/// Shared store for [`RiskLimits`].
#[derive(Debug, Default)]
pub struct RiskLimitsStore {
    limits: RwLock<RiskLimits>,
}

impl RiskLimitsStore {
    /// Create a store with no values set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values.
    #[must_use]
    pub fn get(&self) -> RiskLimits {
        *self.limits.read()
    }

    /// Apply a partial update and return the resulting values.
    pub fn apply(&self, update: RiskLimits) -> RiskLimits {
        let mut limits = self.limits.write();
        *limits = limits.merged(update);
        *limits
    }
}
