//! Named contention profiles

use pharmaflow_shared::Strategy;
use serde::Serialize;

use super::RunPlan;

/// Contention scenarios compared for both strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentionProfile {
    /// Few callers, plenty of stock
    LowContention,
    /// Many callers on the same lot, enough stock for all
    HighContention,
    /// More demand than supply: 15 callers, stock for 5
    LimitedStock,
}

impl ContentionProfile {
    pub fn all() -> [ContentionProfile; 3] {
        [
            ContentionProfile::LowContention,
            ContentionProfile::HighContention,
            ContentionProfile::LimitedStock,
        ]
    }

    pub fn title(&self) -> &'static str {
        match self {
            ContentionProfile::LowContention => "LOW CONTENTION",
            ContentionProfile::HighContention => "HIGH CONTENTION",
            ContentionProfile::LimitedStock => "LIMITED STOCK",
        }
    }

    pub fn num_callers(&self) -> usize {
        match self {
            ContentionProfile::LowContention => 3,
            ContentionProfile::HighContention => 10,
            ContentionProfile::LimitedStock => 15,
        }
    }

    pub fn quantity_per_caller(&self) -> i32 {
        match self {
            ContentionProfile::LowContention => 5,
            ContentionProfile::HighContention => 2,
            ContentionProfile::LimitedStock => 3,
        }
    }

    pub fn initial_quantity(&self) -> i32 {
        match self {
            ContentionProfile::LowContention => 100,
            ContentionProfile::HighContention => 50,
            ContentionProfile::LimitedStock => 15,
        }
    }

    /// Run plan for this profile against `lot_id`
    pub fn plan(&self, lot_id: i64, strategy: Strategy) -> RunPlan {
        RunPlan::new(lot_id, strategy, self.num_callers(), self.quantity_per_caller())
            .seeded(self.initial_quantity(), 1)
    }
}

impl std::fmt::Display for ContentionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} callers x {} units, stock {})",
            self.title(),
            self.num_callers(),
            self.quantity_per_caller(),
            self.initial_quantity()
        )
    }
}
