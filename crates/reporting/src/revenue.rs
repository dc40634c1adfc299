//! Revenue lookup used by ROI computations.

use adspend_core::YearMonth;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// What a revenue figure is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RevenueScope {
    TypeTag(String),
    Campaign(String),
}

/// Source of sales revenue for a unit and period, e.g. the manual sales
/// reports. `None` means no figure is known.
pub trait RevenueSource: Send + Sync {
    fn revenue_for(&self, business_unit: &str, scope: &RevenueScope, period: YearMonth)
        -> Option<f64>;
}

/// Revenue source that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevenue;

impl RevenueSource for NoRevenue {
    fn revenue_for(&self, _: &str, _: &RevenueScope, _: YearMonth) -> Option<f64> {
        None
    }
}

/// One revenue figure as loaded from a fixture or sales export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEntry {
    pub business_unit: String,
    pub scope: RevenueScope,
    pub period: YearMonth,
    pub amount: f64,
}

/// In-memory revenue table keyed by unit, scope and period.
#[derive(Debug, Default)]
pub struct StaticRevenueSource {
    amounts: DashMap<(String, RevenueScope, YearMonth), f64>,
}

impl StaticRevenueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = RevenueEntry>) -> Self {
        let source = Self::new();
        for entry in entries {
            source.set(&entry.business_unit, entry.scope, entry.period, entry.amount);
        }
        source
    }

    /// Set a figure, replacing any previous one. Units are case-insensitive.
    pub fn set(&self, business_unit: &str, scope: RevenueScope, period: YearMonth, amount: f64) {
        self.amounts
            .insert((business_unit.to_lowercase(), scope, period), amount);
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

impl RevenueSource for StaticRevenueSource {
    fn revenue_for(
        &self,
        business_unit: &str,
        scope: &RevenueScope,
        period: YearMonth,
    ) -> Option<f64> {
        self.amounts
            .get(&(business_unit.to_lowercase(), scope.clone(), period))
            .map(|v| *v)
    }
}
