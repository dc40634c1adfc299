//! Advertising spend analytics: derived campaign metrics, revenue lookup and
//! dashboard aggregations over reconciled reports.

pub mod aggregator;
pub mod metrics;
pub mod revenue;

pub use aggregator::{Ranking, SpendAggregator};
pub use metrics::DerivedMetrics;
pub use revenue::{NoRevenue, RevenueScope, RevenueSource, StaticRevenueSource};
