use std::collections::HashMap;
use std::path::PathBuf;

use adspend_core::{AdSpendError, AdSpendResult, DateRange, Insight};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// A source of campaign insights for one advertising platform.
#[async_trait]
pub trait InsightSource: Send + Sync {
    /// Platform name; becomes the platform of every report this source feeds.
    fn platform(&self) -> &str;

    /// Business units the platform holds ad accounts for.
    fn supported_units(&self) -> Vec<String>;

    fn supports_unit(&self, business_unit: &str) -> bool {
        self.supported_units()
            .iter()
            .any(|u| u.eq_ignore_ascii_case(business_unit))
    }

    /// Pull insights for `business_unit` in `range`, in platform order.
    async fn fetch_insights(
        &self,
        business_unit: &str,
        range: &DateRange,
    ) -> AdSpendResult<Vec<Insight>>;
}

fn within(insights: &[Insight], range: &DateRange) -> Vec<Insight> {
    insights
        .iter()
        .filter(|i| i.date_range().overlaps(range))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Serves preloaded insights per unit. Used for demos and tests.
pub struct StaticInsightSource {
    platform: String,
    units: Vec<String>,
    insights: DashMap<String, Vec<Insight>>,
}

impl StaticInsightSource {
    pub fn new(platform: impl Into<String>, units: Vec<String>) -> Self {
        Self {
            platform: platform.into(),
            units,
            insights: DashMap::new(),
        }
    }

    /// Replace everything served for `business_unit`.
    pub fn set_insights(&self, business_unit: &str, insights: Vec<Insight>) {
        self.insights.insert(business_unit.to_lowercase(), insights);
    }
}

#[async_trait]
impl InsightSource for StaticInsightSource {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn supported_units(&self) -> Vec<String> {
        self.units.clone()
    }

    async fn fetch_insights(
        &self,
        business_unit: &str,
        range: &DateRange,
    ) -> AdSpendResult<Vec<Insight>> {
        let insights = self
            .insights
            .get(&business_unit.to_lowercase())
            .map(|entry| within(entry.value(), range))
            .unwrap_or_default();
        debug!(
            platform = %self.platform,
            business_unit = %business_unit,
            count = insights.len(),
            "served static insights"
        );
        Ok(insights)
    }
}

// ---------------------------------------------------------------------------
// JSON export file
// ---------------------------------------------------------------------------

/// Reads an insights export shaped `{ "<unit>": [Insight, ...], ... }`.
///
/// The file is re-read on every pull so a fresh export is picked up without
/// restarting.
pub struct JsonFileInsightSource {
    platform: String,
    path: PathBuf,
    units: Vec<String>,
}

impl JsonFileInsightSource {
    pub fn new(platform: impl Into<String>, path: impl Into<PathBuf>, units: Vec<String>) -> Self {
        Self {
            platform: platform.into(),
            path: path.into(),
            units,
        }
    }

    async fn load(&self) -> AdSpendResult<HashMap<String, Vec<Insight>>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AdSpendError::ExternalFetch(format!("reading {}: {}", self.path.display(), e))
        })?;
        let parsed: HashMap<String, Vec<Insight>> = serde_json::from_str(&raw).map_err(|e| {
            AdSpendError::ExternalFetch(format!("parsing {}: {}", self.path.display(), e))
        })?;
        Ok(parsed
            .into_iter()
            .map(|(unit, insights)| (unit.to_lowercase(), insights))
            .collect())
    }
}

#[async_trait]
impl InsightSource for JsonFileInsightSource {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn supported_units(&self) -> Vec<String> {
        self.units.clone()
    }

    async fn fetch_insights(
        &self,
        business_unit: &str,
        range: &DateRange,
    ) -> AdSpendResult<Vec<Insight>> {
        let export = self.load().await?;
        Ok(export
            .get(&business_unit.to_lowercase())
            .map(|insights| within(insights, range))
            .unwrap_or_default())
    }
}
