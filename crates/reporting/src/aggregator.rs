//! Dashboard read models over a snapshot of reconciled reports.
//!
//! Aggregation never mutates anything. Every view partitions the same set of
//! campaigns, so per-dimension spend always sums to the grand total.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use adspend_core::{CampaignRecord, MonthRange, Report, ReportKey, YearMonth};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics;
use crate::revenue::{RevenueScope, RevenueSource};

// ─── Read models ────────────────────────────────────────────────────────────

/// Spend for one month of a trend window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: YearMonth,
    pub total_spend: f64,
    pub campaign_count: usize,
    pub by_unit: BTreeMap<String, f64>,
    pub by_platform: BTreeMap<String, f64>,
}

/// Totals shared by the unit and platform breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionTotals {
    pub spend: f64,
    pub share_percent: f64,
    /// Against the preceding window; `None` when no comparison was requested.
    pub change_percent: Option<f64>,
    pub campaign_count: usize,
    /// Sum over tracked records only.
    pub followers_gained: u64,
    /// Mean over tracked records only.
    pub average_followers: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub business_unit: String,
    #[serde(flatten)]
    pub totals: DimensionTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub platform: String,
    /// Whether the platform is fed by a registered insight source.
    pub is_automatic: bool,
    #[serde(flatten)]
    pub totals: DimensionTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRoi {
    pub type_tag: String,
    pub spend: f64,
    pub revenue: f64,
    pub roi: f64,
    pub campaign_count: usize,
}

/// What top-campaign rankings sort by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    #[default]
    PerformanceScore,
    Revenue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCampaign {
    pub business_unit: String,
    pub platform: String,
    pub period: YearMonth,
    pub campaign: CampaignRecord,
    pub performance_score: f64,
    pub ctr: f64,
    pub revenue: Option<f64>,
    pub roi: Option<f64>,
}

// ─── Aggregator ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    spend: f64,
    campaigns: usize,
    followers: u64,
    tracked: usize,
}

impl Accumulator {
    fn add(&mut self, record: &CampaignRecord) {
        self.spend += record.spend;
        self.campaigns += 1;
        if let Some(followers) = record.followers_gained {
            self.followers = self.followers.saturating_add(followers);
            self.tracked += 1;
        }
    }

    fn totals(&self, grand_total: f64, previous: Option<f64>) -> DimensionTotals {
        DimensionTotals {
            spend: self.spend,
            share_percent: metrics::share_percent(self.spend, grand_total),
            change_percent: previous.map(|p| metrics::percent_change(p, self.spend)),
            campaign_count: self.campaigns,
            followers_gained: self.followers,
            average_followers: (self.tracked > 0)
                .then(|| self.followers as f64 / self.tracked as f64),
        }
    }
}

/// Read-only projections over a report snapshot.
pub struct SpendAggregator<'a> {
    reports: &'a [Report],
}

impl<'a> SpendAggregator<'a> {
    pub fn new(reports: &'a [Report]) -> Self {
        Self { reports }
    }

    pub fn grand_total(&self) -> f64 {
        self.reports.iter().map(Report::total_spend).sum()
    }

    pub fn campaign_count(&self) -> usize {
        self.reports.iter().map(|r| r.campaigns.len()).sum()
    }

    /// One point per month of `window`, including months without data.
    pub fn monthly_trend(&self, window: MonthRange) -> Vec<TrendPoint> {
        window
            .months()
            .into_iter()
            .map(|period| {
                let mut point = TrendPoint {
                    period,
                    total_spend: 0.0,
                    campaign_count: 0,
                    by_unit: BTreeMap::new(),
                    by_platform: BTreeMap::new(),
                };
                for report in self.reports.iter().filter(|r| r.key.period == period) {
                    let spend = report.total_spend();
                    point.total_spend += spend;
                    point.campaign_count += report.campaigns.len();
                    *point
                        .by_unit
                        .entry(report.key.business_unit.clone())
                        .or_insert(0.0) += spend;
                    *point
                        .by_platform
                        .entry(report.key.platform.clone())
                        .or_insert(0.0) += spend;
                }
                point
            })
            .collect()
    }

    /// Per business unit, ordered by spend descending. When `previous` is
    /// given, each unit's change is measured against it; units only present
    /// there appear with zero spend.
    pub fn unit_summary(&self, previous: Option<&[Report]>) -> Vec<UnitSummary> {
        self.summarize(previous, |k| &k.business_unit)
            .into_iter()
            .map(|(business_unit, totals)| UnitSummary {
                business_unit,
                totals,
            })
            .collect()
    }

    /// Per platform, ordered by spend descending.
    pub fn platform_distribution(
        &self,
        previous: Option<&[Report]>,
        is_automatic: impl Fn(&str) -> bool,
    ) -> Vec<PlatformSummary> {
        self.summarize(previous, |k| &k.platform)
            .into_iter()
            .map(|(platform, totals)| PlatformSummary {
                is_automatic: is_automatic(&platform),
                platform,
                totals,
            })
            .collect()
    }

    fn summarize(
        &self,
        previous: Option<&[Report]>,
        dimension: impl Fn(&ReportKey) -> &String,
    ) -> Vec<(String, DimensionTotals)> {
        let current = accumulate(self.reports, &dimension);
        let before = previous.map(|reports| accumulate(reports, &dimension));
        let grand_total: f64 = current.values().map(|a| a.spend).sum();

        let mut keys: BTreeSet<&String> = current.keys().copied().collect();
        if let Some(before) = &before {
            keys.extend(before.keys().copied());
        }

        let mut rows: Vec<(String, DimensionTotals)> = keys
            .into_iter()
            .map(|key| {
                let acc = current.get(key).copied().unwrap_or_default();
                let prev_spend = before
                    .as_ref()
                    .map(|b| b.get(key).map(|a| a.spend).unwrap_or(0.0));
                (key.clone(), acc.totals(grand_total, prev_spend))
            })
            .collect();

        rows.sort_by(|a, b| b.1.spend.total_cmp(&a.1.spend).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Spend and revenue per `type_tag`, ordered by ROI descending.
    ///
    /// Revenue is looked up once per unit, month and type, whatever the number
    /// of platforms the type ran on.
    pub fn roi_by_type(&self, revenue: &dyn RevenueSource) -> Vec<TypeRoi> {
        let mut spend: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut lookups: BTreeSet<(&str, YearMonth, &str)> = BTreeSet::new();

        for report in self.reports {
            for campaign in &report.campaigns {
                let entry = spend.entry(campaign.type_tag.as_str()).or_insert((0.0, 0));
                entry.0 += campaign.spend;
                entry.1 += 1;
                lookups.insert((
                    report.key.business_unit.as_str(),
                    report.key.period,
                    campaign.type_tag.as_str(),
                ));
            }
        }

        let mut revenue_by_type: BTreeMap<&str, f64> = BTreeMap::new();
        for (unit, period, tag) in lookups {
            let scope = RevenueScope::TypeTag(tag.to_string());
            if let Some(amount) = revenue.revenue_for(unit, &scope, period) {
                *revenue_by_type.entry(tag).or_insert(0.0) += amount;
            }
        }

        let mut rows: Vec<TypeRoi> = spend
            .into_iter()
            .map(|(tag, (spend, campaign_count))| {
                let revenue = revenue_by_type.get(tag).copied().unwrap_or(0.0);
                TypeRoi {
                    type_tag: tag.to_string(),
                    spend,
                    revenue,
                    roi: metrics::roi(spend, revenue),
                    campaign_count,
                }
            })
            .collect();

        rows.sort_by(|a, b| b.roi.total_cmp(&a.roi).then_with(|| a.type_tag.cmp(&b.type_tag)));
        debug!(groups = rows.len(), "computed ROI by campaign type");
        rows
    }

    /// Best `n` campaigns by `ranking`. Equal keys favour the cheaper
    /// campaign.
    pub fn top_campaigns(
        &self,
        n: usize,
        ranking: Ranking,
        revenue: &dyn RevenueSource,
    ) -> Vec<RankedCampaign> {
        let mut ranked: Vec<RankedCampaign> = self
            .reports
            .iter()
            .flat_map(|report| {
                report.campaigns.iter().map(move |campaign| {
                    let scope = RevenueScope::Campaign(campaign.external_id.clone());
                    let campaign_revenue =
                        revenue.revenue_for(&report.key.business_unit, &scope, report.key.period);
                    let derived = metrics::DerivedMetrics::of(campaign, campaign_revenue);
                    RankedCampaign {
                        business_unit: report.key.business_unit.clone(),
                        platform: report.key.platform.clone(),
                        period: report.key.period,
                        campaign: campaign.clone(),
                        performance_score: derived.performance_score,
                        ctr: derived.ctr,
                        revenue: campaign_revenue,
                        roi: derived.roi,
                    }
                })
            })
            .collect();

        let sort_key = |c: &RankedCampaign| match ranking {
            Ranking::PerformanceScore => c.performance_score,
            Ranking::Revenue => c.revenue.unwrap_or(0.0),
        };
        ranked.sort_by(|a, b| match sort_key(b).total_cmp(&sort_key(a)) {
            Ordering::Equal => a.campaign.spend.total_cmp(&b.campaign.spend),
            other => other,
        });
        ranked.truncate(n);
        ranked
    }
}

fn accumulate<'r>(
    reports: &'r [Report],
    dimension: &impl Fn(&ReportKey) -> &String,
) -> BTreeMap<&'r String, Accumulator> {
    let mut map: BTreeMap<&String, Accumulator> = BTreeMap::new();
    for report in reports {
        let acc = map.entry(dimension(&report.key)).or_default();
        for campaign in &report.campaigns {
            acc.add(campaign);
        }
    }
    map
}
