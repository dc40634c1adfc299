//! Derived campaign metrics: ROI, CTR and performance score.
//!
//! Every function here is total: zero denominators yield `0.0` instead of
//! `NaN` or infinity.

use adspend_core::CampaignRecord;
use serde::{Deserialize, Serialize};

/// `(revenue - spend) / spend * 100`, or `0.0` when nothing was spent.
pub fn roi(spend: f64, revenue: f64) -> f64 {
    if spend == 0.0 {
        return 0.0;
    }
    (revenue - spend) / spend * 100.0
}

/// Click-through rate in percent, `0.0` without impressions.
pub fn ctr(clicks: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    clicks as f64 / impressions as f64 * 100.0
}

/// Spend efficiency of a campaign.
///
/// Reach-based efficiency wins over follower-based efficiency when automatic
/// metrics exist.
pub fn performance_score(record: &CampaignRecord) -> f64 {
    if record.spend <= 0.0 {
        return 0.0;
    }
    if let Some(auto) = &record.automatic {
        return ctr(auto.clicks, auto.impressions) * auto.reach as f64 / record.spend;
    }
    match record.followers_gained {
        Some(followers) if followers > 0 => followers as f64 / record.spend * 100.0,
        _ => 0.0,
    }
}

/// Period-over-period change in percent.
///
/// A zero previous period reports `+100%` when there is current spend and
/// `0%` otherwise.
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    (current - previous) / previous * 100.0
}

/// `part` as a percentage of `total`, `0.0` for an empty total.
pub fn share_percent(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    part / total * 100.0
}

/// Metrics computed on read for a single campaign.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Present only when a revenue figure was supplied.
    pub roi: Option<f64>,
    pub ctr: f64,
    pub performance_score: f64,
}

impl DerivedMetrics {
    pub fn of(record: &CampaignRecord, revenue: Option<f64>) -> Self {
        let click_rate = record
            .automatic
            .map(|a| ctr(a.clicks, a.impressions))
            .unwrap_or(0.0);
        Self {
            roi: revenue.map(|r| roi(record.spend, r)),
            ctr: click_rate,
            performance_score: performance_score(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adspend_core::{AutomaticMetrics, DateRange};
    use chrono::NaiveDate;

    fn march() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap()
    }

    fn automatic(spend: f64, clicks: u64, impressions: u64, reach: u64) -> CampaignRecord {
        let mut record = CampaignRecord::manual("C1", "Spring", "product", spend, march());
        record.automatic = Some(AutomaticMetrics {
            impressions,
            clicks,
            reach,
        });
        record
    }

    #[test]
    fn test_roi_guard_and_values() {
        assert_eq!(roi(0.0, 5_000.0), 0.0);
        assert_eq!(roi(0.0, 0.0), 0.0);
        assert!((roi(1_000.0, 1_500.0) - 50.0).abs() < 1e-9);
        assert!((roi(500.0, 400.0) - (-20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_ctr_guard_and_values() {
        assert_eq!(ctr(5, 0), 0.0);
        assert!((ctr(50, 2_000) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_prefers_reach_over_followers() {
        let mut record = automatic(1_000.0, 50, 2_000, 1_500);
        record.followers_gained = Some(400);
        // ctr 2.5% * reach 1500 / spend 1000
        assert!((performance_score(&record) - 3.75).abs() < 1e-9);
    }

    #[test]
    fn test_score_from_followers() {
        let mut record = CampaignRecord::manual("M1", "Influencers", "brand", 200.0, march());
        record.followers_gained = Some(50);
        assert!((performance_score(&record) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_zero_cases() {
        // untracked followers
        let record = CampaignRecord::manual("M1", "Influencers", "brand", 200.0, march());
        assert_eq!(performance_score(&record), 0.0);

        // zero spend with automatic metrics
        assert_eq!(performance_score(&automatic(0.0, 50, 2_000, 1_500)), 0.0);

        // automatic metrics with no impressions
        assert_eq!(performance_score(&automatic(100.0, 0, 0, 1_500)), 0.0);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(0.0, 250.0), 100.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert!((percent_change(200.0, 300.0) - 50.0).abs() < 1e-9);
        assert!((percent_change(200.0, 0.0) - (-100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_derived_metrics() {
        let derived = DerivedMetrics::of(&automatic(1_000.0, 50, 2_000, 1_500), Some(1_500.0));
        assert!((derived.roi.unwrap() - 50.0).abs() < 1e-9);
        assert!((derived.ctr - 2.5).abs() < 1e-9);

        let manual = CampaignRecord::manual("M1", "Flyers", "brand", 10.0, march());
        let derived = DerivedMetrics::of(&manual, None);
        assert_eq!(derived.roi, None);
        assert_eq!(derived.ctr, 0.0);
    }
}
