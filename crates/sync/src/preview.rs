//! Dry-run of a sync: summary, blocking errors and advisory warnings shown
//! on the confirmation screen. Never writes.

use std::collections::BTreeSet;

use adspend_core::config::SyncConfig;
use adspend_core::{
    AdSpendResult, CampaignRecord, DateRange, Insight, Report, SyncRequest, YearMonth,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reconciler::SyncEngine;

// ─── Preview Types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub business_unit: String,
    pub platform: String,
    pub date_range: DateRange,
    /// Report month the sync would write into.
    pub period: YearMonth,
    pub campaign_count: usize,
    pub total_spend: f64,
    pub average_spend: f64,
    pub malformed_count: usize,
    pub existing_report: bool,
}

/// Prevents confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BlockingError {
    NoData,
    UnsupportedUnit { business_unit: String },
}

impl BlockingError {
    pub fn message(&self) -> String {
        match self {
            BlockingError::NoData => {
                "The ad platform returned no campaigns for this range".to_string()
            }
            BlockingError::UnsupportedUnit { business_unit } => {
                format!("Business unit '{}' has no ad account on this platform", business_unit)
            }
        }
    }
}

/// Shown to the user; never blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PreviewWarning {
    RangeTooLong {
        days: i64,
        max_days: i64,
    },
    CrossesMonthBoundary {
        period: YearMonth,
        date_to: NaiveDate,
    },
    OverwritesExistingReport {
        business_unit: String,
        period: YearMonth,
        existing_campaigns: usize,
    },
    HighSpend {
        total_spend: f64,
        threshold: f64,
    },
    DuplicateExternalIds {
        ids: Vec<String>,
    },
    MalformedRecords {
        count: usize,
    },
}

impl PreviewWarning {
    pub fn message(&self) -> String {
        match self {
            PreviewWarning::RangeTooLong { days, max_days } => format!(
                "The range covers {} days, more than the recommended {}",
                days, max_days
            ),
            PreviewWarning::CrossesMonthBoundary { period, date_to } => format!(
                "Everything will be filed under {} even though the range ends on {}",
                period, date_to
            ),
            PreviewWarning::OverwritesExistingReport {
                business_unit,
                period,
                existing_campaigns,
            } => format!(
                "The {} report for {} already holds {} campaigns; pulled campaigns will be updated",
                business_unit, period, existing_campaigns
            ),
            PreviewWarning::HighSpend {
                total_spend,
                threshold,
            } => format!(
                "Total spend {:.2} exceeds the review threshold of {:.2}",
                total_spend, threshold
            ),
            PreviewWarning::DuplicateExternalIds { ids } => format!(
                "The platform returned duplicate campaign ids ({}); the last one wins",
                ids.join(", ")
            ),
            PreviewWarning::MalformedRecords { count } => {
                format!("{} records are malformed and will be skipped", count)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPreview {
    pub summary: PreviewSummary,
    pub warnings: Vec<PreviewWarning>,
    pub blocking_errors: Vec<BlockingError>,
    pub recommendations: Vec<String>,
    pub can_proceed: bool,
    pub generated_at: DateTime<Utc>,
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Build the preview from an already pulled insight sequence.
pub fn assess(
    request: &SyncRequest,
    insights: &[Insight],
    existing: Option<&Report>,
    config: &SyncConfig,
) -> SyncPreview {
    let range = request.date_range;
    let period = range.period();

    let mut valid = Vec::with_capacity(insights.len());
    let mut malformed_count = 0;
    for insight in insights {
        match CampaignRecord::try_from_insight(insight) {
            Ok(record) => valid.push(record),
            Err(_) => malformed_count += 1,
        }
    }

    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for record in &valid {
        if !seen.insert(record.external_id.as_str()) {
            duplicates.insert(record.external_id.clone());
        }
    }

    let campaign_count = seen.len();
    let total_spend: f64 = valid.iter().map(|r| r.spend).sum();
    let average_spend = if valid.is_empty() {
        0.0
    } else {
        total_spend / valid.len() as f64
    };

    let mut blocking_errors = Vec::new();
    if insights.is_empty() {
        blocking_errors.push(BlockingError::NoData);
    }

    let mut warnings = Vec::new();
    let days = range.days();
    if days > config.max_range_days {
        warnings.push(PreviewWarning::RangeTooLong {
            days,
            max_days: config.max_range_days,
        });
    }
    if range.crosses_month() {
        warnings.push(PreviewWarning::CrossesMonthBoundary {
            period,
            date_to: range.end,
        });
    }
    if let Some(report) = existing.filter(|r| !r.campaigns.is_empty()) {
        warnings.push(PreviewWarning::OverwritesExistingReport {
            business_unit: request.business_unit.clone(),
            period,
            existing_campaigns: report.campaigns.len(),
        });
    }
    if total_spend > config.high_spend_threshold {
        warnings.push(PreviewWarning::HighSpend {
            total_spend,
            threshold: config.high_spend_threshold,
        });
    }
    if !duplicates.is_empty() {
        warnings.push(PreviewWarning::DuplicateExternalIds {
            ids: duplicates.into_iter().collect(),
        });
    }
    if malformed_count > 0 {
        warnings.push(PreviewWarning::MalformedRecords {
            count: malformed_count,
        });
    }

    let recommendations = if blocking_errors.is_empty() {
        recommend(campaign_count, average_spend, config)
    } else {
        Vec::new()
    };

    SyncPreview {
        summary: PreviewSummary {
            business_unit: request.business_unit.clone(),
            platform: request.platform.clone(),
            date_range: range,
            period,
            campaign_count,
            total_spend,
            average_spend,
            malformed_count,
            existing_report: existing.is_some(),
        },
        can_proceed: blocking_errors.is_empty(),
        warnings,
        blocking_errors,
        recommendations,
        generated_at: Utc::now(),
    }
}

fn recommend(campaign_count: usize, average_spend: f64, config: &SyncConfig) -> Vec<String> {
    let mut out = Vec::new();
    if campaign_count >= 20 {
        out.push(format!(
            "{} campaigns in one pull; consider narrowing the range to review them comfortably",
            campaign_count
        ));
    }
    if average_spend >= config.high_spend_threshold / 10.0 {
        out.push(format!(
            "Average spend per campaign is {:.2}; double-check budgets before confirming",
            average_spend
        ));
    }
    if campaign_count <= 2 {
        out.push(
            "Only a few campaigns were found; confirm the range covers the whole month".to_string(),
        );
    }
    if out.is_empty() {
        out.push("Data looks consistent and is ready to sync".to_string());
    }
    out
}

impl SyncEngine {
    /// Dry-run `request`: pulls insights and reads the target report without
    /// writing anything.
    ///
    /// Unsupported units come back as a blocking error without a pull.
    /// Transport failures are returned as errors.
    pub async fn preview(&self, request: &SyncRequest) -> AdSpendResult<SyncPreview> {
        request.date_range.validate()?;
        metrics::counter!("preview.runs").increment(1);

        let source = self.source(&request.platform)?;
        let key = request.report_key();
        let existing = self.repository().find_report(&key).await?;

        if !source.supports_unit(&request.business_unit) {
            let mut preview = assess(request, &[], existing.as_ref(), self.config());
            preview.blocking_errors = vec![BlockingError::UnsupportedUnit {
                business_unit: request.business_unit.clone(),
            }];
            info!(key = %key, "preview blocked: unsupported unit");
            return Ok(preview);
        }

        let insights = self
            .fetch_insights(source.as_ref(), &request.business_unit, &request.date_range)
            .await?;
        let preview = assess(request, &insights, existing.as_ref(), self.config());

        info!(
            key = %key,
            campaigns = preview.summary.campaign_count,
            total_spend = preview.summary.total_spend,
            warnings = preview.warnings.len(),
            blocking = preview.blocking_errors.len(),
            "preview generated"
        );
        Ok(preview)
    }
}
