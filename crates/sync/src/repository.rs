//! Report storage with per-key compare-and-swap.
//!
//! Production: back `CampaignRepository` with a transactional store keyed on
//! `(business_unit, platform, year, month)` with a version column.

use adspend_core::{
    AdSpendError, AdSpendResult, CampaignRecord, Report, ReportFilter, ReportKey,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn find_report(&self, key: &ReportKey) -> AdSpendResult<Option<Report>>;

    /// Store `report` if its `version` still matches the stored one.
    ///
    /// Version `0` means the key must not exist yet. On success the stored
    /// copy, with its bumped version, is returned; otherwise
    /// `AdSpendError::VersionConflict`.
    async fn upsert_report(&self, report: Report) -> AdSpendResult<Report>;

    /// Reports matching `filter`, ordered by month, then unit, then platform.
    async fn list_reports(&self, filter: &ReportFilter) -> AdSpendResult<Vec<Report>>;

    async fn find_campaign(
        &self,
        key: &ReportKey,
        external_id: &str,
    ) -> AdSpendResult<Option<CampaignRecord>> {
        Ok(self
            .find_report(key)
            .await?
            .and_then(|report| report.find_campaign(external_id).cloned()))
    }
}

/// Thread-safe in-memory repository backed by DashMap. The shard lock held by
/// the entry API makes each compare-and-swap atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryCampaignRepository {
    reports: DashMap<ReportKey, Report>,
}

impl InMemoryCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a previously taken snapshot, keeping stored versions.
    pub fn from_reports(reports: impl IntoIterator<Item = Report>) -> Self {
        let repo = Self::new();
        for report in reports {
            repo.reports.insert(report.key.clone(), report);
        }
        info!(reports = repo.reports.len(), "report repository loaded");
        repo
    }

    /// Every stored report in listing order.
    pub fn snapshot(&self) -> Vec<Report> {
        let mut reports: Vec<Report> = self.reports.iter().map(|r| r.value().clone()).collect();
        sort_reports(&mut reports);
        reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

fn sort_reports(reports: &mut [Report]) {
    reports.sort_by(|a, b| {
        a.key
            .period
            .cmp(&b.key.period)
            .then_with(|| a.key.business_unit.cmp(&b.key.business_unit))
            .then_with(|| a.key.platform.cmp(&b.key.platform))
    });
}

fn conflict(key: &ReportKey, expected: u64, actual: u64) -> AdSpendError {
    AdSpendError::VersionConflict {
        key: key.to_string(),
        expected,
        actual,
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn find_report(&self, key: &ReportKey) -> AdSpendResult<Option<Report>> {
        Ok(self.reports.get(key).map(|r| r.value().clone()))
    }

    async fn upsert_report(&self, mut report: Report) -> AdSpendResult<Report> {
        let key = report.key.clone();
        match self.reports.entry(key) {
            Entry::Occupied(mut entry) => {
                let actual = entry.get().version;
                if actual != report.version {
                    return Err(conflict(entry.key(), report.version, actual));
                }
                report.version = actual + 1;
                report.updated_at = Some(Utc::now());
                entry.insert(report.clone());
            }
            Entry::Vacant(entry) => {
                if report.version != 0 {
                    return Err(conflict(entry.key(), report.version, 0));
                }
                report.version = 1;
                report.updated_at = Some(Utc::now());
                entry.insert(report.clone());
            }
        }
        debug!(key = %report.key, version = report.version, "report stored");
        Ok(report)
    }

    async fn list_reports(&self, filter: &ReportFilter) -> AdSpendResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|r| filter.matches(r.key()))
            .map(|r| r.value().clone())
            .collect();
        sort_reports(&mut reports);
        Ok(reports)
    }
}
