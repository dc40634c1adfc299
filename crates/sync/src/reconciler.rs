use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adspend_core::config::SyncConfig;
use adspend_core::{
    AdSpendError, AdSpendResult, CampaignRecord, DateRange, Insight, MalformedRecord, Report,
    ReportKey, SyncRequest, SyncResult,
};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::adapters::InsightSource;
use crate::history::{SyncHistory, SyncHistoryEntry};
use crate::repository::CampaignRepository;

/// Merge a pulled insight sequence into `report`.
///
/// Records missing from the pull are left alone. Duplicate ids resolve
/// last-write-wins in pull order, and each id is compared against the stored
/// record once, so replaying the same pull reports everything unchanged.
pub fn merge_insights(report: &mut Report, insights: &[Insight]) -> SyncResult {
    let mut result = SyncResult::default();

    // last valid insight per id, first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, CampaignRecord> = HashMap::new();
    for (position, insight) in insights.iter().enumerate() {
        match CampaignRecord::try_from_insight(insight) {
            Ok(record) => {
                let id = record.external_id.clone();
                if latest.insert(id.clone(), record).is_none() {
                    order.push(id);
                }
            }
            Err(reason) => {
                warn!(
                    key = %report.key,
                    position,
                    reason = %reason,
                    "skipping malformed insight"
                );
                result.malformed.push(MalformedRecord {
                    position,
                    external_id: insight.external_id.clone(),
                    reason,
                });
            }
        }
    }

    let index: HashMap<String, usize> = report
        .campaigns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.external_id.clone(), i))
        .collect();

    for id in order {
        let Some(pulled) = latest.remove(&id) else {
            continue;
        };
        match index.get(&id) {
            None => {
                debug!(key = %report.key, external_id = %id, "new campaign");
                report.campaigns.push(pulled);
                result.updated.push(id);
            }
            Some(&i) if report.campaigns[i].matches_pulled(&pulled) => {
                result.unchanged.push(id);
            }
            Some(&i) => {
                debug!(key = %report.key, external_id = %id, "campaign changed");
                report.campaigns[i].absorb_pulled(pulled);
                result.updated.push(id);
            }
        }
    }

    result
}

/// Engine that reconciles ad-platform insights into stored reports.
pub struct SyncEngine {
    sources: DashMap<String, Arc<dyn InsightSource>>,
    repository: Arc<dyn CampaignRepository>,
    history: SyncHistory,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(repository: Arc<dyn CampaignRepository>, config: SyncConfig) -> Self {
        Self {
            sources: DashMap::new(),
            repository,
            history: SyncHistory::new(config.history_capacity),
            config,
        }
    }

    /// Register the insight source for its platform, replacing any previous
    /// one.
    pub fn register_source(&self, source: Arc<dyn InsightSource>) {
        let platform = source.platform().to_string();
        info!(
            platform = %platform,
            units = ?source.supported_units(),
            "registered insight source"
        );
        self.sources.insert(platform, source);
    }

    pub fn remove_source(&self, platform: &str) -> AdSpendResult<()> {
        self.sources
            .remove(platform)
            .ok_or_else(|| AdSpendError::UnknownPlatform(platform.to_string()))?;
        info!(platform = %platform, "removed insight source");
        Ok(())
    }

    /// Platforms with a registered source, sorted.
    pub fn list_platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.sources.iter().map(|e| e.key().clone()).collect();
        platforms.sort();
        platforms
    }

    /// Whether reports on `platform` are fed automatically.
    pub fn is_automatic(&self, platform: &str) -> bool {
        self.sources.contains_key(platform)
    }

    pub fn source(&self, platform: &str) -> AdSpendResult<Arc<dyn InsightSource>> {
        self.sources
            .get(platform)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AdSpendError::UnknownPlatform(platform.to_string()))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn CampaignRepository> {
        &self.repository
    }

    pub fn history(&self) -> &SyncHistory {
        &self.history
    }

    /// Pull insights under the configured timeout.
    pub async fn fetch_insights(
        &self,
        source: &dyn InsightSource,
        business_unit: &str,
        range: &DateRange,
    ) -> AdSpendResult<Vec<Insight>> {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        match tokio::time::timeout(timeout, source.fetch_insights(business_unit, range)).await {
            Ok(Ok(insights)) => Ok(insights),
            Ok(Err(e)) => {
                metrics::counter!("sync.fetch.failures").increment(1);
                Err(e)
            }
            Err(_) => {
                metrics::counter!("sync.fetch.failures").increment(1);
                Err(AdSpendError::ExternalFetch(format!(
                    "{} did not answer within {} ms",
                    source.platform(),
                    self.config.fetch_timeout_ms
                )))
            }
        }
    }

    /// Reconcile one unit and date range.
    ///
    /// Transport failures leave storage untouched. Malformed insights are
    /// skipped and reported in the result.
    pub async fn sync(&self, request: &SyncRequest) -> AdSpendResult<SyncResult> {
        let started_at = Utc::now();
        metrics::counter!("sync.runs").increment(1);

        let outcome = self.run(request).await;
        let entry = match &outcome {
            Ok(result) => SyncHistoryEntry::succeeded(
                &request.business_unit,
                &request.platform,
                request.date_range,
                result,
                started_at,
            ),
            Err(e) => SyncHistoryEntry::failed(
                &request.business_unit,
                &request.platform,
                request.date_range,
                e.to_string(),
                started_at,
            ),
        };
        self.history.record(entry);
        outcome
    }

    async fn run(&self, request: &SyncRequest) -> AdSpendResult<SyncResult> {
        request.date_range.validate()?;
        let source = self.source(&request.platform)?;
        if !source.supports_unit(&request.business_unit) {
            return Err(AdSpendError::UnsupportedUnit(request.business_unit.clone()));
        }

        info!(
            business_unit = %request.business_unit,
            platform = %request.platform,
            range = %request.date_range,
            "sync started"
        );

        let insights = self
            .fetch_insights(source.as_ref(), &request.business_unit, &request.date_range)
            .await
            .map_err(|e| {
                warn!(business_unit = %request.business_unit, error = %e, "insight pull failed");
                e
            })?;

        let key = request.report_key();
        let result = self.merge_with_retry(&key, &insights).await?;

        metrics::counter!("sync.campaigns.updated").increment(result.updated.len() as u64);
        metrics::counter!("sync.campaigns.unchanged").increment(result.unchanged.len() as u64);
        metrics::counter!("sync.records.malformed").increment(result.malformed.len() as u64);
        info!(
            key = %key,
            pulled = insights.len(),
            updated = result.updated.len(),
            unchanged = result.unchanged.len(),
            malformed = result.malformed.len(),
            "sync finished"
        );
        Ok(result)
    }

    /// Read, merge, write-if-unchanged; re-read and re-merge on conflict.
    async fn merge_with_retry(
        &self,
        key: &ReportKey,
        insights: &[Insight],
    ) -> AdSpendResult<SyncResult> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let mut report = self
                .repository
                .find_report(key)
                .await?
                .unwrap_or_else(|| Report::empty(key.clone()));

            let result = merge_insights(&mut report, insights);
            if result.updated.is_empty() {
                // nothing to write
                return Ok(result);
            }

            match self.repository.upsert_report(report).await {
                Ok(stored) => {
                    debug!(key = %key, version = stored.version, attempts, "report written");
                    return Ok(result);
                }
                Err(AdSpendError::VersionConflict { expected, actual, .. }) => {
                    metrics::counter!("sync.conflicts").increment(1);
                    if attempts > self.config.max_conflict_retries {
                        warn!(key = %key, attempts, "giving up on contended report");
                        return Err(AdSpendError::ConflictRetryExhausted {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        key = %key,
                        expected,
                        actual,
                        attempts,
                        "report changed underneath, retrying"
                    );
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adspend_core::{AutomaticMetrics, MalformedReason, YearMonth};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn empty_report() -> Report {
        Report::empty(ReportKey::new(
            "montella",
            "external",
            YearMonth::new(2024, 3).unwrap(),
        ))
    }

    fn insight(id: &str, spend: f64) -> Insight {
        Insight {
            external_id: Some(id.to_string()),
            name: format!("Campaign {}", id),
            type_tag: "product".to_string(),
            spend,
            impressions: 2_000,
            clicks: 50,
            reach: 1_500,
            date_from: date(1),
            date_to: date(31),
        }
    }

    // 1. Merge ---------------------------------------------------------------

    #[test]
    fn test_merge_inserts_then_is_idempotent() {
        let mut report = empty_report();
        let pull = vec![insight("C1", 1_000.0), insight("C2", 250.0)];

        let first = merge_insights(&mut report, &pull);
        assert_eq!(first.updated, vec!["C1", "C2"]);
        assert!(first.unchanged.is_empty());

        let second = merge_insights(&mut report, &pull);
        assert!(second.updated.is_empty());
        assert_eq!(second.unchanged, vec!["C1", "C2"]);
        assert_eq!(report.campaigns.len(), 2);
    }

    #[test]
    fn test_merge_updates_changed_and_preserves_manual_fields() {
        let mut report = empty_report();
        merge_insights(&mut report, &[insight("C1", 1_000.0)]);
        {
            let stored = report.find_campaign_mut("C1").unwrap();
            stored.objective = "Awareness".to_string();
            stored.result_notes = "Strong start".to_string();
            stored.followers_gained = Some(42);
        }

        let mut changed = insight("C1", 1_300.0);
        changed.clicks = 80;
        let result = merge_insights(&mut report, &[changed]);
        assert_eq!(result.updated, vec!["C1"]);

        let stored = report.find_campaign("C1").unwrap();
        assert!((stored.spend - 1_300.0).abs() < f64::EPSILON);
        assert_eq!(stored.automatic.unwrap().clicks, 80);
        assert_eq!(stored.objective, "Awareness");
        assert_eq!(stored.result_notes, "Strong start");
        assert_eq!(stored.followers_gained, Some(42));
    }

    #[test]
    fn test_merge_never_touches_unmentioned_records() {
        let mut report = empty_report();
        let range = DateRange::new(date(1), date(31)).unwrap();
        let manual = CampaignRecord::manual("X", "Radio spot", "brand", 700.0, range);
        report.upsert_campaign(manual.clone());

        merge_insights(&mut report, &[insight("C1", 1_000.0)]);
        assert_eq!(report.find_campaign("X"), Some(&manual));
        assert_eq!(report.campaigns.len(), 2);
    }

    #[test]
    fn test_merge_partial_accepts_malformed() {
        let mut report = empty_report();
        let mut missing = insight("ignored", 10.0);
        missing.external_id = None;
        let pull = vec![insight("C1", 1_000.0), missing, insight("C2", -3.0)];

        let result = merge_insights(&mut report, &pull);
        assert_eq!(result.updated, vec!["C1"]);
        assert_eq!(result.malformed.len(), 2);
        assert_eq!(result.malformed[0].position, 1);
        assert_eq!(result.malformed[0].reason, MalformedReason::MissingExternalId);
        assert_eq!(result.malformed[1].external_id.as_deref(), Some("C2"));
        assert_eq!(report.campaigns.len(), 1);
    }

    #[test]
    fn test_merge_duplicates_replay_unchanged() {
        let mut report = empty_report();
        let pull = vec![insight("C1", 100.0), insight("C2", 5.0), insight("C1", 200.0)];
        let first = merge_insights(&mut report, &pull);
        assert_eq!(first.updated, vec!["C1", "C2"]);

        let second = merge_insights(&mut report, &pull);
        assert!(second.updated.is_empty());
        assert_eq!(second.unchanged, vec!["C1", "C2"]);
        assert!((report.find_campaign("C1").unwrap().spend - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_duplicate_keeps_last_valid() {
        let mut report = empty_report();
        let result = merge_insights(&mut report, &[insight("C1", 100.0), insight("C1", -1.0)]);
        assert_eq!(result.updated, vec!["C1"]);
        assert_eq!(result.malformed.len(), 1);
        assert_eq!(result.malformed[0].position, 1);
        assert!((report.find_campaign("C1").unwrap().spend - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_duplicates_last_write_wins() {
        let mut report = empty_report();
        let result = merge_insights(&mut report, &[insight("C1", 100.0), insight("C1", 200.0)]);
        assert_eq!(result.updated, vec!["C1"]);
        assert_eq!(report.campaigns.len(), 1);
        assert!((report.find_campaign("C1").unwrap().spend - 200.0).abs() < f64::EPSILON);
        assert_eq!(
            report.find_campaign("C1").unwrap().automatic,
            Some(AutomaticMetrics {
                impressions: 2_000,
                clicks: 50,
                reach: 1_500
            })
        );
    }
}
