//! Facade consumed by the dashboard: preview and sync on the write side,
//! aggregations on the read side.

use std::sync::Arc;

use adspend_core::{
    AdSpendError, AdSpendResult, AppConfig, CampaignRecord, DateRange, MonthRange, Report,
    ReportFilter, ReportKey, SyncRequest, SyncResult,
};
use adspend_reporting::aggregator::{
    PlatformSummary, RankedCampaign, TrendPoint, TypeRoi, UnitSummary,
};
use adspend_reporting::{Ranking, RevenueSource, SpendAggregator};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::adapters::InsightSource;
use crate::history::SyncHistoryEntry;
use crate::preview::SyncPreview;
use crate::reconciler::SyncEngine;
use crate::repository::CampaignRepository;

pub struct AdSpendService {
    engine: SyncEngine,
    repository: Arc<dyn CampaignRepository>,
    revenue: Arc<dyn RevenueSource>,
    config: AppConfig,
}

impl AdSpendService {
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        revenue: Arc<dyn RevenueSource>,
        config: AppConfig,
    ) -> Self {
        Self {
            engine: SyncEngine::new(Arc::clone(&repository), config.sync.clone()),
            repository,
            revenue,
            config,
        }
    }

    pub fn register_source(&self, source: Arc<dyn InsightSource>) {
        self.engine.register_source(source);
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn request(
        &self,
        business_unit: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AdSpendResult<SyncRequest> {
        let range = DateRange::new(from, to)?;
        Ok(SyncRequest::new(business_unit, range)
            .on_platform(self.config.sync.default_platform.clone()))
    }

    // ─── Write side ─────────────────────────────────────────────────────────

    pub async fn preview(
        &self,
        business_unit: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AdSpendResult<SyncPreview> {
        let request = self.request(business_unit, from, to)?;
        self.engine.preview(&request).await
    }

    pub async fn sync(
        &self,
        business_unit: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AdSpendResult<SyncResult> {
        let request = self.request(business_unit, from, to)?;
        self.engine.sync(&request).await
    }

    pub fn sync_history(&self) -> Vec<SyncHistoryEntry> {
        self.engine.history().recent()
    }

    /// Manual-entry write: insert or replace one campaign by external id.
    pub async fn record_manual_campaign(
        &self,
        key: ReportKey,
        record: CampaignRecord,
    ) -> AdSpendResult<Report> {
        record.validate()?;
        // keys built by hand may carry a raw unit name
        let key = ReportKey::new(&key.business_unit, key.platform, key.period);

        let max_attempts = self.config.sync.max_conflict_retries + 1;
        for attempt in 1..=max_attempts {
            let mut report = self
                .repository
                .find_report(&key)
                .await?
                .unwrap_or_else(|| Report::empty(key.clone()));
            let inserted = report.upsert_campaign(record.clone());

            match self.repository.upsert_report(report).await {
                Ok(stored) => {
                    info!(
                        key = %key,
                        external_id = %record.external_id,
                        inserted,
                        "manual campaign recorded"
                    );
                    return Ok(stored);
                }
                Err(AdSpendError::VersionConflict { .. }) => {
                    warn!(key = %key, attempt, "report changed underneath manual entry, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AdSpendError::ConflictRetryExhausted {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    // ─── Read side ──────────────────────────────────────────────────────────

    /// Monthly points over `window`; any months in `filter` are replaced by
    /// the window.
    pub async fn trend(
        &self,
        window: MonthRange,
        filter: &ReportFilter,
    ) -> AdSpendResult<Vec<TrendPoint>> {
        let scoped = filter.clone().with_months(window);
        let reports = self.repository.list_reports(&scoped).await?;
        Ok(SpendAggregator::new(&reports).monthly_trend(window))
    }

    pub async fn unit_summary(&self, filter: &ReportFilter) -> AdSpendResult<Vec<UnitSummary>> {
        let reports = self.repository.list_reports(filter).await?;
        let previous = self.previous_window(filter).await?;
        Ok(SpendAggregator::new(&reports).unit_summary(previous.as_deref()))
    }

    pub async fn platform_distribution(
        &self,
        filter: &ReportFilter,
    ) -> AdSpendResult<Vec<PlatformSummary>> {
        let reports = self.repository.list_reports(filter).await?;
        let previous = self.previous_window(filter).await?;
        Ok(SpendAggregator::new(&reports)
            .platform_distribution(previous.as_deref(), |p| self.engine.is_automatic(p)))
    }

    pub async fn roi_by_type(&self, filter: &ReportFilter) -> AdSpendResult<Vec<TypeRoi>> {
        let reports = self.repository.list_reports(filter).await?;
        Ok(SpendAggregator::new(&reports).roi_by_type(self.revenue.as_ref()))
    }

    pub async fn top_campaigns(
        &self,
        filter: &ReportFilter,
        n: usize,
        ranking: Ranking,
    ) -> AdSpendResult<Vec<RankedCampaign>> {
        let reports = self.repository.list_reports(filter).await?;
        Ok(SpendAggregator::new(&reports).top_campaigns(n, ranking, self.revenue.as_ref()))
    }

    /// Reports for the window of equal length right before `filter.months`.
    async fn previous_window(&self, filter: &ReportFilter) -> AdSpendResult<Option<Vec<Report>>> {
        let Some(months) = filter.months else {
            return Ok(None);
        };
        let preceding = months.preceding();
        debug!(current = ?months, previous = ?preceding, "loading comparison window");
        let reports = self
            .repository
            .list_reports(&filter.clone().with_months(preceding))
            .await?;
        Ok(Some(reports))
    }
}
