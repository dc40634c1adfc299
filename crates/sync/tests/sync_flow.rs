//! End-to-end flow: preview, sync, then aggregate, against the in-memory
//! repository and scripted insight sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adspend_core::config::SyncConfig;
use adspend_core::{
    AdSpendError, AdSpendResult, AppConfig, CampaignRecord, DateRange, Insight, MonthRange,
    Report, ReportFilter, ReportKey, SyncRequest, SyncStatus, YearMonth,
};
use adspend_reporting::{Ranking, StaticRevenueSource};
use adspend_sync::{
    AdSpendService, CampaignRepository, InMemoryCampaignRepository, InsightSource,
    StaticInsightSource, SyncEngine,
};
use async_trait::async_trait;
use chrono::NaiveDate;

// ─── Test doubles ───────────────────────────────────────────────────────────

struct FailingSource;

#[async_trait]
impl InsightSource for FailingSource {
    fn platform(&self) -> &str {
        "external"
    }

    fn supported_units(&self) -> Vec<String> {
        vec!["montella".into()]
    }

    async fn fetch_insights(&self, _: &str, _: &DateRange) -> AdSpendResult<Vec<Insight>> {
        Err(AdSpendError::ExternalFetch("connection reset".into()))
    }
}

struct SlowSource;

#[async_trait]
impl InsightSource for SlowSource {
    fn platform(&self) -> &str {
        "external"
    }

    fn supported_units(&self) -> Vec<String> {
        vec!["montella".into()]
    }

    async fn fetch_insights(&self, _: &str, _: &DateRange) -> AdSpendResult<Vec<Insight>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![insight("C1", "product", 1_000.0)])
    }
}

/// Wraps the in-memory store but rejects every write as stale.
#[derive(Default)]
struct ContendedRepository {
    inner: InMemoryCampaignRepository,
    writes: AtomicUsize,
}

#[async_trait]
impl CampaignRepository for ContendedRepository {
    async fn find_report(&self, key: &ReportKey) -> AdSpendResult<Option<Report>> {
        self.inner.find_report(key).await
    }

    async fn upsert_report(&self, report: Report) -> AdSpendResult<Report> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(AdSpendError::VersionConflict {
            key: report.key.to_string(),
            expected: report.version,
            actual: report.version + 1,
        })
    }

    async fn list_reports(&self, filter: &ReportFilter) -> AdSpendResult<Vec<Report>> {
        self.inner.list_reports(filter).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn march() -> YearMonth {
    YearMonth::new(2024, 3).unwrap()
}

fn march_range() -> DateRange {
    DateRange::new(date(3, 1), date(3, 31)).unwrap()
}

fn insight(id: &str, tag: &str, spend: f64) -> Insight {
    Insight {
        external_id: Some(id.to_string()),
        name: format!("Campaign {}", id),
        type_tag: tag.to_string(),
        spend,
        impressions: 2_000,
        clicks: 50,
        reach: 1_500,
        date_from: date(3, 1),
        date_to: date(3, 31),
    }
}

fn units() -> Vec<String> {
    vec!["montella".into(), "alenka".into(), "kids".into()]
}

fn engine_with(
    source: Arc<dyn InsightSource>,
    config: SyncConfig,
) -> (SyncEngine, Arc<InMemoryCampaignRepository>) {
    let repo = Arc::new(InMemoryCampaignRepository::new());
    let engine = SyncEngine::new(repo.clone(), config);
    engine.register_source(source);
    (engine, repo)
}

// ─── Flow ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_preview_sync_aggregate() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights(
        "montella",
        vec![insight("C1", "product", 1_000.0), insight("C2", "brand", 400.0)],
    );
    source.set_insights("alenka", vec![insight("A1", "product", 600.0)]);

    let service = AdSpendService::new(
        Arc::new(InMemoryCampaignRepository::new()),
        Arc::new(StaticRevenueSource::new()),
        AppConfig::default(),
    );
    service.register_source(source);

    let preview = service.preview("montella", date(3, 1), date(3, 31)).await.unwrap();
    assert!(preview.can_proceed);
    assert_eq!(preview.summary.campaign_count, 2);
    assert!(!preview.summary.existing_report);

    service.sync("montella", date(3, 1), date(3, 31)).await.unwrap();
    service.sync("alenka", date(3, 1), date(3, 31)).await.unwrap();
    service
        .record_manual_campaign(
            ReportKey::new("kids", "radio", march()),
            CampaignRecord::manual("R1", "Radio", "brand", 250.0, march_range()),
        )
        .await
        .unwrap();

    let window = MonthRange::single(march());
    let filter = ReportFilter::all().with_months(window);
    let trend = service.trend(window, &ReportFilter::all()).await.unwrap();
    let grand_total = trend[0].total_spend;
    assert!((grand_total - 2_250.0).abs() < 1e-9);

    let units = service.unit_summary(&filter).await.unwrap();
    let unit_total: f64 = units.iter().map(|u| u.totals.spend).sum();
    assert!((unit_total - grand_total).abs() < 1e-9);

    let platforms = service.platform_distribution(&filter).await.unwrap();
    let platform_total: f64 = platforms.iter().map(|p| p.totals.spend).sum();
    assert!((platform_total - grand_total).abs() < 1e-9);

    let share_total: f64 = units.iter().map(|u| u.totals.share_percent).sum();
    assert!((share_total - 100.0).abs() < 1e-9);

    let top = service.top_campaigns(&filter, 2, Ranking::PerformanceScore).await.unwrap();
    assert_eq!(top.len(), 2);
    // equal ctr * reach on every pulled campaign; lower spend scores higher
    assert_eq!(top[0].campaign.external_id, "C2");
    assert_eq!(top[1].campaign.external_id, "A1");

    // a second preview now sees the stored report
    let again = service.preview("montella", date(3, 1), date(3, 31)).await.unwrap();
    assert!(again.summary.existing_report);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights("montella", vec![insight("C1", "product", 1_000.0)]);
    let (engine, repo) = engine_with(source, SyncConfig::default());
    let request = SyncRequest::new("montella", march_range());

    let first = engine.sync(&request).await.unwrap();
    assert_eq!(first.updated, vec!["C1"]);
    let after_first = repo.snapshot();

    let second = engine.sync(&request).await.unwrap();
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged, vec!["C1"]);
    // no write on a no-op run
    assert_eq!(repo.snapshot(), after_first);

    let history = engine.history().recent();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.status == SyncStatus::Completed));
}

#[tokio::test]
async fn test_duplicate_ids_resync_is_noop() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights(
        "montella",
        vec![insight("C1", "product", 100.0), insight("C1", "product", 200.0)],
    );
    let (engine, repo) = engine_with(source, SyncConfig::default());
    let request = SyncRequest::new("montella", march_range());
    let key = ReportKey::new("montella", "external", march());

    let first = engine.sync(&request).await.unwrap();
    assert_eq!(first.updated, vec!["C1"]);
    let stored = repo.find_report(&key).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert!((stored.find_campaign("C1").unwrap().spend - 200.0).abs() < f64::EPSILON);

    let second = engine.sync(&request).await.unwrap();
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged, vec!["C1"]);
    assert_eq!(repo.find_report(&key).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn test_unit_name_case_shares_one_report() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights("montella", vec![insight("C1", "product", 1_000.0)]);
    let repo = Arc::new(InMemoryCampaignRepository::new());
    let service = AdSpendService::new(
        repo.clone(),
        Arc::new(StaticRevenueSource::new()),
        AppConfig::default(),
    );
    service.register_source(source);

    let first = service.sync("montella", date(3, 1), date(3, 31)).await.unwrap();
    assert_eq!(first.updated, vec!["C1"]);
    let second = service.sync("Montella", date(3, 1), date(3, 31)).await.unwrap();
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged, vec!["C1"]);

    service
        .record_manual_campaign(
            ReportKey {
                business_unit: "MONTELLA".into(),
                platform: "radio".into(),
                period: march(),
            },
            CampaignRecord::manual("R1", "Radio", "brand", 250.0, march_range()),
        )
        .await
        .unwrap();

    let reports = repo
        .list_reports(&ReportFilter::all().with_unit("montella"))
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.key.business_unit == "montella"));

    let units = service.unit_summary(&ReportFilter::all()).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].business_unit, "montella");
    assert!((units[0].totals.spend - 1_250.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_sync_is_additive_only() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights("montella", vec![insight("C1", "product", 1_000.0)]);
    let (engine, repo) = engine_with(source, SyncConfig::default());

    let key = ReportKey::new("montella", "external", march());
    let mut seeded = Report::empty(key.clone());
    let mut manual = CampaignRecord::manual("X", "Influencers", "brand", 300.0, march_range());
    manual.followers_gained = Some(80);
    seeded.upsert_campaign(manual.clone());
    repo.upsert_report(seeded).await.unwrap();

    let result = engine.sync(&SyncRequest::new("montella", march_range())).await.unwrap();
    assert_eq!(result.updated, vec!["C1"]);

    let stored = repo.find_report(&key).await.unwrap().unwrap();
    assert_eq!(stored.campaigns.len(), 2);
    assert_eq!(stored.find_campaign("X"), Some(&manual));
}

#[tokio::test]
async fn test_malformed_records_are_partially_accepted() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    let mut missing = insight("?", "product", 5.0);
    missing.external_id = None;
    source.set_insights(
        "montella",
        vec![insight("C1", "product", 1_000.0), missing, insight("C2", "brand", -10.0)],
    );
    let (engine, repo) = engine_with(source, SyncConfig::default());

    let result = engine.sync(&SyncRequest::new("montella", march_range())).await.unwrap();
    assert_eq!(result.updated, vec!["C1"]);
    assert_eq!(result.malformed.len(), 2);
    assert_eq!(repo.snapshot()[0].campaigns.len(), 1);
    assert_eq!(engine.history().recent()[0].status, SyncStatus::PartialSuccess);
}

// ─── Failures ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_failure_leaves_state_untouched() {
    let (engine, repo) = engine_with(Arc::new(FailingSource), SyncConfig::default());

    let err = engine
        .sync(&SyncRequest::new("montella", march_range()))
        .await
        .unwrap_err();
    assert!(matches!(err, AdSpendError::ExternalFetch(_)));
    assert!(err.is_retryable());
    assert!(repo.is_empty());

    let history = engine.history().recent();
    assert_eq!(history[0].status, SyncStatus::Failed);
    assert!(history[0].error.is_some());

    // preview surfaces the transport error too
    assert!(engine
        .preview(&SyncRequest::new("montella", march_range()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let config = SyncConfig {
        fetch_timeout_ms: 50,
        ..SyncConfig::default()
    };
    let (engine, repo) = engine_with(Arc::new(SlowSource), config);

    let err = engine
        .sync(&SyncRequest::new("montella", march_range()))
        .await
        .unwrap_err();
    assert!(matches!(err, AdSpendError::ExternalFetch(ref msg) if msg.contains("50 ms")));
    assert!(repo.is_empty());
}

#[tokio::test]
async fn test_unsupported_unit() {
    let source = Arc::new(StaticInsightSource::new("external", vec!["montella".into()]));
    let (engine, repo) = engine_with(source, SyncConfig::default());
    let request = SyncRequest::new("kids", march_range());

    let preview = engine.preview(&request).await.unwrap();
    assert!(!preview.can_proceed);
    assert_eq!(
        preview.blocking_errors,
        vec![adspend_sync::BlockingError::UnsupportedUnit {
            business_unit: "kids".into()
        }]
    );

    let err = engine.sync(&request).await.unwrap_err();
    assert!(matches!(err, AdSpendError::UnsupportedUnit(_)));
    assert!(repo.is_empty());
}

#[tokio::test]
async fn test_unknown_platform() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    let (engine, _) = engine_with(source, SyncConfig::default());
    let request = SyncRequest::new("montella", march_range()).on_platform("tiktok");

    let err = engine.sync(&request).await.unwrap_err();
    assert!(matches!(err, AdSpendError::UnknownPlatform(_)));

    assert_eq!(engine.list_platforms(), vec!["external"]);
    engine.remove_source("external").unwrap();
    assert!(engine.list_platforms().is_empty());
    assert!(engine.remove_source("external").is_err());
}

// ─── Concurrency ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_syncs_on_one_key_lose_nothing() {
    let repo = Arc::new(InMemoryCampaignRepository::new());
    let config = SyncConfig {
        max_conflict_retries: 50,
        ..SyncConfig::default()
    };

    // eight engines racing on the same report key
    let mut handles = Vec::new();
    for batch in 0..8 {
        let source = StaticInsightSource::new("external", units());
        let pulled: Vec<Insight> = (0..5)
            .map(|i| insight(&format!("B{}-{}", batch, i), "product", 10.0))
            .collect();
        source.set_insights("montella", pulled);

        let engine = SyncEngine::new(repo.clone(), config.clone());
        engine.register_source(Arc::new(source));
        handles.push(tokio::spawn(async move {
            engine.sync(&SyncRequest::new("montella", march_range())).await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.updated.len(), 5);
    }

    let key = ReportKey::new("montella", "external", march());
    let stored = repo.find_report(&key).await.unwrap().unwrap();
    assert_eq!(stored.campaigns.len(), 40);
    assert!(stored.version >= 1);
}

#[tokio::test]
async fn test_persistent_conflicts_surface_as_retryable() {
    let source = Arc::new(StaticInsightSource::new("external", units()));
    source.set_insights("montella", vec![insight("C1", "product", 1_000.0)]);

    let repo = Arc::new(ContendedRepository::default());
    let config = SyncConfig {
        max_conflict_retries: 3,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::new(repo.clone(), config);
    engine.register_source(source);

    let err = engine
        .sync(&SyncRequest::new("montella", march_range()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdSpendError::ConflictRetryExhausted { attempts: 4, .. }
    ));
    assert!(err.is_retryable());
    assert_eq!(repo.writes.load(Ordering::SeqCst), 4);
}
