//! adspend: reconcile ad-platform spend into monthly reports and query the
//! dashboard aggregations from the command line.

mod snapshot;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adspend_core::{AppConfig, MonthRange, ReportFilter, YearMonth};
use adspend_reporting::revenue::RevenueEntry;
use adspend_reporting::{NoRevenue, Ranking, RevenueSource, StaticRevenueSource};
use adspend_sync::{AdSpendService, InMemoryCampaignRepository, JsonFileInsightSource};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use crate::snapshot::StoreSnapshot;

#[derive(Parser, Debug)]
#[command(name = "adspend")]
#[command(about = "Advertising spend reconciliation and reporting")]
#[command(version)]
struct Cli {
    /// Report snapshot file read at start and rewritten after writes
    #[arg(long, env = "ADSPEND_STORE", default_value = "adspend-store.json")]
    store: PathBuf,

    /// Insights export used as the ad-platform source
    #[arg(long, env = "ADSPEND_INSIGHTS")]
    insights: Option<PathBuf>,

    /// Revenue figures (JSON array of entries)
    #[arg(long, env = "ADSPEND_REVENUE")]
    revenue: Option<PathBuf>,

    /// Config file stem or path (defaults to `adspend`)
    #[arg(long)]
    config: Option<String>,

    /// Pull timeout in milliseconds (overrides config)
    #[arg(long, env = "ADSPEND__SYNC__FETCH_TIMEOUT_MS")]
    fetch_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dry-run a sync and print the confirmation summary
    Preview(RangeArgs),
    /// Preview, then reconcile if nothing blocks
    Sync(RangeArgs),
    /// Monthly spend trend
    Trend {
        /// Last month of the window (defaults to the current month)
        #[arg(long)]
        to: Option<YearMonth>,
        /// Window length in months (overrides config)
        #[arg(long)]
        months: Option<u32>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Spend per business unit
    Units(ScopeArgs),
    /// Spend per platform
    Platforms(ScopeArgs),
    /// ROI per campaign type
    RoiByType(ScopeArgs),
    /// Best campaigns
    Top {
        /// How many (overrides config)
        #[arg(long, short)]
        n: Option<usize>,
        #[arg(long, value_enum, default_value_t = RankBy::Score)]
        by: RankBy,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Recent sync runs
    History,
}

#[derive(Args, Debug)]
struct RangeArgs {
    business_unit: String,
    #[arg(long)]
    from: NaiveDate,
    #[arg(long)]
    to: NaiveDate,
}

#[derive(Args, Debug, Clone)]
struct ScopeArgs {
    #[arg(long)]
    unit: Option<String>,
    #[arg(long)]
    platform: Option<String>,
    /// First month in scope, YYYY-MM
    #[arg(long)]
    from_month: Option<YearMonth>,
    /// Last month in scope, YYYY-MM
    #[arg(long)]
    to_month: Option<YearMonth>,
}

impl ScopeArgs {
    fn filter(&self) -> anyhow::Result<ReportFilter> {
        let mut filter = ReportFilter::all();
        if let Some(unit) = &self.unit {
            filter = filter.with_unit(unit.clone());
        }
        if let Some(platform) = &self.platform {
            filter = filter.with_platform(platform.clone());
        }
        let months = match (self.from_month, self.to_month) {
            (Some(from), Some(to)) => Some(MonthRange::new(from, to)?),
            (Some(month), None) | (None, Some(month)) => Some(MonthRange::single(month)),
            (None, None) => None,
        };
        if let Some(months) = months {
            filter = filter.with_months(months);
        }
        Ok(filter)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum RankBy {
    Score,
    Revenue,
}

impl From<RankBy> for Ranking {
    fn from(value: RankBy) -> Self {
        match value {
            RankBy::Score => Ranking::PerformanceScore,
            RankBy::Revenue => Ranking::Revenue,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adspend=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(file) => AppConfig::load_from(file),
        None => AppConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(timeout) = cli.fetch_timeout_ms {
        config.sync.fetch_timeout_ms = timeout;
    }
    info!(
        platform = %config.sync.default_platform,
        fetch_timeout_ms = config.sync.fetch_timeout_ms,
        units = ?config.sync.supported_units,
        "Configuration loaded"
    );

    let snapshot = StoreSnapshot::load(&cli.store).await?;
    let repository = Arc::new(InMemoryCampaignRepository::from_reports(snapshot.reports));
    let revenue = load_revenue(cli.revenue.as_deref()).await?;
    let service = AdSpendService::new(repository.clone(), revenue, config.clone());
    StoreSnapshot::restore_history(snapshot.history, service.engine());

    if let Some(path) = &cli.insights {
        service.register_source(Arc::new(JsonFileInsightSource::new(
            config.sync.default_platform.clone(),
            path,
            config.sync.supported_units.clone(),
        )));
    }

    match cli.command {
        Command::Preview(range) => {
            let preview = service
                .preview(&range.business_unit, range.from, range.to)
                .await?;
            print_json(&preview)?;
        }
        Command::Sync(range) => {
            let preview = service
                .preview(&range.business_unit, range.from, range.to)
                .await?;
            if !preview.can_proceed {
                print_json(&preview)?;
                let reasons: Vec<String> =
                    preview.blocking_errors.iter().map(|e| e.message()).collect();
                anyhow::bail!("sync blocked: {}", reasons.join("; "));
            }
            let outcome = service
                .sync(&range.business_unit, range.from, range.to)
                .await;
            StoreSnapshot::save(&cli.store, &repository, service.engine()).await?;
            print_json(&outcome?)?;
        }
        Command::Trend { to, months, scope } => {
            let last = to.unwrap_or_else(|| YearMonth::of(Utc::now().date_naive()));
            let months = months.unwrap_or(config.reporting.trend_months);
            let window = MonthRange::trailing(last, months);
            print_json(&service.trend(window, &scope.filter()?).await?)?;
        }
        Command::Units(scope) => {
            print_json(&service.unit_summary(&scope.filter()?).await?)?;
        }
        Command::Platforms(scope) => {
            print_json(&service.platform_distribution(&scope.filter()?).await?)?;
        }
        Command::RoiByType(scope) => {
            print_json(&service.roi_by_type(&scope.filter()?).await?)?;
        }
        Command::Top { n, by, scope } => {
            let n = n.unwrap_or(config.reporting.default_top_n);
            print_json(&service.top_campaigns(&scope.filter()?, n, by.into()).await?)?;
        }
        Command::History => {
            print_json(&service.sync_history())?;
        }
    }

    Ok(())
}

async fn load_revenue(path: Option<&Path>) -> anyhow::Result<Arc<dyn RevenueSource>> {
    let Some(path) = path else {
        return Ok(Arc::new(NoRevenue));
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<RevenueEntry> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), entries = entries.len(), "revenue figures loaded");
    Ok(Arc::new(StaticRevenueSource::from_entries(entries)))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
