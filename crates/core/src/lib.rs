pub mod config;
pub mod error;
pub mod period;
pub mod types;

pub use config::AppConfig;
pub use error::{AdSpendError, AdSpendResult, MalformedReason};
pub use period::{DateRange, MonthRange, YearMonth};
pub use types::{
    AutomaticMetrics, CampaignRecord, Insight, MalformedRecord, Report, ReportFilter, ReportKey,
    SyncRequest, SyncResult, SyncStatus, EXTERNAL_PLATFORM,
};
pub use types::normalize_unit;
