//! Ad-platform reconciliation: insight sources, the report repository, the
//! sync engine with its preview step, and the service facade consumed by the
//! dashboard.

pub mod adapters;
pub mod history;
pub mod preview;
pub mod reconciler;
pub mod repository;
pub mod service;

pub use adapters::{InsightSource, JsonFileInsightSource, StaticInsightSource};
pub use history::{SyncHistory, SyncHistoryEntry};
pub use preview::{BlockingError, PreviewWarning, SyncPreview};
pub use reconciler::SyncEngine;
pub use repository::{CampaignRepository, InMemoryCampaignRepository};
pub use service::AdSpendService;
