use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AdSpendResult<T> = Result<T, AdSpendError>;

#[derive(Error, Debug)]
pub enum AdSpendError {
    #[error("External fetch error: {0}")]
    ExternalFetch(String),

    #[error("Business unit '{0}' is not supported by the ad platform")]
    UnsupportedUnit(String),

    #[error("No campaign data for {business_unit} between {from} and {to}")]
    NoData {
        business_unit: String,
        from: NaiveDate,
        to: NaiveDate,
    },

    #[error("Report {key} is under contention: gave up after {attempts} attempts")]
    ConflictRetryExhausted { key: String, attempts: u32 },

    /// Compare-and-swap rejection from the repository. The reconciler retries
    /// on this and only surfaces `ConflictRetryExhausted`.
    #[error("Version conflict on report {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] MalformedReason),

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("No insight source registered for platform '{0}'")]
    UnknownPlatform(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AdSpendError {
    /// Whether the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdSpendError::ExternalFetch(_) | AdSpendError::ConflictRetryExhausted { .. }
        )
    }
}

/// Why a single insight was rejected during a sync.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedReason {
    #[error("missing external campaign id")]
    MissingExternalId,

    #[error("negative spend {spend}")]
    NegativeSpend { spend: f64 },

    #[error("spend is not a finite number")]
    NonFiniteSpend,

    #[error("date range starts {from} after it ends {to}")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
}
