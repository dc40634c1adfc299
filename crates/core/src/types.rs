//! Campaign, report and sync types shared by the reconciler and the aggregator.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MalformedReason;
use crate::period::{DateRange, MonthRange, YearMonth};

/// Platform name for campaigns pulled from the ad-platform API.
pub const EXTERNAL_PLATFORM: &str = "external";

/// Canonical business-unit name used in report keys and sync requests.
pub fn normalize_unit(name: &str) -> String {
    name.trim().to_lowercase()
}

fn deserialize_unit<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|raw| normalize_unit(&raw))
}

// ─── Campaigns ──────────────────────────────────────────────────────────────

/// Metrics only the ad-platform API reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub reach: u64,
}

/// One advertising campaign's performance for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    /// Unique within its report only.
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub type_tag: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub result_notes: String,
    pub spend: f64,
    pub date_range: DateRange,
    /// `None` means not tracked. Travels as `-1` on the wire.
    #[serde(default, with = "followers_sentinel")]
    pub followers_gained: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<AutomaticMetrics>,
}

impl CampaignRecord {
    /// A manually reported campaign with no automatic metrics.
    pub fn manual(
        external_id: impl Into<String>,
        name: impl Into<String>,
        type_tag: impl Into<String>,
        spend: f64,
        date_range: DateRange,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            type_tag: type_tag.into(),
            objective: String::new(),
            result_notes: String::new(),
            spend,
            date_range,
            followers_gained: None,
            automatic: None,
        }
    }

    /// Build a record from a pulled insight. Manual-only fields start at their
    /// zero values.
    pub fn try_from_insight(insight: &Insight) -> Result<Self, MalformedReason> {
        let external_id = insight
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MalformedReason::MissingExternalId)?;
        if !insight.spend.is_finite() {
            return Err(MalformedReason::NonFiniteSpend);
        }
        if insight.spend < 0.0 {
            return Err(MalformedReason::NegativeSpend {
                spend: insight.spend,
            });
        }
        if insight.date_from > insight.date_to {
            return Err(MalformedReason::InvertedDateRange {
                from: insight.date_from,
                to: insight.date_to,
            });
        }

        Ok(Self {
            external_id: external_id.to_string(),
            name: insight.name.clone(),
            type_tag: insight.type_tag.clone(),
            objective: String::new(),
            result_notes: String::new(),
            spend: insight.spend,
            date_range: DateRange {
                start: insight.date_from,
                end: insight.date_to,
            },
            followers_gained: Some(0),
            automatic: Some(AutomaticMetrics {
                impressions: insight.impressions,
                clicks: insight.clicks,
                reach: insight.reach,
            }),
        })
    }

    /// Compares only the fields an insight carries. `objective`,
    /// `result_notes` and `followers_gained` never take part.
    pub fn matches_pulled(&self, pulled: &CampaignRecord) -> bool {
        self.name == pulled.name
            && self.type_tag == pulled.type_tag
            && self.spend == pulled.spend
            && self.date_range == pulled.date_range
            && self.automatic == pulled.automatic
    }

    /// Overwrite the insight-carried fields, keeping manual-only ones.
    pub fn absorb_pulled(&mut self, pulled: CampaignRecord) {
        self.name = pulled.name;
        self.type_tag = pulled.type_tag;
        self.spend = pulled.spend;
        self.date_range = pulled.date_range;
        self.automatic = pulled.automatic;
    }

    /// Followers counted toward sums; untracked records contribute zero.
    pub fn tracked_followers(&self) -> u64 {
        self.followers_gained.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), MalformedReason> {
        if self.external_id.trim().is_empty() {
            return Err(MalformedReason::MissingExternalId);
        }
        if !self.spend.is_finite() {
            return Err(MalformedReason::NonFiniteSpend);
        }
        if self.spend < 0.0 {
            return Err(MalformedReason::NegativeSpend { spend: self.spend });
        }
        if self.date_range.start > self.date_range.end {
            return Err(MalformedReason::InvertedDateRange {
                from: self.date_range.start,
                to: self.date_range.end,
            });
        }
        Ok(())
    }
}

/// Serde adapter keeping `-1` as the wire marker for "not tracked".
pub mod followers_sentinel {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const NOT_TRACKED: i64 = -1;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_u64(*n),
            None => serializer.serialize_i64(NOT_TRACKED),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            NOT_TRACKED => Ok(None),
            n if n >= 0 => Ok(Some(n as u64)),
            n => Err(D::Error::custom(format!(
                "followers_gained must be >= 0 or -1, got {}",
                n
            ))),
        }
    }
}

// ─── Reports ────────────────────────────────────────────────────────────────

/// Unique key of a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportKey {
    /// Always normalized; see [`normalize_unit`].
    #[serde(deserialize_with = "deserialize_unit")]
    pub business_unit: String,
    pub platform: String,
    pub period: YearMonth,
}

impl ReportKey {
    pub fn new(
        business_unit: impl AsRef<str>,
        platform: impl Into<String>,
        period: YearMonth,
    ) -> Self {
        Self {
            business_unit: normalize_unit(business_unit.as_ref()),
            platform: platform.into(),
            period,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.business_unit, self.platform, self.period)
    }
}

/// The reconciliation unit: every campaign of one unit on one platform in
/// one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub key: ReportKey,
    #[serde(default)]
    pub campaigns: Vec<CampaignRecord>,
    /// Zero until first stored; bumped by every successful upsert.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn empty(key: ReportKey) -> Self {
        Self {
            key,
            campaigns: Vec::new(),
            version: 0,
            updated_at: None,
        }
    }

    pub fn find_campaign(&self, external_id: &str) -> Option<&CampaignRecord> {
        self.campaigns.iter().find(|c| c.external_id == external_id)
    }

    pub fn find_campaign_mut(&mut self, external_id: &str) -> Option<&mut CampaignRecord> {
        self.campaigns.iter_mut().find(|c| c.external_id == external_id)
    }

    /// Insert or replace by `external_id`. Returns `true` when inserted.
    pub fn upsert_campaign(&mut self, record: CampaignRecord) -> bool {
        match self.find_campaign_mut(&record.external_id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                self.campaigns.push(record);
                true
            }
        }
    }

    pub fn total_spend(&self) -> f64 {
        self.campaigns.iter().map(|c| c.spend).sum()
    }

    pub fn is_stored(&self) -> bool {
        self.version > 0
    }
}

/// Scope of a report listing. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub months: Option<MonthRange>,
}

impl ReportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = Some(business_unit.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_months(mut self, months: MonthRange) -> Self {
        self.months = Some(months);
        self
    }

    pub fn matches(&self, key: &ReportKey) -> bool {
        self.business_unit
            .as_deref()
            .map_or(true, |u| u.eq_ignore_ascii_case(&key.business_unit))
            && self
                .platform
                .as_deref()
                .map_or(true, |p| p.eq_ignore_ascii_case(&key.platform))
            && self.months.map_or(true, |m| m.contains(key.period))
    }
}

// ─── Sync ───────────────────────────────────────────────────────────────────

/// Transient campaign-performance row pulled from the ad platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_tag: String,
    pub spend: f64,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub reach: u64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl Insight {
    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.date_from,
            end: self.date_to,
        }
    }
}

/// What a sync targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(deserialize_with = "deserialize_unit")]
    pub business_unit: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    pub date_range: DateRange,
}

fn default_platform() -> String {
    EXTERNAL_PLATFORM.to_string()
}

impl SyncRequest {
    pub fn new(business_unit: impl AsRef<str>, date_range: DateRange) -> Self {
        Self {
            business_unit: normalize_unit(business_unit.as_ref()),
            platform: default_platform(),
            date_range,
        }
    }

    pub fn on_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Derived from the range start only.
    pub fn report_key(&self) -> ReportKey {
        ReportKey::new(
            &self.business_unit,
            self.platform.clone(),
            self.date_range.period(),
        )
    }
}

/// An insight skipped during a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedRecord {
    /// Index in the pulled sequence.
    pub position: usize,
    pub external_id: Option<String>,
    pub reason: MalformedReason,
}

/// Outcome of one reconciler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    #[serde(default)]
    pub malformed: Vec<MalformedRecord>,
}

impl SyncResult {
    pub fn has_errors(&self) -> bool {
        !self.malformed.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.updated.len() + self.unchanged.len()
    }
}

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    PartialSuccess,
    Failed,
}

impl SyncStatus {
    pub fn of(result: &SyncResult) -> Self {
        if !result.has_errors() {
            SyncStatus::Completed
        } else if result.processed() > 0 {
            SyncStatus::PartialSuccess
        } else {
            SyncStatus::Failed
        }
    }
}
