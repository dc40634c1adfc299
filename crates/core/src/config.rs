use serde::Deserialize;

/// Root application configuration. Loaded from an optional `adspend.toml`
/// and environment variables with the prefix `ADSPEND__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

// ─── Sync Config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Platform targeted when a caller does not name one.
    #[serde(default = "default_platform")]
    pub default_platform: String,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Re-reads after a compare-and-swap rejection before giving up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    #[serde(default = "default_high_spend_threshold")]
    pub high_spend_threshold: f64,
    #[serde(default = "default_max_range_days")]
    pub max_range_days: i64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_supported_units")]
    pub supported_units: Vec<String>,
}

fn default_platform() -> String {
    crate::types::EXTERNAL_PLATFORM.to_string()
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_max_conflict_retries() -> u32 {
    5
}
fn default_high_spend_threshold() -> f64 {
    50_000.0
}
fn default_max_range_days() -> i64 {
    31
}
fn default_history_capacity() -> usize {
    50
}
fn default_supported_units() -> Vec<String> {
    ["montella", "alenka", "kids"]
        .iter()
        .map(|u| u.to_string())
        .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_platform: default_platform(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
            high_spend_threshold: default_high_spend_threshold(),
            max_range_days: default_max_range_days(),
            history_capacity: default_history_capacity(),
            supported_units: default_supported_units(),
        }
    }
}

// ─── Reporting Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
    #[serde(default = "default_trend_months")]
    pub trend_months: u32,
}

fn default_top_n() -> usize { 10 }
fn default_trend_months() -> u32 { 12 }

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            default_top_n: default_top_n(),
            trend_months: default_trend_months(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional `adspend` config file and
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("adspend")
    }

    /// Like [`AppConfig::load`] with an explicit file stem or path.
    pub fn load_from(file: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("ADSPEND")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sync.supported_units"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
