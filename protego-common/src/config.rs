//! Configuration loading and resolution
//!
//! Priority order for the configuration file path:
//! 1. Command-line argument (highest priority)
//! 2. `PROTEGO_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/protego/protego.toml` on Linux)
//! 4. Built-in defaults (no file)
//!
//! A missing file is not fatal: a warning is logged and built-in defaults are
//! used. After loading, `PROTEGO_DATABASE_PATH` and `PROTEGO_LOG_LEVEL`
//! override the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::AnalysisType;
use crate::schedule::Schedule;
use crate::{Error, Result};

pub const CONFIG_ENV_VAR: &str = "PROTEGO_CONFIG";
pub const DATABASE_PATH_ENV_VAR: &str = "PROTEGO_DATABASE_PATH";
pub const LOG_LEVEL_ENV_VAR: &str = "PROTEGO_LOG_LEVEL";

/// Default ingestion schedule: daily at 02:00 UTC
pub const DEFAULT_SCRAPER_CRON: &str = "0 2 * * *";

/// Default analysis poll interval (five minutes)
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 300;

/// Top-level configuration shared by both services
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtegoConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    pub scraper: ScraperConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    pub max_connections: u32,
    /// Upper bound on any single store call
    pub query_timeout_secs: u64,
    /// How long writes keep retrying while the database is locked
    pub lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
            query_timeout_secs: 30,
            lock_wait_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout for each request to an external source
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("protego-scraper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Either a cron expression or a fixed interval
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub cron: Option<String>,
    pub interval_secs: Option<u64>,
}

impl ScheduleConfig {
    pub fn cron(expression: &str) -> Self {
        Self {
            cron: Some(expression.to_string()),
            interval_secs: None,
        }
    }

    pub fn every(secs: u64) -> Self {
        Self {
            cron: None,
            interval_secs: Some(secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub enabled: bool,
    pub run_on_start: bool,
    pub schedule: ScheduleConfig,
    pub dailymed: SourceEndpointConfig,
    pub clinical_trials: SourceEndpointConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_on_start: true,
            schedule: ScheduleConfig::cron(DEFAULT_SCRAPER_CRON),
            dailymed: SourceEndpointConfig::default(),
            clinical_trials: SourceEndpointConfig::default(),
        }
    }
}

/// Per-adapter endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEndpointConfig {
    pub enabled: bool,
    /// Overrides the adapter's public endpoint (used for mirrors and tests)
    pub base_url: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for SourceEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            page_size: 100,
            max_pages: 1,
        }
    }
}

impl SourceEndpointConfig {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url.as_deref().unwrap_or(default).trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub enabled: bool,
    pub run_on_start: bool,
    pub schedule: ScheduleConfig,
    pub batch_size: usize,
    /// Records analyzed at once within a batch
    pub concurrency: usize,
    pub strategies: Vec<AnalysisType>,
    pub keyword_frequency: KeywordFrequencyConfig,
    pub condition_grouping: ConditionGroupingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_on_start: true,
            schedule: ScheduleConfig::every(DEFAULT_ANALYSIS_INTERVAL_SECS),
            batch_size: 100,
            concurrency: 4,
            strategies: vec![AnalysisType::KeywordFrequency, AnalysisType::ConditionGrouping],
            keyword_frequency: KeywordFrequencyConfig::default(),
            condition_grouping: ConditionGroupingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordFrequencyConfig {
    /// Keywords seen fewer times than this are not emitted
    pub min_frequency: i64,
    pub min_keyword_length: usize,
    /// Most frequent keywords kept per record
    pub max_keywords: usize,
}

impl Default for KeywordFrequencyConfig {
    fn default() -> Self {
        Self {
            min_frequency: 1,
            min_keyword_length: 3,
            max_keywords: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionGroupingConfig {
    /// Condition name -> terms that indicate it
    pub vocabulary: BTreeMap<String, Vec<String>>,
}

impl Default for ConditionGroupingConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_condition_vocabulary(),
        }
    }
}

fn default_condition_vocabulary() -> BTreeMap<String, Vec<String>> {
    let entries: [(&str, &[&str]); 10] = [
        ("Diabetes", &["diabetes", "diabetic", "hyperglycemia", "insulin resistance"]),
        ("Hypertension", &["hypertension", "high blood pressure", "hypertensive"]),
        ("Cancer", &["cancer", "carcinoma", "tumor", "tumour", "neoplasm", "lymphoma", "leukemia"]),
        ("Asthma", &["asthma", "bronchospasm"]),
        ("Depression", &["depression", "depressive disorder", "major depressive"]),
        ("Heart Disease", &["heart failure", "coronary artery disease", "myocardial infarction", "cardiomyopathy"]),
        ("Infection", &["infection", "bacterial", "viral", "sepsis"]),
        ("Pain", &["pain", "analgesic", "migraine"]),
        ("Fever", &["fever", "pyrexia"]),
        ("Respiratory Symptoms", &["cough", "dyspnea", "shortness of breath"]),
    ];

    entries
        .into_iter()
        .map(|(name, terms)| {
            (
                name.to_string(),
                terms.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

/// Get OS-dependent default database path
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("protego").join("protego.db"))
        .unwrap_or_else(|| PathBuf::from("./protego_data/protego.db"))
}

/// Resolves which configuration file to load
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Returns the configuration file path to use, if any
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        dirs::config_dir().map(|d| d.join("protego").join("protego.toml"))
    }
}

/// Where the loaded configuration came from
///
/// Loading happens before logging is set up, so the outcome is returned
/// and reported once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The resolved file does not exist; built-in defaults were used
    Missing(PathBuf),
    /// No file location could be resolved
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!(path = %path.display(), "Loaded configuration file"),
            ConfigSource::Missing(path) => warn!(
                path = %path.display(),
                "Configuration file not found, using built-in defaults"
            ),
            ConfigSource::Defaults => {
                warn!("No configuration file location available, using built-in defaults")
            }
        }
    }
}

impl ProtegoConfig {
    /// Load configuration from `path`, falling back to defaults when absent
    ///
    /// A file that exists but does not parse is an error: silently running
    /// with defaults would point the services at the wrong database.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config, source) = Self::load_with_source(path)?;
        source.log();
        Ok(config)
    }

    /// Same as [`ProtegoConfig::load`], returning the outcome instead of logging it
    pub fn load_with_source(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                let config: ProtegoConfig = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?;
                (config, ConfigSource::File(path.to_path_buf()))
            }
            Some(path) => (ProtegoConfig::default(), ConfigSource::Missing(path.to_path_buf())),
            None => (ProtegoConfig::default(), ConfigSource::Defaults),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok((config, source))
    }

    /// Resolve the file location and load it
    pub fn resolve_and_load(cli_path: Option<PathBuf>) -> Result<(Self, ConfigSource)> {
        let path = ConfigResolver::new(cli_path).resolve();
        Self::load_with_source(path.as_deref())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV_VAR) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(Error::Config("database.max_connections must be > 0".to_string()));
        }
        if self.database.query_timeout_secs == 0 {
            return Err(Error::Config("database.query_timeout_secs must be > 0".to_string()));
        }
        if self.network.timeout_secs == 0 {
            return Err(Error::Config("network.timeout_secs must be > 0".to_string()));
        }
        if self.analysis.batch_size == 0 {
            return Err(Error::Config("analysis.batch_size must be > 0".to_string()));
        }
        if self.analysis.concurrency == 0 {
            return Err(Error::Config("analysis.concurrency must be > 0".to_string()));
        }
        if self.analysis.strategies.is_empty() {
            return Err(Error::Config("analysis.strategies must not be empty".to_string()));
        }
        for (name, endpoint) in [
            ("dailymed", &self.scraper.dailymed),
            ("clinical_trials", &self.scraper.clinical_trials),
        ] {
            if endpoint.page_size == 0 || endpoint.max_pages == 0 {
                return Err(Error::Config(format!(
                    "scraper.{}: page_size and max_pages must be > 0",
                    name
                )));
            }
        }
        if self.analysis.keyword_frequency.min_frequency < 1 {
            return Err(Error::Config(
                "analysis.keyword_frequency.min_frequency must be >= 1".to_string(),
            ));
        }

        Schedule::from_config(&self.scraper.schedule)
            .map_err(|e| Error::Config(format!("scraper.schedule: {}", e)))?;
        Schedule::from_config(&self.analysis.schedule)
            .map_err(|e| Error::Config(format!("analysis.schedule: {}", e)))?;

        Ok(())
    }
}
