use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUBSCRIPTION_ID_VAR: &str = "AZURE_SUBSCRIPTION_ID";
pub const SLACK_WEBHOOK_VAR: &str = "SLACK_WEBHOOK";
pub const SLACK_CHANNEL_VAR: &str = "SLACK_CHANNEL_NAME";
pub const MANAGEMENT_ENDPOINT_VAR: &str = "AZURE_MANAGEMENT_ENDPOINT";

pub const REQUIRED_ENV_VARS: [&str; 3] = [SUBSCRIPTION_ID_VAR, SLACK_WEBHOOK_VAR, SLACK_CHANNEL_VAR];

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

const RUN_AT_FORMAT: &str = "%H:%M";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("{name}: endpoint must use HTTPS, got: {url}")]
    InsecureEndpoint { name: &'static str, url: String },
}

/// What to do when the cost query fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailurePolicy {
    /// Post an alert instead of the report, then fail.
    #[default]
    Alert,
    /// Fail without posting anything.
    Abort,
    /// Report whatever rows arrived before the failure.
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_top_groups")]
    pub top_groups: usize,
    #[serde(default = "default_start_days_ago")]
    pub start_days_ago: u32,
    #[serde(default = "default_end_days_ago")]
    pub end_days_ago: u32,
}

fn default_title() -> String {
    "Azure Daily Cost Report".to_string()
}
fn default_currency_symbol() -> String {
    "€".to_string()
}
fn default_top_groups() -> usize {
    5
}
fn default_start_days_ago() -> u32 {
    4
}
fn default_end_days_ago() -> u32 {
    2
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            currency_symbol: default_currency_symbol(),
            top_groups: default_top_groups(),
            start_days_ago: default_start_days_ago(),
            end_days_ago: default_end_days_ago(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,
}

fn default_username() -> String {
    "Cost Report Bot".to_string()
}
fn default_icon_emoji() -> String {
    ":money_with_wings:".to_string()
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            username: default_username(),
            icon_emoji: default_icon_emoji(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// UTC time of day, "HH:MM".
    #[serde(default = "default_run_at")]
    pub run_at: String,
}

fn default_run_at() -> String {
    "07:00".to_string()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            run_at: default_run_at(),
        }
    }
}

impl ScheduleSettings {
    pub fn run_at_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, RUN_AT_FORMAT).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub on_fetch_error: FetchFailurePolicy,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub slack: SlackSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            on_fetch_error: FetchFailurePolicy::default(),
            http_timeout_secs: default_http_timeout_secs(),
            report: ReportSettings::default(),
            slack: SlackSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("cost-report").join("config.toml")
    }

    /// Load settings from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Serialize and write these settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.report.title.trim().is_empty() {
            issues.push("report.title must not be empty".to_string());
        }
        if self.report.top_groups == 0 {
            issues.push("report.top_groups must be at least 1".to_string());
        }
        if self.report.start_days_ago < self.report.end_days_ago {
            issues.push(format!(
                "report.start_days_ago ({}) must not be less than report.end_days_ago ({})",
                self.report.start_days_ago, self.report.end_days_ago
            ));
        }
        if self.http_timeout_secs == 0 {
            issues.push("http_timeout_secs must be greater than 0".to_string());
        }
        if self.schedule.run_at_time().is_none() {
            issues.push(format!(
                "Invalid schedule.run_at: '{}' (must be HH:MM)",
                self.schedule.run_at
            ));
        }
        issues
    }
}

/// Values the report cannot run without, read from the process environment.
#[derive(Clone)]
pub struct ReportEnv {
    pub subscription_id: String,
    pub slack_webhook: String,
    pub slack_channel: String,
    pub management_endpoint: String,
}

impl fmt::Debug for ReportEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportEnv")
            .field("subscription_id", &self.subscription_id)
            .field("slack_webhook", &"<redacted>")
            .field("slack_channel", &self.slack_channel)
            .field("management_endpoint", &self.management_endpoint)
            .finish()
    }
}

impl ReportEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let subscription_id = required(&lookup, SUBSCRIPTION_ID_VAR)?;
        let slack_webhook = required(&lookup, SLACK_WEBHOOK_VAR)?;
        let slack_channel = required(&lookup, SLACK_CHANNEL_VAR)?;
        let management_endpoint = non_empty(&lookup, MANAGEMENT_ENDPOINT_VAR)
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        validate_endpoint(&slack_webhook, SLACK_WEBHOOK_VAR)?;
        validate_endpoint(&management_endpoint, MANAGEMENT_ENDPOINT_VAR)?;

        Ok(Self {
            subscription_id,
            slack_webhook,
            slack_channel,
            management_endpoint,
        })
    }

    /// Required variables that are unset or empty.
    pub fn missing_vars<F>(lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        REQUIRED_ENV_VARS
            .iter()
            .copied()
            .filter(|name| non_empty(&lookup, name).is_none())
            .collect()
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).ok_or(ConfigError::MissingEnv(name))
}

/// Reject anything but HTTPS before credentials or webhook secrets go over the wire.
pub fn validate_endpoint(url: &str, name: &'static str) -> Result<(), ConfigError> {
    if !url.starts_with("https://") {
        return Err(ConfigError::InsecureEndpoint {
            name,
            url: url.to_string(),
        });
    }
    Ok(())
}
