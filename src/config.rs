use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OutreachError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Gemini endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_enabled")]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_ai_enabled(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Backoff policy for quota errors.
///
/// The delay after failed attempt `n` is `min(max_backoff, multiplier^n)`
/// time units of `unit_ms` milliseconds each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: f64,
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            multiplier: default_multiplier(),
            max_backoff: default_max_backoff(),
            unit_ms: default_unit_ms(),
        }
    }
}

impl RetryConfig {
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Pause before each record's API calls
    #[serde(default = "default_api_delay_ms")]
    pub api_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            api_delay_ms: default_api_delay_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn api_delay(&self) -> Duration {
        Duration::from_millis(self.api_delay_ms)
    }
}

/// Manual company lists and keyword tables.
///
/// Loaded once at startup and shared read-only for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_competitors")]
    pub competitors: Vec<String>,
    #[serde(default = "default_partners")]
    pub partners: Vec<String>,
    #[serde(default = "default_builder_keywords")]
    pub builder_keywords: Vec<String>,
    #[serde(default = "default_owner_keywords")]
    pub owner_keywords: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            competitors: default_competitors(),
            partners: default_partners(),
            builder_keywords: default_builder_keywords(),
            owner_keywords: default_owner_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_length")]
    pub min_name_length: usize,
    #[serde(default = "default_min_length")]
    pub min_title_length: usize,
    #[serde(default = "default_min_length")]
    pub min_company_length: usize,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
    #[serde(default = "default_max_company_length")]
    pub max_company_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_name_length: default_min_length(),
            min_title_length: default_min_length(),
            min_company_length: default_min_length(),
            max_name_length: default_max_name_length(),
            max_title_length: default_max_title_length(),
            max_company_length: default_max_company_length(),
        }
    }
}

/// Limits applied to AI-generated email text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_subject_max_length")]
    pub subject_max_length: usize,
    #[serde(default = "default_body_max_length")]
    pub body_max_length: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            subject_max_length: default_subject_max_length(),
            body_max_length: default_body_max_length(),
        }
    }
}

/// What the emails are inviting people to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_booth")]
    pub booth: String,
    #[serde(default = "default_incentive")]
    pub incentive: String,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            product: default_product(),
            booth: default_booth(),
            incentive: default_incentive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_fallback_html")]
    pub fallback_html: Option<PathBuf>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            fallback_html: default_fallback_html(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
        }
    }
}

fn default_ai_enabled() -> bool {
    true
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> f64 {
    60.0
}

fn default_unit_ms() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    1
}

fn default_api_delay_ms() -> u64 {
    100
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_competitors() -> Vec<String> {
    to_strings(&[
        "Propeller",
        "DJI",
        "Skydio",
        "Pix4D",
        "Agisoft",
        "RealityCapture",
        "Bentley",
        "Autodesk Civil 3D",
        "Topcon",
        "Leica",
        "Trimble",
        "Hexagon",
        "Faro",
        "3DR",
        "Parrot",
        "Yuneec",
        "Autel",
    ])
}

fn default_partners() -> Vec<String> {
    to_strings(&[
        "Autodesk",
        "Procore",
        "Trimble",
        "Bentley",
        "Oracle",
        "SAP",
        "Microsoft",
        "Google",
        "Amazon",
        "IBM",
        "Salesforce",
        "ServiceNow",
    ])
}

fn default_builder_keywords() -> Vec<String> {
    to_strings(&[
        "contractor",
        "construction",
        "builder",
        "developer",
        "engineering",
        "architect",
        "design",
        "project manager",
        "superintendent",
        "foreman",
        "general contractor",
        "subcontractor",
        "specialty contractor",
    ])
}

fn default_owner_keywords() -> Vec<String> {
    to_strings(&[
        "owner",
        "client",
        "investor",
        "developer",
        "property manager",
        "facility manager",
        "asset manager",
        "real estate",
        "investment",
    ])
}

fn default_min_length() -> usize {
    2
}

fn default_max_name_length() -> usize {
    100
}

fn default_max_title_length() -> usize {
    200
}

fn default_max_company_length() -> usize {
    100
}

fn default_subject_max_length() -> usize {
    100
}

fn default_body_max_length() -> usize {
    1000
}

fn default_product() -> String {
    "DroneDeploy".to_string()
}

fn default_booth() -> String {
    "#42".to_string()
}

fn default_incentive() -> String {
    "a free gift".to_string()
}

fn default_url() -> String {
    "https://www.digitalconstructionweek.com/all-speakers/".to_string()
}

fn default_fallback_html() -> Option<PathBuf> {
    Some(PathBuf::from("in/speakers.html"))
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("out/email_list.csv")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OutreachError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            OutreachError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    OutreachError::ConfigError(format!(
                        "Failed to create config directory: {}",
                        e
                    ))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            OutreachError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            OutreachError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(OutreachError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(OutreachError::ConfigError(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(self.retry.max_backoff >= 0.0) {
            return Err(OutreachError::ConfigError(
                "retry.max_backoff cannot be negative".to_string(),
            ));
        }

        if self.rate_limit.max_concurrent == 0 {
            return Err(OutreachError::ConfigError(
                "rate_limit.max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.classification.builder_keywords.is_empty()
            && self.classification.owner_keywords.is_empty()
        {
            return Err(OutreachError::ConfigError(
                "classification keyword tables cannot both be empty".to_string(),
            ));
        }
        let lists = [
            ("competitors", &self.classification.competitors),
            ("partners", &self.classification.partners),
            ("builder_keywords", &self.classification.builder_keywords),
            ("owner_keywords", &self.classification.owner_keywords),
        ];
        for (name, entries) in lists {
            if entries.iter().any(|e| e.trim().is_empty()) {
                return Err(OutreachError::ConfigError(format!(
                    "classification.{} cannot contain empty strings",
                    name
                )));
            }
        }

        let v = &self.validation;
        let bounds = [
            ("name", v.min_name_length, v.max_name_length),
            ("title", v.min_title_length, v.max_title_length),
            ("company", v.min_company_length, v.max_company_length),
        ];
        for (field, min, max) in bounds {
            if min == 0 {
                return Err(OutreachError::ConfigError(format!(
                    "validation.min_{}_length must be at least 1",
                    field
                )));
            }
            if min > max {
                return Err(OutreachError::ConfigError(format!(
                    "validation.min_{}_length cannot exceed max_{}_length",
                    field, field
                )));
            }
        }

        if self.email.subject_max_length == 0 || self.email.body_max_length == 0 {
            return Err(OutreachError::ConfigError(
                "email length limits must be greater than 0".to_string(),
            ));
        }

        if self.ai.enabled && self.ai.model.trim().is_empty() {
            return Err(OutreachError::ConfigError(
                "ai.model cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
