use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.servicem8.com/api_1.0";
pub const DEFAULT_JOB_STATUS: &str = "Quote";
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 3600;

/// Job statuses the remote API accepts on create.
pub const JOB_STATUSES: [&str; 5] = [
    "Quote",
    "Work Order",
    "Scheduled",
    "In Progress",
    "Completed",
];

/// Badge cache lifetimes offered by the settings screen (1h, 6h, 24h, 1w).
pub const CACHE_DURATIONS_SECS: [u64; 4] = [3600, 21_600, 86_400, 604_800];

pub const DEFAULT_BADGE_MAPPINGS: &str =
    "facebook|Facebook Lead\ngoogle|Google Ads\nwebsite|Website Enquiry";
pub const DEFAULT_SUCCESS_MESSAGE: &str =
    "Thank you! Your request has been submitted successfully.";
pub const DEFAULT_ERROR_MESSAGE: &str = "We apologize, but there was an error submitting your request. Please try again or contact us directly.";

/// Process-level configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub base_url: String,
    pub settings: GlobalSettings,
    pub pipelines_path: Option<PathBuf>,
    pub uploads_dir: PathBuf,
    pub admin_token: Option<String>,
}

/// Global (site-wide) settings. Individual pipelines may override the
/// credential and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_job_status")]
    pub default_job_status: String,
    #[serde(default = "default_true")]
    pub cache_badges: bool,
    #[serde(default = "default_cache_duration")]
    pub cache_duration_secs: u64,
    #[serde(default)]
    pub debug: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_job_status: default_job_status(),
            cache_badges: default_true(),
            cache_duration_secs: default_cache_duration(),
            debug: false,
        }
    }
}

/// Per-pipeline (per-form) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `None` behaves as `Some(true)`.
    pub use_global: Option<bool>,
    pub credential_override: String,
    pub default_status_override: String,
    /// Rule key (e.g. `contact_first_name`) -> submission field key.
    pub field_mapping_rules: BTreeMap<String, String>,
    pub custom_mapping_text: String,
    pub lead_source_field: String,
    pub badge_mapping_text: String,
    pub attachment_field: String,
    pub success_message: String,
    pub error_message: String,
    pub check_duplicates: bool,
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_global: Some(true),
            credential_override: String::new(),
            default_status_override: DEFAULT_JOB_STATUS.to_string(),
            field_mapping_rules: BTreeMap::new(),
            custom_mapping_text: String::new(),
            lead_source_field: String::new(),
            badge_mapping_text: DEFAULT_BADGE_MAPPINGS.to_string(),
            attachment_field: String::new(),
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            check_duplicates: false,
            debug: false,
        }
    }
}

/// Credential and status in effect for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub credential: String,
    pub default_status: String,
}

fn default_job_status() -> String {
    DEFAULT_JOB_STATUS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_duration() -> u64 {
    DEFAULT_CACHE_DURATION_SECS
}

/// Resolves the credential and default job status for a pipeline.
///
/// The global values win when the pipeline's `use_global` flag is set or
/// absent; otherwise the pipeline's override values are used. Empty statuses
/// fall back to `Quote`.
pub fn resolve_settings(
    pipeline: &PipelineConfig,
    global: &GlobalSettings,
) -> Result<ResolvedSettings, AppError> {
    let (credential, status, source) = if pipeline.use_global.unwrap_or(true) {
        (
            global.api_key.trim(),
            global.default_job_status.trim(),
            "global",
        )
    } else {
        (
            pipeline.credential_override.trim(),
            pipeline.default_status_override.trim(),
            "pipeline override",
        )
    };

    if credential.is_empty() {
        return Err(AppError::Configuration(format!(
            "API key not configured ({})",
            source
        )));
    }

    let default_status = if status.is_empty() {
        DEFAULT_JOB_STATUS
    } else {
        status
    };

    Ok(ResolvedSettings {
        credential: credential.to_string(),
        default_status: default_status.to_string(),
    })
}

/// Validates the shape of an API key as the settings screen does.
pub fn validate_api_key(key: &str) -> Result<(), String> {
    if key.len() < 10 {
        return Err("API key appears to be too short".to_string());
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("API key contains invalid characters".to_string());
    }
    Ok(())
}

pub fn validate_job_status(status: &str) -> Result<(), String> {
    if JOB_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(format!(
            "Unknown job status '{}' (expected one of: {})",
            status,
            JOB_STATUSES.join(", ")
        ))
    }
}

/// Masks a credential for logs: first 4 and last 4 characters kept.
pub fn mask_credential(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Loads the form id -> pipeline config map from a JSON file.
pub fn load_pipelines(path: &std::path::Path) -> anyhow::Result<HashMap<String, PipelineConfig>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let pipelines: HashMap<String, PipelineConfig> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid pipeline config {}: {}", path.display(), e))?;
    Ok(pipelines)
}

fn env_bool(name: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean (true/false)", name),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            base_url: std::env::var("SM8_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map_or_else(|| Ok(DEFAULT_BASE_URL.to_string()), Ok)
                .and_then(|url: String| -> anyhow::Result<String> {
                    let parsed = url::Url::parse(&url)
                        .map_err(|e| anyhow::anyhow!("SM8_BASE_URL is not a valid URL: {}", e))?;
                    if parsed.scheme() != "http" && parsed.scheme() != "https" {
                        anyhow::bail!("SM8_BASE_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })?,
            settings: GlobalSettings {
                api_key: std::env::var("SM8_API_KEY")
                    .map(|key| key.trim().to_string())
                    .map_or_else(|_| Ok(String::new()), Ok)
                    .and_then(|key: String| -> anyhow::Result<String> {
                        if !key.is_empty() {
                            validate_api_key(&key)
                                .map_err(|e| anyhow::anyhow!("SM8_API_KEY: {}", e))?;
                        }
                        Ok(key)
                    })?,
                default_job_status: std::env::var("SM8_DEFAULT_JOB_STATUS")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map_or_else(|| Ok(default_job_status()), Ok)
                    .and_then(|status: String| -> anyhow::Result<String> {
                        validate_job_status(&status)
                            .map_err(|e| anyhow::anyhow!("SM8_DEFAULT_JOB_STATUS: {}", e))?;
                        Ok(status)
                    })?,
                cache_badges: env_bool("SM8_CACHE_BADGES", true)?,
                cache_duration_secs: std::env::var("SM8_CACHE_DURATION")
                    .unwrap_or_else(|_| DEFAULT_CACHE_DURATION_SECS.to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("SM8_CACHE_DURATION must be a number of seconds"))
                    .and_then(|secs: u64| {
                        if !CACHE_DURATIONS_SECS.contains(&secs) {
                            anyhow::bail!(
                                "SM8_CACHE_DURATION must be one of {:?}",
                                CACHE_DURATIONS_SECS
                            );
                        }
                        Ok(secs)
                    })?,
                debug: env_bool("SM8_DEBUG", false)?,
            },
            pipelines_path: std::env::var("PIPELINES_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            admin_token: std::env::var("ADMIN_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("ServiceM8 Base URL: {}", config.base_url);
        if config.settings.api_key.is_empty() {
            tracing::warn!("SM8_API_KEY not set; submissions using global settings will fail");
        } else {
            tracing::debug!("API key: {}", mask_credential(&config.settings.api_key));
        }
        if config.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set; settings endpoint is disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
