//! Application configuration for CourseMind.
//!
//! User config lives at `~/.coursemind/coursemind.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file, only the name of the env var
//! holding them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CourseMindError, Result};
use crate::types::{ContentMode, Plan};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursemind.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursemind";

// ---------------------------------------------------------------------------
// Config structs (matching coursemind.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Content generation limits.
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub gemini: GeminiSection,

    #[serde(default)]
    pub youtube: YouTubeSection,

    #[serde(default)]
    pub unsplash: UnsplashSection,

    /// Billing price identifiers.
    #[serde(default)]
    pub billing: BillingConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Language used when a course does not name one.
    #[serde(default = "default_language")]
    pub language: String,

    /// Content mode used when a course does not name one.
    #[serde(default = "default_content_mode")]
    pub content_mode: ContentMode,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            language: default_language(),
            content_mode: default_content_mode(),
        }
    }
}

fn default_database_path() -> String {
    "var/coursemind.db".into()
}
fn default_language() -> String {
    "English".into()
}
fn default_content_mode() -> ContentMode {
    ContentMode::TextImage
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum topics generated at the same time during a course run.
    #[serde(default = "default_max_concurrent_topics")]
    pub max_concurrent_topics: u32,

    /// Deadline for every single external call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_topics: default_max_concurrent_topics(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_max_concurrent_topics() -> u32 {
    4
}
fn default_request_timeout() -> u64 {
    60
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiSection {
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

/// `[youtube]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeSection {
    #[serde(default = "default_youtube_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_youtube_base_url")]
    pub base_url: String,
}

impl Default for YouTubeSection {
    fn default() -> Self {
        Self {
            api_key_env: default_youtube_key_env(),
            base_url: default_youtube_base_url(),
        }
    }
}

fn default_youtube_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_youtube_base_url() -> String {
    "https://www.googleapis.com".into()
}

/// `[unsplash]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsplashSection {
    #[serde(default = "default_unsplash_key_env")]
    pub access_key_env: String,

    #[serde(default = "default_unsplash_base_url")]
    pub base_url: String,

    /// Image served when search is unconfigured, fails, or finds nothing.
    #[serde(default = "default_placeholder_url")]
    pub placeholder_url: String,
}

impl Default for UnsplashSection {
    fn default() -> Self {
        Self {
            access_key_env: default_unsplash_key_env(),
            base_url: default_unsplash_base_url(),
            placeholder_url: default_placeholder_url(),
        }
    }
}

fn default_unsplash_key_env() -> String {
    "UNSPLASH_ACCESS_KEY".into()
}
fn default_unsplash_base_url() -> String {
    "https://api.unsplash.com".into()
}
fn default_placeholder_url() -> String {
    "https://placehold.co/800x450?text=CourseMind".into()
}

/// `[billing]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub monthly_price_id: Option<String>,

    #[serde(default)]
    pub yearly_price_id: Option<String>,
}

impl BillingConfig {
    /// Map a billing price identifier to the plan it sells.
    pub fn plan_for_price_id(&self, price_id: &str) -> Option<Plan> {
        if self.monthly_price_id.as_deref() == Some(price_id) {
            Some(Plan::Monthly)
        } else if self.yearly_price_id.as_deref() == Some(price_id) {
            Some(Plan::Yearly)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime collaborator configs (resolved from AppConfig + environment)
// ---------------------------------------------------------------------------

/// Settings handed to the Gemini text generator.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Resolve from the config file; fails when the API key env var is unset.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            api_key: require_env(&config.gemini.api_key_env, "Gemini")?,
            model: config.gemini.model.clone(),
            base_url: parse_base_url(&config.gemini.base_url)?,
            timeout: config.generation.request_timeout(),
        })
    }
}

/// Settings handed to the YouTube video search.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_key: String,
    pub base_url: Url,
    pub timeout: Duration,
}

impl YouTubeConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            api_key: require_env(&config.youtube.api_key_env, "YouTube")?,
            base_url: parse_base_url(&config.youtube.base_url)?,
            timeout: config.generation.request_timeout(),
        })
    }
}

/// Settings handed to the Unsplash image search.
///
/// `access_key` is optional: without one the search serves the placeholder.
#[derive(Debug, Clone)]
pub struct UnsplashConfig {
    pub access_key: Option<String>,
    pub base_url: Url,
    pub placeholder_url: String,
    pub timeout: Duration,
}

impl UnsplashConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            access_key: optional_env(&config.unsplash.access_key_env),
            base_url: parse_base_url(&config.unsplash.base_url)?,
            placeholder_url: config.unsplash.placeholder_url.clone(),
            timeout: config.generation.request_timeout(),
        })
    }
}

impl GenerationConfig {
    /// Per-call deadline; never shorter than one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn require_env(var_name: &str, service: &str) -> Result<String> {
    optional_env(var_name).ok_or_else(|| {
        CourseMindError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))
    })
}

fn optional_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| CourseMindError::config(format!("invalid base URL '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursemind/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourseMindError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursemind/coursemind.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CourseMindError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CourseMindError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourseMindError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourseMindError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourseMindError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("TEXT_IMAGE"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let toml_str = r#"
[generation]
max_concurrent_topics = 8

[billing]
monthly_price_id = "price_monthly"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.max_concurrent_topics, 8);
        assert_eq!(config.generation.request_timeout_secs, 60);
        assert_eq!(config.youtube.api_key_env, "YOUTUBE_API_KEY");
        assert_eq!(config.defaults.content_mode, ContentMode::TextImage);
    }

    #[test]
    fn zero_request_timeout_is_raised_to_one_second() {
        let config: AppConfig = toml::from_str("[generation]\nrequest_timeout_secs = 0\n").expect("parse");
        assert_eq!(config.generation.request_timeout(), Duration::from_secs(1));

        let config: AppConfig = toml::from_str("[generation]\nrequest_timeout_secs = 15\n").expect("parse");
        assert_eq!(config.generation.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn price_ids_map_to_plans() {
        let billing = BillingConfig {
            monthly_price_id: Some("price_m".into()),
            yearly_price_id: Some("price_y".into()),
        };
        assert_eq!(billing.plan_for_price_id("price_m"), Some(Plan::Monthly));
        assert_eq!(billing.plan_for_price_id("price_y"), Some(Plan::Yearly));
        assert_eq!(billing.plan_for_price_id("price_other"), None);
    }

    #[test]
    fn missing_gemini_key_is_config_error() {
        let mut config = AppConfig::default();
        // Unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "CM_TEST_NONEXISTENT_KEY_12345".into();
        let err = GeminiConfig::from_app(&config).unwrap_err();
        assert!(err.to_string().contains("API key not found"));
    }

    #[test]
    fn unsplash_key_is_optional() {
        let mut config = AppConfig::default();
        config.unsplash.access_key_env = "CM_TEST_NONEXISTENT_KEY_67890".into();
        let resolved = UnsplashConfig::from_app(&config).expect("resolve");
        assert!(resolved.access_key.is_none());
        assert_eq!(resolved.timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_base_url_rejected() {
        let mut config = AppConfig::default();
        config.unsplash.base_url = "not a url".into();
        assert!(UnsplashConfig::from_app(&config).is_err());
    }
}
