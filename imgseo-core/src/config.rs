//! Configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::client::RetryPolicy;

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default vision model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Models that may be configured. Anything else falls back to the default.
pub const ALLOWED_GEMINI_MODELS: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash"];

/// Default server listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default API root the client talks to.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000/api/v1";

/// Total attempts per call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Fixed wait between attempts of one call.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 4000;

/// Wait between items of a bulk run.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1100;

/// Per-request HTTP timeout. Generation can take a while.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("Failed to read prompt file {path}: {source}")]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Server-side configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Vision provider: "gemini" (default) or "fake".
    pub provider: String,
    /// Gemini API key. Generation fails with `api_key_missing` when absent.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Custom prompt template; `None` uses the built-in default.
    pub prompt_template: Option<String>,
    /// Media library JSON document.
    pub library_path: PathBuf,
    /// Bearer token guarding the endpoints; `None` leaves them open.
    pub api_token: Option<String>,
    pub bind_addr: String,
}

impl ServerSettings {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `IMGSEO_PROVIDER`: "gemini" (default) or "fake"
    /// - `IMGSEO_GEMINI_API_KEY`: Gemini API key
    /// - `IMGSEO_GEMINI_MODEL`: `gemini-1.5-pro` or `gemini-1.5-flash` (default)
    /// - `IMGSEO_GEMINI_BASE_URL`: API base URL
    /// - `IMGSEO_PROMPT_FILE`: custom prompt template file
    /// - `IMGSEO_LIBRARY_PATH`: media library (default: "~/.imgseo/library.json")
    /// - `IMGSEO_API_TOKEN`: bearer token required by the endpoints
    /// - `IMGSEO_BIND_ADDR`: listen address (default: "0.0.0.0:3000")
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let model = validate_model(get("IMGSEO_GEMINI_MODEL").as_deref()).to_string();

        let prompt_template = match get("IMGSEO_PROMPT_FILE") {
            Some(path) => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::PromptFile { path, source })?;
                Some(content).filter(|c| !c.trim().is_empty())
            }
            None => None,
        };

        Ok(Self {
            provider: get("IMGSEO_PROVIDER").unwrap_or_else(|| "gemini".to_string()),
            api_key: get("IMGSEO_GEMINI_API_KEY"),
            model,
            base_url: get("IMGSEO_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            prompt_template,
            library_path: get("IMGSEO_LIBRARY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(Self::default_library_path),
            api_token: get("IMGSEO_API_TOKEN"),
            bind_addr: get("IMGSEO_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    /// Get the default library path: ~/.imgseo/library.json
    pub fn default_library_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".imgseo").join("library.json"))
            .unwrap_or_else(|| PathBuf::from("data/library.json"))
    }
}

/// Resolve a configured model name against the allowed list.
pub fn validate_model(model: Option<&str>) -> &'static str {
    match model {
        None => DEFAULT_GEMINI_MODEL,
        Some(requested) => match ALLOWED_GEMINI_MODELS.iter().copied().find(|m| *m == requested) {
            Some(allowed) => allowed,
            None => {
                tracing::warn!(
                    requested,
                    fallback = DEFAULT_GEMINI_MODEL,
                    "unsupported model configured, using default"
                );
                DEFAULT_GEMINI_MODEL
            }
        },
    }
}

/// Client-side configuration for single calls and bulk runs.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server_url: String,
    pub api_token: Option<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `IMGSEO_SERVER_URL`: API root (default: "http://127.0.0.1:3000/api/v1")
    /// - `IMGSEO_API_TOKEN`: bearer token
    /// - `IMGSEO_MAX_ATTEMPTS`: attempts per call (default: 2)
    /// - `IMGSEO_RETRY_DELAY_MS`: delay between attempts (default: 4000)
    /// - `IMGSEO_REQUEST_DELAY_MS`: delay between bulk items (default: 1100)
    /// - `IMGSEO_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout (default: 120)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let max_attempts = parse_number(get("IMGSEO_MAX_ATTEMPTS"), "IMGSEO_MAX_ATTEMPTS")?
            .unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                var: "IMGSEO_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_url: get("IMGSEO_SERVER_URL").unwrap_or(defaults.server_url),
            api_token: get("IMGSEO_API_TOKEN"),
            max_attempts,
            retry_delay_ms: parse_number(get("IMGSEO_RETRY_DELAY_MS"), "IMGSEO_RETRY_DELAY_MS")?
                .unwrap_or(defaults.retry_delay_ms),
            request_delay_ms: parse_number(
                get("IMGSEO_REQUEST_DELAY_MS"),
                "IMGSEO_REQUEST_DELAY_MS",
            )?
            .unwrap_or(defaults.request_delay_ms),
            request_timeout_secs: parse_number(
                get("IMGSEO_REQUEST_TIMEOUT_SECS"),
                "IMGSEO_REQUEST_TIMEOUT_SECS",
            )?
            .unwrap_or(defaults.request_timeout_secs),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(
    value: Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.parse().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: v.clone(),
            })
        })
        .transpose()
}
