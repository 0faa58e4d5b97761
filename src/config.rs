use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;

pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_LANGUAGE_HINT: &str = "en";

/// Largest side, in pixels, of the image sent to the vision API.
pub const MAX_IMAGE_SIZE: u32 = 1024;
/// JPEG quality of the re-encoded upload.
pub const IMAGE_QUALITY: u8 = 85;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPreset {
    pub name: String,
    pub url_prefix: String,
}

impl WebPreset {
    pub fn new(name: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

/// The built-in presets. The first one is the editor's default selection.
pub fn builtin_presets() -> Vec<WebPreset> {
    vec![
        WebPreset::new("Google", "https://www.google.com/search?q="),
        WebPreset::new(
            "Wikipedia",
            "https://en.wikipedia.org/wiki/Special:Search?search=",
        ),
        WebPreset::new("Google Translate", "https://translate.google.com/?text="),
    ]
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub watch_dir: PathBuf,
    pub vision_endpoint: String,
    pub language_hint: String,
    pub log_level: LevelFilter,
    pub web_presets: Vec<WebPreset>,
}

impl AppConfig {
    /// Loads `.env` from the working directory (if any), then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = read("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        let watch_dir = read("WATCH_DIR")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("WATCH_DIR"))?;

        let log_level = match read("LOG_LEVEL") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "LOG_LEVEL",
                value,
            })?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            api_key,
            watch_dir,
            vision_endpoint: read("VISION_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_VISION_ENDPOINT.to_string()),
            language_hint: read("OCR_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_LANGUAGE_HINT.to_string()),
            log_level,
            web_presets: builtin_presets(),
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("watch_dir", &self.watch_dir)
            .field("vision_endpoint", &self.vision_endpoint)
            .field("language_hint", &self.language_hint)
            .field("log_level", &self.log_level)
            .field("web_presets", &self.web_presets)
            .finish()
    }
}
