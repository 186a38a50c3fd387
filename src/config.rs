//! Configuration types for folio-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for [`Downloader`](crate::Downloader)
///
/// Every field has a default, so `Config::default()` (or an empty JSON object) is a working
/// configuration against the public reader.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Remote reader endpoints and request settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Per-page retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Download slot behavior
    #[serde(default)]
    pub session: SessionConfig,

    /// Document assembly settings
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Where and how finished documents are saved
    #[serde(default)]
    pub output: OutputConfig,

    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Check the configuration for values that would make downloads impossible
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("retry.max_attempts".to_string()),
            });
        }

        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(Error::Config {
                message: "backoff_multiplier must be a finite value >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }

        if self.session.pending_timeout.is_zero() {
            return Err(Error::Config {
                message: "pending_timeout must be greater than zero".to_string(),
                key: Some("session.pending_timeout".to_string()),
            });
        }

        if self.assembly.queue_capacity == 0 {
            return Err(Error::Config {
                message: "queue_capacity must be at least 1".to_string(),
                key: Some("assembly.queue_capacity".to_string()),
            });
        }

        let (w, h) = (
            self.assembly.default_page_width,
            self.assembly.default_page_height,
        );
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(Error::Config {
                message: format!("default page size must be positive, got {w}x{h}"),
                key: Some("assembly.default_page_width".to_string()),
            });
        }

        if url::Url::parse(&self.fetch.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid base_url: {}", self.fetch.base_url),
                key: Some("fetch.base_url".to_string()),
            });
        }

        Ok(())
    }
}

/// Remote reader configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Reader origin (default: "https://znanium.ru")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the per-page endpoint (default: "/read/page")
    #[serde(default = "default_page_path")]
    pub page_path: String,

    /// Path of the catalog page carrying author and table of contents
    /// (default: "/catalog/document")
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout of a single HTTP request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,

    /// Static bearer token used by the default token provider
    ///
    /// When unset and no custom provider is injected, every page fetch fails with
    /// a non-retryable "no auth token" error.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Raw `Cookie` header forwarded with reader requests
    #[serde(default)]
    pub cookie: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_path: default_page_path(),
            catalog_path: default_catalog_path(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            auth_token: None,
            cookie: None,
        }
    }
}

/// Retry configuration for page fetches
///
/// The reader drops requests under load and expires session tokens mid-download, so the default
/// is many attempts at a fixed delay rather than an exponential backoff.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Total attempts per page, first attempt included (default: 25)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2500 ms)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0, fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Download slot configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionConfig {
    /// How long a reserved slot may wait for `start` before it is released (default: 2000 ms)
    #[serde(default = "default_pending_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub pending_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_timeout: default_pending_timeout(),
        }
    }
}

/// Compression applied to EPUB content entries
///
/// The `mimetype` entry is always stored uncompressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EpubCompression {
    /// No compression (default)
    #[default]
    Stored,
    /// Deflate
    Deflated,
}

/// Document assembly configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AssemblyConfig {
    /// Page width used when a page's vector markup declares no usable size (default: 595, A4)
    #[serde(default = "default_page_width")]
    pub default_page_width: f32,

    /// Page height used when a page's vector markup declares no usable size (default: 842, A4)
    #[serde(default = "default_page_height")]
    pub default_page_height: f32,

    /// Capacity of the ordered command channel feeding the assembly worker (default: 8)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on accumulated page data per document, in bytes (None = unlimited)
    #[serde(default)]
    pub max_document_bytes: Option<u64>,

    /// Compression of EPUB entries
    #[serde(default)]
    pub epub_compression: EpubCompression,

    /// `dc:language` of produced EPUBs (default: "ru")
    #[serde(default = "default_epub_language")]
    pub epub_language: String,

    /// Load system fonts for text inside vector pages (default: false)
    #[serde(default)]
    pub load_system_fonts: bool,

    /// Creator written when the catalog has no author (default: "Unknown author")
    #[serde(default = "default_unknown_author")]
    pub unknown_author: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            default_page_width: default_page_width(),
            default_page_height: default_page_height(),
            queue_capacity: default_queue_capacity(),
            max_document_bytes: None,
            epub_compression: EpubCompression::default(),
            epub_language: default_epub_language(),
            load_system_fonts: false,
            unknown_author: default_unknown_author(),
        }
    }
}

/// File collision handling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Keep the existing file and do not write the new one
    Skip,
}

/// Output configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OutputConfig {
    /// Directory finished documents are written to (None = return bytes only)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub output_dir: Option<PathBuf>,

    /// What to do when the target file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Title used when a request carries none (default: "Book")
    #[serde(default = "default_title")]
    pub default_title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            file_collision: FileCollisionAction::default(),
            default_title: default_title(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_base_url() -> String {
    "https://znanium.ru".into()
}

fn default_page_path() -> String {
    "/read/page".into()
}

fn default_catalog_path() -> String {
    "/catalog/document".into()
}

fn default_user_agent() -> String {
    concat!("folio-dl/", env!("CARGO_PKG_VERSION")).into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    25
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(2500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_pending_timeout() -> Duration {
    Duration::from_millis(2000)
}

fn default_page_width() -> f32 {
    595.0
}

fn default_page_height() -> f32 {
    842.0
}

fn default_queue_capacity() -> usize {
    8
}

fn default_epub_language() -> String {
    "ru".into()
}

fn default_unknown_author() -> String {
    "Unknown author".into()
}

fn default_title() -> String {
    "Book".into()
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Durations are written as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
