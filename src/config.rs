//! Configuration types for document extraction.
//!
//! Every routing and extraction knob lives in [`ProcessorConfig`], built via
//! its [`ProcessorConfigBuilder`]. The config is read-only input: a
//! [`crate::process::DocumentProcessor`] captures it at construction and never
//! mutates it, so one config can be shared across any number of concurrent
//! documents.
//!
//! The routing policy helpers ([`ProcessorConfig::cloud_eligible`],
//! [`ProcessorConfig::processor_mode`]) live here too, because they are pure
//! functions of the configuration.

use crate::error::DocnormError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default Textract region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default chunk size threshold in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1500;

/// Configuration for a [`crate::process::DocumentProcessor`].
///
/// Built via [`ProcessorConfig::builder()`] or using
/// [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use docnorm::{ApiMode, ProcessorConfig};
///
/// let config = ProcessorConfig::builder()
///     .cloud_enabled(true)
///     .api_mode(ApiMode::Detect)
///     .max_file_size_mb(5)
///     .build()
///     .unwrap();
/// assert!(config.cloud_eligible(1024, Some(3)));
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Send eligible documents to the cloud OCR service. Default: false.
    pub cloud_enabled: bool,

    /// Cloud region, e.g. "us-east-1". Default: "us-east-1".
    pub region: String,

    /// Access key id used to sign cloud requests.
    pub access_key_id: Option<String>,

    /// Secret key used to sign cloud requests.
    pub secret_access_key: Option<String>,

    /// Session token for temporary credentials.
    pub session_token: Option<String>,

    /// Override for the service endpoint (e.g. a local mock). Default: None,
    /// meaning `https://textract.{region}.amazonaws.com`.
    pub endpoint: Option<String>,

    /// `detect` (text only) or `analyze` (text + tables + forms). Default: analyze.
    pub api_mode: ApiMode,

    /// Largest file, in megabytes, the cloud backend accepts. Default: 10.
    ///
    /// Larger files are routed to the local backend without an error.
    pub max_file_size_mb: u64,

    /// Largest page count the cloud backend accepts, when the page count is
    /// known up front. Default: 100.
    pub max_pages: usize,

    /// Allow the local backend as a fallback and as the primary path when the
    /// cloud is ineligible. Default: true.
    pub local_fallback: bool,

    /// Enable the pdfium text extractor. Default: true.
    ///
    /// When disabled the local backend is unavailable.
    pub text_extractor_enabled: bool,

    /// Enable the table-specialized local extractor. Default: true.
    pub table_extractor_enabled: bool,

    /// Chunk size threshold in characters. Default: 1500.
    pub chunk_size: usize,

    /// Per-call timeout for the cloud OCR service in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Directory (or full path) of the pdfium shared library. Default: None,
    /// meaning the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Log the chosen backend for every document. Default: true.
    pub log_processor_selection: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cloud_enabled: false,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint: None,
            api_mode: ApiMode::default(),
            max_file_size_mb: 10,
            max_pages: 100,
            local_fallback: true,
            text_extractor_enabled: true,
            table_extractor_enabled: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            api_timeout_secs: 60,
            pdfium_lib_path: None,
            log_processor_selection: true,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProcessorConfig")
            .field("cloud_enabled", &self.cloud_enabled)
            .field("region", &self.region)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .field("api_mode", &self.api_mode)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("max_pages", &self.max_pages)
            .field("local_fallback", &self.local_fallback)
            .field("text_extractor_enabled", &self.text_extractor_enabled)
            .field("table_extractor_enabled", &self.table_extractor_enabled)
            .field("chunk_size", &self.chunk_size)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the cloud backend may take a document of this size and page count.
    ///
    /// An unknown page count never disqualifies a document.
    pub fn cloud_eligible(&self, file_size_bytes: u64, page_count: Option<usize>) -> bool {
        if !self.cloud_enabled {
            return false;
        }
        let size_mb = file_size_bytes as f64 / (1024.0 * 1024.0);
        if size_mb > self.max_file_size_mb as f64 {
            return false;
        }
        match page_count {
            Some(pages) => pages <= self.max_pages,
            None => true,
        }
    }

    /// Whether the local backend can run at all.
    pub fn local_available(&self) -> bool {
        self.local_fallback && self.text_extractor_enabled
    }

    /// Human-readable routing mode, e.g. for startup logs.
    pub fn processor_mode(&self) -> String {
        let local = self.local_extractor_label();
        match (self.cloud_enabled, self.local_available()) {
            (true, true) => format!(
                "hybrid (Textract {} + local fallback: {})",
                self.api_mode, local
            ),
            (true, false) => format!("cloud-only (Textract {})", self.api_mode),
            (false, true) => format!("local-only ({})", local),
            (false, false) => "disabled".to_string(),
        }
    }

    fn local_extractor_label(&self) -> &'static str {
        if self.table_extractor_enabled {
            "pdfium text + pdfium tables"
        } else {
            "pdfium text"
        }
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn cloud_enabled(mut self, v: bool) -> Self {
        self.config.cloud_enabled = v;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.access_key_id = Some(access_key_id.into());
        self.config.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.session_token = Some(token.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_mode(mut self, mode: ApiMode) -> Self {
        self.config.api_mode = mode;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    pub fn local_fallback(mut self, v: bool) -> Self {
        self.config.local_fallback = v;
        self
    }

    pub fn text_extractor_enabled(mut self, v: bool) -> Self {
        self.config.text_extractor_enabled = v;
        self
    }

    pub fn table_extractor_enabled(mut self, v: bool) -> Self {
        self.config.table_extractor_enabled = v;
        self
    }

    pub fn chunk_size(mut self, chars: usize) -> Self {
        self.config.chunk_size = chars;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn log_processor_selection(mut self, v: bool) -> Self {
        self.config.log_processor_selection = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, DocnormError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(DocnormError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.max_file_size_mb == 0 {
            return Err(DocnormError::InvalidConfig(
                "Max file size must be ≥ 1 MB".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocnormError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.region.trim().is_empty() {
            return Err(DocnormError::InvalidConfig("Region must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which cloud OCR operation to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// Text only (`DetectDocumentText`). Never yields tables.
    Detect,
    /// Text, tables and forms (`AnalyzeDocument`). (default)
    #[default]
    Analyze,
}

impl ApiMode {
    /// Lowercase name used in processor tags (`textract_detect`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMode::Detect => "detect",
            ApiMode::Analyze => "analyze",
        }
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiMode {
    type Err = DocnormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detect" => Ok(ApiMode::Detect),
            "analyze" => Ok(ApiMode::Analyze),
            other => Err(DocnormError::InvalidConfig(format!(
                "API mode must be 'detect' or 'analyze', got '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn defaults_match_service_defaults() {
        let c = ProcessorConfig::default();
        assert!(!c.cloud_enabled);
        assert_eq!(c.region, "us-east-1");
        assert_eq!(c.api_mode, ApiMode::Analyze);
        assert_eq!(c.max_file_size_mb, 10);
        assert_eq!(c.max_pages, 100);
        assert!(c.local_fallback);
        assert!(c.table_extractor_enabled);
        assert_eq!(c.chunk_size, 1500);
    }

    #[test]
    fn cloud_disabled_is_never_eligible() {
        let c = ProcessorConfig::default();
        assert!(!c.cloud_eligible(1, Some(1)));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let c = ProcessorConfig::builder().cloud_enabled(true).build().unwrap();
        assert!(c.cloud_eligible(10 * MB, None));
        assert!(!c.cloud_eligible(10 * MB + 1, None));
        assert!(!c.cloud_eligible(50 * MB, None));
    }

    #[test]
    fn page_limit_applies_only_when_known() {
        let c = ProcessorConfig::builder()
            .cloud_enabled(true)
            .max_pages(5)
            .build()
            .unwrap();
        assert!(c.cloud_eligible(MB, Some(5)));
        assert!(!c.cloud_eligible(MB, Some(6)));
        assert!(c.cloud_eligible(MB, None));
    }

    #[test]
    fn processor_mode_strings() {
        let hybrid = ProcessorConfig::builder().cloud_enabled(true).build().unwrap();
        assert!(hybrid.processor_mode().starts_with("hybrid (Textract analyze"));

        let local = ProcessorConfig::default();
        assert!(local.processor_mode().starts_with("local-only"));

        let none = ProcessorConfig::builder()
            .local_fallback(false)
            .build()
            .unwrap();
        assert_eq!(none.processor_mode(), "disabled");
    }

    #[test]
    fn build_rejects_zero_chunk_size() {
        let err = ProcessorConfig::builder().chunk_size(0).build().unwrap_err();
        assert!(matches!(err, DocnormError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ProcessorConfig::builder()
            .credentials("AKIDEXAMPLE", "wJalrXUtnFEMI")
            .build()
            .unwrap();
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("AKIDEXAMPLE"));
        assert!(!dbg.contains("wJalrXUtnFEMI"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn api_mode_parses_case_insensitively() {
        assert_eq!("DETECT".parse::<ApiMode>().unwrap(), ApiMode::Detect);
        assert_eq!(" analyze ".parse::<ApiMode>().unwrap(), ApiMode::Analyze);
        assert!("forms".parse::<ApiMode>().is_err());
    }
}
