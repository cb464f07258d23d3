//! The Processor Selector: pick a backend per document, fall back, never fail.
//!
//! ```text
//! resolve ──▶ route ──▶ cloud ──(error, fallback on)──▶ local ──▶ Document
//!                  └──────────(ineligible)────────────▶ local
//! ```
//!
//! Every `process*` entry point returns a [`Document`]. Input errors, backend
//! failures with no fallback left, and "no processor available" all become an
//! error Document via [`Document::from_error`]. Only [`DocumentProcessor::process_to_file`]
//! returns a `Result`, for the write itself.

use crate::config::ProcessorConfig;
use crate::document::Document;
use crate::error::DocnormError;
use crate::pipeline::cloud::CloudBackend;
use crate::pipeline::input::{self, InputFile};
use crate::pipeline::local::LocalBackend;
use crate::pipeline::textract::{OcrService, TextractClient};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which backends a document will be offered to, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cloud first, local if the cloud call fails.
    CloudThenLocal,
    /// Cloud only; a failure is terminal.
    CloudOnly,
    /// Cloud is disabled or the document exceeds its limits.
    LocalOnly,
    /// Nothing can take the document.
    Unavailable,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::CloudThenLocal => "cloud+local",
            Route::CloudOnly => "cloud",
            Route::LocalOnly => "local",
            Route::Unavailable => "none",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two extraction backends.
#[derive(Debug, Clone)]
pub enum Backend {
    Cloud(CloudBackend),
    Local(LocalBackend),
}

impl Backend {
    pub async fn extract(&self, file: &InputFile) -> Result<Document, DocnormError> {
        match self {
            Backend::Cloud(b) => b.extract(file).await,
            Backend::Local(b) => b.extract(file).await,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Backend::Cloud(b) => b.processor_tag(),
            Backend::Local(b) => b.processor_tag().to_string(),
        }
    }
}

/// Routes documents to the cloud or local backend.
///
/// Holds read-only configuration and backend handles only; one instance can
/// serve many concurrent `process` calls.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    config: ProcessorConfig,
    cloud: Option<Backend>,
    local: Option<Backend>,
}

impl DocumentProcessor {
    /// Build the real backends: a Textract client when cloud is enabled and
    /// the pdfium readers when local extraction is.
    ///
    /// A cloud client that cannot be built is logged and left out, so the
    /// processor degrades to local-only instead of failing.
    pub fn new(config: ProcessorConfig) -> Self {
        let service: Option<Arc<dyn OcrService>> = if config.cloud_enabled {
            match TextractClient::from_config(&config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Textract client unavailable, cloud disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let local = LocalBackend::from_config(&config);
        Self::with_backends(config, service, local)
    }

    /// Build with caller-supplied backends.
    ///
    /// `service` is ignored when cloud is disabled in `config`; `local` is
    /// ignored when local fallback is off.
    pub fn with_backends(
        config: ProcessorConfig,
        service: Option<Arc<dyn OcrService>>,
        local: Option<LocalBackend>,
    ) -> Self {
        let cloud = service
            .filter(|_| config.cloud_enabled)
            .map(|s| Backend::Cloud(CloudBackend::new(s, config.api_mode)));
        let local = local
            .filter(|_| config.local_available())
            .map(Backend::Local);

        let processor = Self {
            config,
            cloud,
            local,
        };
        info!("Document processor mode: {}", processor.mode());
        processor
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Routing mode with the backends that actually initialised.
    pub fn mode(&self) -> String {
        if self.cloud.is_none() && self.local.is_none() {
            return "disabled".to_string();
        }
        let mut cfg = self.config.clone();
        cfg.cloud_enabled = self.cloud.is_some();
        if self.local.is_none() {
            cfg.local_fallback = false;
        }
        cfg.processor_mode()
    }

    /// Decide which backends a document of this size may use.
    ///
    /// Ineligibility for the cloud is a silent downgrade to local.
    pub fn route(&self, size_bytes: u64, page_count: Option<usize>) -> Route {
        let cloud = self.cloud.is_some() && self.config.cloud_eligible(size_bytes, page_count);
        match (cloud, self.local.is_some()) {
            (true, true) => Route::CloudThenLocal,
            (true, false) => Route::CloudOnly,
            (false, true) => Route::LocalOnly,
            (false, false) => Route::Unavailable,
        }
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Process a file. `content_type` overrides extension-based detection.
    pub async fn process(&self, path: impl AsRef<Path>, content_type: Option<&str>) -> Document {
        self.process_with_pages(path, content_type, None).await
    }

    /// Like [`process`](Self::process), with a page count known up front
    /// (checked against the cloud page limit).
    pub async fn process_with_pages(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
        page_count: Option<usize>,
    ) -> Document {
        let path = path.as_ref();
        match input::resolve(path, content_type) {
            Ok(file) => self.run(&file, page_count).await,
            Err(e) => {
                warn!("Cannot read input {}: {}", path.display(), e);
                let ct = content_type
                    .map(str::to_string)
                    .unwrap_or_else(|| input::guess_content_type(path).to_string());
                Document::from_error(input::file_name(path), ct, e)
            }
        }
    }

    /// Process in-memory bytes.
    ///
    /// The bytes are written to a managed [`tempfile`] carrying `file_name`'s
    /// extension, which is removed when this returns.
    pub async fn process_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: Option<&str>,
    ) -> Document {
        let ct_for_error = || {
            content_type
                .map(str::to_string)
                .unwrap_or_else(|| input::guess_content_type(Path::new(file_name)).to_string())
        };

        let tmp = match write_temp(bytes, file_name) {
            Ok(tmp) => tmp,
            Err(e) => return Document::from_error(file_name, ct_for_error(), e),
        };
        let mut file = match input::resolve(tmp.path(), content_type) {
            Ok(file) => file,
            Err(e) => return Document::from_error(file_name, ct_for_error(), e),
        };
        file.file_name = file_name.to_string();
        // `tmp` is dropped (and the file deleted) after `run` returns
        self.run(&file, None).await
    }

    /// Process a file and write the Document as JSON to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files. The
    /// Document is returned whether or not it succeeded.
    pub async fn process_to_file(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
        output_path: impl AsRef<Path>,
    ) -> Result<Document, DocnormError> {
        let document = self.process(path, content_type).await;
        let out = output_path.as_ref();

        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| DocnormError::Internal(format!("Failed to serialise document: {}", e)))?;

        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocnormError::OutputWriteFailed {
                    path: out.to_path_buf(),
                    source: e,
                })?;
        }

        let tmp_path = out.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| DocnormError::OutputWriteFailed {
                path: out.to_path_buf(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, out)
            .await
            .map_err(|e| DocnormError::OutputWriteFailed {
                path: out.to_path_buf(),
                source: e,
            })?;

        debug!("Wrote {}", out.display());
        Ok(document)
    }

    /// Synchronous wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn process_sync(&self, path: impl AsRef<Path>, content_type: Option<&str>) -> Document {
        let path = path.as_ref();
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.process(path, content_type)),
            Err(e) => Document::from_error(
                input::file_name(path),
                content_type.unwrap_or(input::MIME_UNKNOWN),
                DocnormError::Internal(format!("Failed to create tokio runtime: {}", e)),
            ),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    async fn run(&self, file: &InputFile, page_count: Option<usize>) -> Document {
        let start = Instant::now();
        let route = self.route(file.size_bytes, page_count);
        if self.config.log_processor_selection {
            info!(
                "Processor selection for {} ({} bytes, {}): {}",
                file.file_name, file.size_bytes, file.content_type, route
            );
        }

        let result = match route {
            Route::Unavailable => Err(DocnormError::NoProcessorAvailable),
            Route::LocalOnly => self.try_local(file).await,
            Route::CloudOnly => self.try_cloud(file).await,
            Route::CloudThenLocal => match self.try_cloud(file).await {
                Ok(doc) => Ok(doc),
                Err(e) => {
                    warn!(
                        "Cloud extraction failed for {} ({:?}), falling back to local: {}",
                        file.file_name,
                        e.kind(),
                        e
                    );
                    self.try_local(file).await
                }
            },
        };

        match result {
            Ok(doc) => {
                info!(
                    "Processed {} with {}: {} chunks, {} tables in {}ms",
                    doc.file_name,
                    doc.processor,
                    doc.chunks.len(),
                    doc.tables.len(),
                    start.elapsed().as_millis()
                );
                doc
            }
            Err(e) => {
                warn!(
                    "Processing failed for {} ({:?}): {}",
                    file.file_name,
                    e.kind(),
                    e
                );
                Document::from_error(file.file_name.clone(), file.content_type.clone(), e)
            }
        }
    }

    async fn try_cloud(&self, file: &InputFile) -> Result<Document, DocnormError> {
        match &self.cloud {
            Some(backend) => backend.extract(file).await,
            None => Err(DocnormError::NoProcessorAvailable),
        }
    }

    async fn try_local(&self, file: &InputFile) -> Result<Document, DocnormError> {
        match &self.local {
            Some(backend) => {
                if self.config.log_processor_selection {
                    debug!("Using {} for {}", backend.name(), file.file_name);
                }
                backend.extract(file).await
            }
            None => Err(DocnormError::NoProcessorAvailable),
        }
    }
}

fn write_temp(bytes: &[u8], file_name: &str) -> Result<tempfile::NamedTempFile, DocnormError> {
    let suffix = Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix("docnorm-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| DocnormError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| DocnormError::Internal(format!("tempfile write: {e}")))?;
    Ok(tmp)
}
