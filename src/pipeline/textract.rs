//! HTTP client for the cloud OCR service (AWS Textract, synchronous API).
//!
//! The service speaks AWS JSON 1.1: every call is a `POST /` whose operation
//! is named by the `X-Amz-Target` header, signed with Signature Version 4.
//! Only the two synchronous operations are used:
//!
//! | mode      | target                           | extra body field                      |
//! |-----------|----------------------------------|---------------------------------------|
//! | `detect`  | `Textract.DetectDocumentText`    | none                                  |
//! | `analyze` | `Textract.AnalyzeDocument`       | `"FeatureTypes": ["TABLES", "FORMS"]` |
//!
//! Errors come back as `{"__type": "...#Code", "message": "..."}` and are
//! decoded into [`DocnormError::CloudApi`]. The client never retries; a
//! failed call is one terminal outcome for the selector to act on.
//!
//! [`OcrService`] is the seam the cloud backend depends on, so hosts and
//! tests can inject their own implementation.

use super::blocks::Block;
use crate::config::{ApiMode, ProcessorConfig};
use crate::error::DocnormError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "textract";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// A response from the OCR service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrResponse {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub document_metadata: Option<OcrDocumentMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrDocumentMetadata {
    #[serde(default)]
    pub pages: Option<usize>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A cloud OCR service: raw document bytes in, blocks out.
#[async_trait]
pub trait OcrService: Send + Sync {
    async fn analyze(&self, document: &[u8], mode: ApiMode) -> Result<OcrResponse, DocnormError>;
}

/// Static credentials used to sign requests.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// [`OcrService`] backed by the Textract HTTP API.
#[derive(Debug)]
pub struct TextractClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    region: String,
    credentials: Option<Credentials>,
    timeout_secs: u64,
}

impl TextractClient {
    /// Build a client from the config. Missing credentials are not an error
    /// here: the first call reports them, so the selector can fall back.
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, DocnormError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://textract.{}.amazonaws.com/", config.region));
        let endpoint = reqwest::Url::parse(&endpoint).map_err(|e| {
            DocnormError::InvalidConfig(format!("Invalid Textract endpoint '{}': {}", endpoint, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| DocnormError::Internal(format!("HTTP client: {}", e)))?;

        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(Credentials {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
                session_token: config.session_token.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            http,
            endpoint,
            region: config.region.clone(),
            credentials,
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

#[async_trait]
impl OcrService for TextractClient {
    async fn analyze(&self, document: &[u8], mode: ApiMode) -> Result<OcrResponse, DocnormError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(DocnormError::CredentialsMissing)?;

        let target = target_for(mode);
        let body = request_body(document, mode).to_string();
        let now = Utc::now();
        let signed = sign_request(
            &SigningInput {
                host: &self.host(),
                region: &self.region,
                target,
                body: &body,
                now,
            },
            credentials,
        )?;

        debug!(
            "Textract {} request: {} bytes document, {} bytes body",
            target,
            document.len(),
            body.len()
        );

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                DocnormError::CloudTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                DocnormError::CloudTransport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                DocnormError::CloudTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                DocnormError::CloudTransport(e.to_string())
            }
        })?;

        if !status.is_success() {
            let err = decode_error(status.as_u16(), &text);
            warn!("Textract call failed with HTTP {}: {}", status, err);
            return Err(err);
        }

        serde_json::from_str(&text)
            .map_err(|e| DocnormError::CloudTransport(format!("Malformed Textract response: {}", e)))
    }
}

fn target_for(mode: ApiMode) -> &'static str {
    match mode {
        ApiMode::Detect => "Textract.DetectDocumentText",
        ApiMode::Analyze => "Textract.AnalyzeDocument",
    }
}

fn request_body(document: &[u8], mode: ApiMode) -> serde_json::Value {
    let bytes = base64::engine::general_purpose::STANDARD.encode(document);
    match mode {
        ApiMode::Detect => serde_json::json!({ "Document": { "Bytes": bytes } }),
        ApiMode::Analyze => serde_json::json!({
            "Document": { "Bytes": bytes },
            "FeatureTypes": ["TABLES", "FORMS"],
        }),
    }
}

/// Decode an AWS JSON error body. `__type` may carry a namespace prefix
/// (`com.amazonaws.textract#InvalidParameterException`).
fn decode_error(status: u16, body: &str) -> DocnormError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(rename = "__type")]
        kind: Option<String>,
        #[serde(alias = "Message")]
        message: Option<String>,
    }

    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (kind, message) = parsed
        .map(|b| (b.kind, b.message))
        .unwrap_or((None, None));

    let code = kind
        .map(|k| k.rsplit('#').next().unwrap_or_default().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("HTTP{}", status));
    let message = message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().chars().take(200).collect());

    DocnormError::CloudApi { code, message }
}

// ── Signature Version 4 ──────────────────────────────────────────────────

struct SigningInput<'a> {
    host: &'a str,
    region: &'a str,
    target: &'a str,
    body: &'a str,
    now: DateTime<Utc>,
}

struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DocnormError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| DocnormError::Internal(format!("HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sign_request(
    input: &SigningInput<'_>,
    credentials: &Credentials,
) -> Result<SignedHeaders, DocnormError> {
    let amz_date = input.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = input.now.format("%Y%m%d").to_string();

    let mut headers: Vec<(&str, &str)> = vec![
        ("content-type", CONTENT_TYPE),
        ("host", input.host),
        ("x-amz-date", amz_date.as_str()),
        ("x-amz-target", input.target),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.as_str()));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| *k)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n/\n\n{}\n{}\n{}",
        canonical_headers,
        signed_headers,
        sha256_hex(input.body.as_bytes())
    );

    let scope = format!("{}/{}/{}/aws4_request", date_stamp, input.region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, input.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature: String = hmac_sha256(&k_signing, string_to_sign.as_bytes())?
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    Ok(SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, scope, signed_headers, signature
        ),
        amz_date,
    })
}
