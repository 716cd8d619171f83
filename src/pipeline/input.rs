//! Input resolution: turn a user-supplied path or URL into a [`SourceFile`].
//!
//! A `SourceFile` is an immutable in-memory blob with a declared name and
//! MIME type. Bytes sit behind an `Arc<[u8]>` so the rasteriser can move a
//! handle into `spawn_blocking` without copying the document.
//!
//! The HTTP surface builds `SourceFile`s straight from multipart parts; the
//! CLI goes through [`load_source`], which also sniffs the media type when
//! nothing was declared.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const PDF_MIME: &str = "application/pdf";
const GENERIC_MIME: &str = "application/octet-stream";

/// How the pipeline treats a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A single image, passed to the model unchanged. Unknown types land here.
    Image,
    /// A (possibly multi-page) PDF, rasterised page by page.
    Pdf,
}

/// One input file admitted to the pipeline. Never mutated.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl SourceFile {
    /// Wrap bytes with a declared name and MIME type.
    ///
    /// An empty or generic MIME type is replaced by a sniffed one.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let data = data.into();
        let declared = mime_type.into();
        let mime_type = if declared.trim().is_empty() || declared == GENERIC_MIME {
            sniff_mime(&name, &data)
        } else {
            declared
        };
        Self {
            name,
            mime_type,
            data,
        }
    }

    /// Wrap bytes and sniff the MIME type from magic bytes and the name.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(name, String::new(), data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn kind(&self) -> MediaKind {
        if self.mime_type.eq_ignore_ascii_case(PDF_MIME) {
            MediaKind::Pdf
        } else {
            MediaKind::Image
        }
    }
}

/// Best-effort MIME detection: PDF magic, image magic, then file extension.
fn sniff_mime(name: &str, data: &[u8]) -> String {
    if data.starts_with(b"%PDF") || name.to_ascii_lowercase().ends_with(".pdf") {
        return PDF_MIME.to_string();
    }
    if let Ok(format) = image::guess_format(data) {
        return format.to_mime_type().to_string();
    }
    if let Ok(format) = image::ImageFormat::from_path(name) {
        return format.to_mime_type().to_string();
    }
    GENERIC_MIME.to_string()
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL into a [`SourceFile`].
///
/// Failures here are fatal: the batch has not started yet, so a bad path is
/// the caller's mistake rather than a per-file degradation.
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceFile, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<SourceFile, ExtractError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractError::FileNotFound { path });
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(e) => {
            return Err(ExtractError::InvalidInput {
                input: path_str.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let name = file_name(&path).unwrap_or_else(|| path_str.to_string());
    debug!("Loaded local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceFile::from_bytes(name, bytes))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceFile, ExtractError> {
    info!("Downloading: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
        .unwrap_or_default();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(SourceFile::new(name, declared_mime, bytes.to_vec()))
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
