//! Error types for the comment-extract library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExtractError`]: **Fatal**: the batch cannot start at all (no
//!   credential, empty file set, unreadable input path, provider not
//!   configured). Returned as `Err(ExtractError)` from the top-level
//!   `extract*` functions and mapped to a client error by the HTTP layer.
//!
//! * [`FileError`]: **Non-fatal**: one source file or one page failed
//!   (no rasterisation backend, corrupt PDF, model call failed). Stored
//!   inside [`crate::output::PageResult`] so the rest of the batch survives.
//!
//! * [`InvocationError`]: the typed failure of a single model call, wrapped
//!   by [`FileError::Invocation`] once it reaches the orchestrator.
//!
//! Response normalisation has no error type: it always produces comments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the comment-extract library.
///
/// Failures below the batch level use [`FileError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Request validation ────────────────────────────────────────────────
    /// No API key, provider name or pre-built provider was supplied.
    #[error("An API key is required.\nPass --api-key or set GEMINI_API_KEY, or choose a provider with --provider.")]
    MissingCredential,

    /// The batch contained no files.
    #[error("No files were provided; at least one image or PDF is required")]
    EmptyBatch,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The named provider could not be created (unknown name, missing key).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the export file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising the batch to CSV or JSON failed.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether the failure was caused by the caller's request rather than
    /// by the service. The HTTP layer answers these with `400 Bad Request`.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExtractError::MissingCredential
                | ExtractError::EmptyBatch
                | ExtractError::InvalidInput { .. }
                | ExtractError::InvalidConfig(_)
                | ExtractError::ProviderNotConfigured { .. }
        )
    }
}

/// A non-fatal error for one source file or one page.
///
/// Stored alongside the degraded [`crate::output::PageResult`]. The batch
/// always continues with the next page or file.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileError {
    /// No pdfium library could be bound, so PDFs cannot be rendered.
    #[error("rasterisation unavailable: {detail}")]
    RasterizationUnavailable { detail: String },

    /// The document header/xref is unreadable.
    #[error("document could not be opened: {detail}")]
    CorruptDocument { detail: String },

    /// The PDF is encrypted and the configured password is missing or wrong.
    #[error("document is encrypted and the password is missing or wrong")]
    PasswordRequired,

    /// pdfium failed on one page; the whole file degrades.
    #[error("page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// A rendered page could not be encoded as PNG.
    #[error("page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The model call for this page failed.
    #[error("model call failed: {0}")]
    Invocation(#[from] InvocationError),

    /// Unexpected internal error (e.g. a panicked render task).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure of one call to the external model. Never retried.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvocationError {
    /// The request never produced an HTTP response (DNS, TLS, reset…).
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with a non-success status.
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The API answered successfully but without any text.
    #[error("model returned no text")]
    EmptyResponse,

    /// An `edgequake_llm` provider reported an error.
    #[error("{0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_flagged() {
        assert!(ExtractError::MissingCredential.is_client_error());
        assert!(ExtractError::EmptyBatch.is_client_error());
        assert!(!ExtractError::Internal("boom".into()).is_client_error());
        assert!(!ExtractError::DownloadFailed {
            url: "https://x".into(),
            reason: "reset".into()
        }
        .is_client_error());
    }

    #[test]
    fn render_failed_display() {
        let e = FileError::RenderFailed {
            page: 3,
            detail: "bitmap alloc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("bitmap alloc"));
    }

    #[test]
    fn invocation_error_wraps_into_file_error() {
        let e: FileError = InvocationError::Api {
            status: 429,
            message: "quota".into(),
        }
        .into();
        assert_eq!(e.to_string(), "model call failed: API returned HTTP 429: quota");
    }

    #[test]
    fn file_error_serialises_externally_tagged() {
        let e = FileError::RasterizationUnavailable {
            detail: "no libpdfium".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["rasterization_unavailable"]["detail"], "no libpdfium");

        let e = FileError::Invocation(InvocationError::Transport("reset".into()));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["invocation"]["transport"], "reset");
    }
}
