//! Eager (whole-batch) extraction entry points.
//!
//! These wait for every file, then return the ordered [`BatchResult`]. Use
//! [`crate::stream::extract_stream`] to see page results as they finish.
//!
//! Only request-level problems are errors here: an empty batch, no way to
//! reach a model, an unreadable input path. Once the batch starts, failures
//! are recorded per file or per page inside the result.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::export::{self, ExportFormat};
use crate::output::{BatchResult, BatchStats};
use crate::pipeline::batch::BatchExtractor;
use crate::pipeline::input::{load_source, SourceFile};
use crate::pipeline::invoke::resolve_invoker;
use crate::pipeline::rasterize::PdfiumRasterizer;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract comments from in-memory files.
///
/// This is the primary entry point for the library; the HTTP service calls
/// it with the uploaded parts.
///
/// # Errors
/// * [`ExtractError::EmptyBatch`] when `files` is empty
/// * [`ExtractError::MissingCredential`] when the config has no API key,
///   provider name or provider
/// * [`ExtractError::ProviderNotConfigured`] when a named provider cannot be built
pub async fn extract_batch(
    files: Vec<SourceFile>,
    config: &ExtractionConfig,
) -> Result<BatchResult, ExtractError> {
    let extractor = build_extractor(files.len(), config)?;
    Ok(extractor.run(&files).await)
}

/// Extract comments from local paths and/or URLs.
///
/// Credentials are checked before anything is read or downloaded.
pub async fn extract_paths<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchResult, ExtractError> {
    if inputs.is_empty() {
        return Err(ExtractError::EmptyBatch);
    }
    if !config.has_credential() {
        return Err(ExtractError::MissingCredential);
    }

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        files.push(load_source(input.as_ref(), config.download_timeout_secs).await?);
    }
    extract_batch(files, config).await
}

/// Extract comments and write the export directly to a file.
///
/// The format defaults to the output path's extension. Uses atomic write
/// (temp file + rename) to prevent partial files.
pub async fn extract_to_file<S: AsRef<str>>(
    inputs: &[S],
    output_path: impl AsRef<Path>,
    format: Option<ExportFormat>,
    config: &ExtractionConfig,
) -> Result<BatchStats, ExtractError> {
    let batch = extract_paths(inputs, config).await?;
    let path = output_path.as_ref();
    let format = format.unwrap_or_else(|| ExportFormat::from_path(path));
    let body = export::render(&batch, format)?;

    write_atomic(path, body.as_bytes()).await?;
    info!(
        "Wrote {} comment(s) to {}",
        batch.stats.total_comments,
        path.display()
    );
    Ok(batch.stats)
}

/// Synchronous wrapper around [`extract_paths`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchResult, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_paths(inputs, config))
}

/// Validate the request and wire up the default stages.
pub(crate) fn build_extractor(
    file_count: usize,
    config: &ExtractionConfig,
) -> Result<BatchExtractor, ExtractError> {
    if file_count == 0 {
        return Err(ExtractError::EmptyBatch);
    }
    let invoker = resolve_invoker(config)?;
    let rasterizer = Arc::new(PdfiumRasterizer::from_config(config));

    Ok(BatchExtractor::new(invoker, rasterizer)
        .with_max_fallback_chars(config.max_fallback_chars)
        .with_progress(config.progress_callback.clone()))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    let write_err = |e| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let config = ExtractionConfig::builder().api_key("k").build().unwrap();
        let err = extract_batch(Vec::new(), &config).await.unwrap_err();
        assert!(matches!(err, ExtractError::EmptyBatch));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_before_reading_inputs() {
        let err = extract_paths(&["/definitely/not/here.png"], &ExtractionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingCredential));
    }

    #[tokio::test]
    async fn bad_path_is_fatal() {
        let config = ExtractionConfig::builder().api_key("k").build().unwrap();
        let err = extract_paths(&["/definitely/not/here.png"], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("comments.csv");
        write_atomic(&path, b"Image Name\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Image Name\n");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn sync_wrapper_reports_errors() {
        let err = extract_sync::<&str>(&[], &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyBatch));
    }
}
