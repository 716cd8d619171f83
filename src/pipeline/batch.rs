//! Batch orchestration: files in, one ordered [`PageResult`] per page out.
//!
//! Files are processed strictly one after another, and pages within a file
//! in ascending order, so results come out in submission order without any
//! re-sorting. Nothing that goes wrong inside a file escapes it:
//!
//! * rasterisation failure → one degraded result for the whole file
//! * invocation failure    → one degraded result for that page; the
//!   file's remaining pages still run
//! * a panic in either stage is caught and degraded the same way
//!
//! Normalisation is total and never fails.

use super::input::SourceFile;
use super::invoke::ModelInvoker;
use super::normalize::{normalize_response, DEFAULT_MAX_FALLBACK_CHARS};
use super::rasterize::{PageImage, PageRasterizer};
use crate::error::FileError;
use crate::output::{BatchResult, BatchStats, PageResult};
use crate::progress::ProgressCallback;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of rasterising one file.
pub(crate) enum RasterizedFile {
    Pages(Vec<PageImage>),
    Degraded(Box<PageResult>),
}

/// Drives rasterisation, invocation and normalisation over a batch.
#[derive(Clone)]
pub struct BatchExtractor {
    invoker: Arc<dyn ModelInvoker>,
    rasterizer: Arc<dyn PageRasterizer>,
    max_fallback_chars: usize,
    progress: Option<ProgressCallback>,
}

impl BatchExtractor {
    pub fn new(invoker: Arc<dyn ModelInvoker>, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self {
            invoker,
            rasterizer,
            max_fallback_chars: DEFAULT_MAX_FALLBACK_CHARS,
            progress: None,
        }
    }

    pub fn with_max_fallback_chars(mut self, n: usize) -> Self {
        self.max_fallback_chars = n.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Process every file and collect the ordered results with stats.
    pub async fn run(&self, files: &[SourceFile]) -> BatchResult {
        let start = Instant::now();
        let total = files.len();
        info!("Extracting comments from {} file(s)", total);

        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let mut results = Vec::new();
        for (idx, file) in files.iter().enumerate() {
            results.extend(self.process_file(file, idx + 1, total).await);
        }

        let stats = BatchStats::from_pages(total, &results, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {} pages, {} comments, {} degraded, {} via fallback, {}ms",
            stats.total_pages,
            stats.total_comments,
            stats.degraded_pages,
            stats.fallback_pages,
            stats.total_duration_ms
        );

        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(stats.total_pages, stats.degraded_pages);
        }

        BatchResult { results, stats }
    }

    /// Process one file into its page results. Never returns an empty list.
    ///
    /// `file_index` is 1-indexed and only used for progress reporting.
    pub async fn process_file(&self, file: &SourceFile, file_index: usize, total_files: usize) -> Vec<PageResult> {
        let results = match self.rasterize_file(file, file_index, total_files).await {
            RasterizedFile::Pages(pages) => {
                let mut out = Vec::with_capacity(pages.len());
                for page in pages {
                    out.push(self.process_page(page).await);
                }
                out
            }
            RasterizedFile::Degraded(result) => vec![*result],
        };

        self.finish_file(file_index, total_files, results.len());
        results
    }

    /// First half of [`process_file`](Self::process_file): announce the file
    /// and turn it into page images, or into its single degraded result.
    pub(crate) async fn rasterize_file(
        &self,
        file: &SourceFile,
        file_index: usize,
        total_files: usize,
    ) -> RasterizedFile {
        let start = Instant::now();
        debug!("[{}/{}] {} ({})", file_index, total_files, file.name(), file.mime_type());

        if let Some(ref cb) = self.progress {
            cb.on_file_start(file_index, total_files, file.name());
        }

        let rasterized = AssertUnwindSafe(self.rasterizer.rasterize(file))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(FileError::Internal(format!(
                    "rasteriser panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match rasterized {
            Ok(pages) if pages.is_empty() => RasterizedFile::Degraded(Box::new(self.degrade_file(
                file,
                FileError::CorruptDocument {
                    detail: "document has no pages".into(),
                },
                start,
            ))),
            Ok(pages) => RasterizedFile::Pages(pages),
            Err(e) => RasterizedFile::Degraded(Box::new(self.degrade_file(file, e, start))),
        }
    }

    pub(crate) fn finish_file(&self, file_index: usize, total_files: usize, page_count: usize) {
        if let Some(ref cb) = self.progress {
            cb.on_file_complete(file_index, total_files, page_count);
        }
    }

    fn degrade_file(&self, file: &SourceFile, error: FileError, start: Instant) -> PageResult {
        warn!("{}: {}", file.name(), error);
        if let Some(ref cb) = self.progress {
            cb.on_page_error(file.name(), &error.to_string());
        }
        PageResult::degraded(
            file.name(),
            file.name(),
            None,
            error,
            start.elapsed().as_millis() as u64,
        )
    }

    pub(crate) async fn process_page(&self, page: PageImage) -> PageResult {
        let start = Instant::now();
        let display_name = page.display_name();

        let invoked = AssertUnwindSafe(self.invoker.invoke(&page))
            .catch_unwind()
            .await
            .map_err(|panic| {
                FileError::Internal(format!("invoker panicked: {}", panic_message(panic.as_ref())))
            })
            .and_then(|r| r.map_err(FileError::from));

        match invoked {
            Ok(raw) => {
                let normalized = normalize_response(&raw, self.max_fallback_chars);
                if normalized.strategy.is_fallback() {
                    warn!(
                        "{}: reply was not valid JSON, recovered {} comment(s) via {:?}",
                        display_name,
                        normalized.comments.len(),
                        normalized.strategy
                    );
                } else {
                    debug!("{}: {} comment(s)", display_name, normalized.comments.len());
                }

                if let Some(ref cb) = self.progress {
                    cb.on_page_complete(&display_name, normalized.comments.len());
                }

                PageResult {
                    display_name,
                    comments: normalized.comments,
                    raw_response: raw,
                    source_name: page.source_name,
                    page: page.page,
                    strategy: Some(normalized.strategy),
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{}: {}", display_name, e);
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(&display_name, &e.to_string());
                }
                PageResult::degraded(
                    display_name,
                    page.source_name,
                    page.page,
                    e,
                    start.elapsed().as_millis() as u64,
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
