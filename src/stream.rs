//! Streaming extraction API: emit page results as they complete.
//!
//! Unlike the eager [`crate::extract::extract_batch`], which returns after
//! every file finishes, [`extract_stream`] yields each [`PageResult`] as soon
//! as its page has been normalised; a PDF's first page does not wait for the
//! rest of the document. Files still run one at a time, so items
//! arrive in the same order as the eager result. Degraded pages are items
//! too; the stream never ends early because of a bad file.
//!
//! Batch-level progress events (`on_batch_start`, `on_batch_complete`) are
//! not emitted in streaming mode; per-file and per-page events are.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::build_extractor;
use crate::output::PageResult;
use crate::pipeline::batch::{BatchExtractor, RasterizedFile};
use crate::pipeline::input::SourceFile;
use futures::future;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Extract comments, streaming page results in batch order.
///
/// # Returns
/// - `Ok(PageStream)`: one item per page image, degraded ones included
/// - `Err(ExtractError)`: empty batch or no usable credential
///
/// # Example
/// ```rust,no_run
/// use comment_extract::{extract_stream, ExtractionConfig, SourceFile};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("thread.png")?;
/// let config = ExtractionConfig::builder().api_key("AIza...").build()?;
/// let mut stream = extract_stream(vec![SourceFile::from_bytes("thread.png", bytes)], &config).await?;
/// while let Some(page) = stream.next().await {
///     println!("{}: {} comments", page.display_name, page.comments.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    files: Vec<SourceFile>,
    config: &ExtractionConfig,
) -> Result<PageStream, ExtractError> {
    let extractor = build_extractor(files.len(), config)?;
    info!("Starting streaming extraction of {} file(s)", files.len());
    Ok(stream_batch(Arc::new(extractor), files))
}

/// Drive an already-built extractor over `files` as a stream.
pub fn stream_batch(extractor: Arc<BatchExtractor>, files: Vec<SourceFile>) -> PageStream {
    let total = files.len();
    let s = stream::iter(files.into_iter().enumerate())
        .flat_map(move |(idx, file)| file_stream(Arc::clone(&extractor), file, idx + 1, total));

    Box::pin(s)
}

/// Rasterise one file, then yield its pages one model call at a time.
fn file_stream(
    extractor: Arc<BatchExtractor>,
    file: SourceFile,
    file_index: usize,
    total_files: usize,
) -> impl Stream<Item = PageResult> + Send {
    stream::once(async move {
        let rasterized = extractor.rasterize_file(&file, file_index, total_files).await;
        (extractor, rasterized)
    })
    .flat_map(move |(extractor, rasterized)| {
        let (pages, count) = match rasterized {
            RasterizedFile::Degraded(result) => (stream::iter(vec![*result]).left_stream(), 1),
            RasterizedFile::Pages(pages) => {
                let count = pages.len();
                let worker = Arc::clone(&extractor);
                let results = stream::iter(pages).then(move |page| {
                    let worker = Arc::clone(&worker);
                    async move { worker.process_page(page).await }
                });
                (results.right_stream(), count)
            }
        };

        let done = stream::once(async move {
            extractor.finish_file(file_index, total_files, count);
            None
        });
        pages.map(Some).chain(done).filter_map(future::ready)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FileError, InvocationError};
    use crate::pipeline::invoke::ModelInvoker;
    use crate::pipeline::rasterize::{passthrough, PageImage, PageRasterizer};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct EchoInvoker;

    #[async_trait]
    impl ModelInvoker for EchoInvoker {
        async fn invoke(&self, page: &PageImage) -> Result<String, InvocationError> {
            Ok(format!(r#"{{"comments":[{{"text":"{}"}}]}}"#, page.display_name()))
        }
    }

    struct TwoPagePdfs;

    #[async_trait]
    impl PageRasterizer for TwoPagePdfs {
        async fn rasterize(&self, source: &SourceFile) -> Result<Vec<PageImage>, FileError> {
            if source.name().starts_with("bad") {
                Err(FileError::CorruptDocument { detail: "truncated".into() })
            } else if source.name().ends_with(".pdf") {
                Ok(vec![
                    PageImage { page: Some(1), ..passthrough(source) },
                    PageImage { page: Some(2), ..passthrough(source) },
                ])
            } else {
                Ok(vec![passthrough(source)])
            }
        }
    }

    #[tokio::test]
    async fn stream_yields_pages_in_batch_order() {
        let extractor = Arc::new(BatchExtractor::new(Arc::new(EchoInvoker), Arc::new(TwoPagePdfs)));
        let files = vec![
            SourceFile::new("a.pdf", "application/pdf", b"%PDF".to_vec()),
            SourceFile::new("b.png", "image/png", b"png".to_vec()),
        ];

        let pages: Vec<PageResult> = stream_batch(extractor, files).collect().await;
        let texts: Vec<_> = pages.iter().map(|p| p.comments[0].text.as_str()).collect();
        assert_eq!(texts, ["a.pdf (Page 1)", "a.pdf (Page 2)", "b.png"]);
    }

    /// Holds page 2 until the test releases it.
    struct GatedInvoker(Arc<Notify>);

    #[async_trait]
    impl ModelInvoker for GatedInvoker {
        async fn invoke(&self, page: &PageImage) -> Result<String, InvocationError> {
            if page.page == Some(2) {
                self.0.notified().await;
            }
            Ok(r#"{"comments":[]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn pdf_pages_arrive_before_the_document_finishes() {
        let gate = Arc::new(Notify::new());
        let extractor = Arc::new(BatchExtractor::new(
            Arc::new(GatedInvoker(Arc::clone(&gate))),
            Arc::new(TwoPagePdfs),
        ));
        let files = vec![SourceFile::new("a.pdf", "application/pdf", b"%PDF".to_vec())];
        let mut pages = stream_batch(extractor, files);

        let first = tokio::time::timeout(Duration::from_secs(5), pages.next())
            .await
            .expect("page 1 was held back by page 2")
            .unwrap();
        assert_eq!(first.page, Some(1));

        gate.notify_one();
        assert_eq!(pages.next().await.unwrap().page, Some(2));
        assert!(pages.next().await.is_none());
    }

    #[tokio::test]
    async fn degraded_file_is_a_single_item() {
        let extractor = Arc::new(BatchExtractor::new(Arc::new(EchoInvoker), Arc::new(TwoPagePdfs)));
        let files = vec![
            SourceFile::new("bad.pdf", "application/pdf", b"%PDF".to_vec()),
            SourceFile::new("b.png", "image/png", b"png".to_vec()),
        ];

        let pages: Vec<PageResult> = stream_batch(extractor, files).collect().await;
        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_degraded());
        assert!(!pages[1].is_degraded());
    }

    #[tokio::test]
    async fn stream_rejects_empty_batch() {
        let config = ExtractionConfig::builder().api_key("k").build().unwrap();
        assert!(matches!(
            extract_stream(Vec::new(), &config).await,
            Err(ExtractError::EmptyBatch)
        ));
    }
}
