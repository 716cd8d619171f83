//! Progress-callback trait for per-file and per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the batch advances. The CLI uses it to drive a progress bar; a
//! server could forward the same events over a channel.
//!
//! # Example
//!
//! ```rust
//! use comment_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CommentCounter {
//!     seen: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CommentCounter {
//!     fn on_page_complete(&self, display_name: &str, comment_count: usize) {
//!         let total = self.seen.fetch_add(comment_count, Ordering::SeqCst) + comment_count;
//!         eprintln!("{display_name}: {comment_count} comments ({total} so far)");
//!     }
//! }
//!
//! let counter = Arc::new(CommentCounter { seen: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes files and pages.
///
/// Files are processed one at a time, so events arrive in batch order.
/// Implementations must still be `Send + Sync` because the batch future may
/// move between runtime threads. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is rasterised.
    ///
    /// # Arguments
    /// * `file_index` : 1-indexed position in the batch
    /// * `total_files`: number of files in the batch
    /// * `name`       : the file's declared name
    fn on_file_start(&self, file_index: usize, total_files: usize, name: &str) {
        let _ = (file_index, total_files, name);
    }

    /// Called after a page (or whole image) produced a normalised result.
    fn on_page_complete(&self, display_name: &str, comment_count: usize) {
        let _ = (display_name, comment_count);
    }

    /// Called when a page, or a whole file, degraded to an error result.
    fn on_page_error(&self, display_name: &str, error: &str) {
        let _ = (display_name, error);
    }

    /// Called after every page of a file has a result (normalised or degraded).
    fn on_file_complete(&self, file_index: usize, total_files: usize, page_count: usize) {
        let _ = (file_index, total_files, page_count);
    }

    /// Called once after every file has been attempted.
    ///
    /// # Arguments
    /// * `total_pages`   : page results produced
    /// * `degraded_pages`: results standing in for a failure
    fn on_batch_complete(&self, total_pages: usize, degraded_pages: usize) {
        let _ = (total_pages, degraded_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        files: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        comments: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_file_start(&self, _file_index: usize, _total_files: usize, _name: &str) {
            self.files.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _display_name: &str, comment_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.comments.fetch_add(comment_count, Ordering::SeqCst);
        }

        fn on_page_error(&self, _display_name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, "a.png");
        cb.on_page_complete("a.png", 3);
        cb.on_page_error("b.pdf", "rasterisation unavailable");
        cb.on_file_complete(2, 2, 1);
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_file_start(1, 2, "thread.png");
        tracker.on_page_complete("thread.png", 4);
        tracker.on_file_start(2, 2, "export.pdf");
        tracker.on_page_complete("export.pdf (Page 1)", 2);
        tracker.on_page_error("export.pdf (Page 2)", "HTTP 503");

        assert_eq!(tracker.files.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.comments.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_page_complete("x.jpg", 0);
    }
}
