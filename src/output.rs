//! Result types produced by a batch extraction.
//!
//! The shapes here are the durable output of the pipeline: they are returned
//! by the library entry points, serialised by the HTTP surface and flattened
//! by [`crate::export`]. JSON field names are camelCase because the primary
//! consumer is a browser client.

use crate::error::FileError;
use crate::pipeline::normalize::NormalizeStrategy;
use serde::{Deserialize, Serialize};

/// One comment recovered from a screenshot or PDF page.
///
/// `text` is always present. Optional fields that the model did not report
/// are omitted from serialised output rather than emitted as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
}

impl Comment {
    /// A comment carrying only its text.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Result for one page image: a whole screenshot, or one page of a PDF.
///
/// Always produced, even when extraction failed. A degraded result has no
/// comments, a `raw_response` describing the failure and `error` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// File name, annotated with the page number for multi-page sources.
    pub display_name: String,

    /// Comments in the order the normaliser recovered them.
    pub comments: Vec<Comment>,

    /// Raw model text, or `"Error: …"` for degraded results.
    pub raw_response: String,

    /// Name of the source file this page came from.
    pub source_name: String,

    /// 1-indexed page number; `None` for single-image sources and for
    /// results that stand in for a whole failed file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,

    /// Which normalisation rung produced `comments`. `None` when degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<NormalizeStrategy>,

    /// Wall-clock time spent on this page (model call + normalisation).
    pub duration_ms: u64,

    /// Set when this result stands in for a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
}

impl PageResult {
    /// Build a degraded result that keeps the batch shape intact.
    pub fn degraded(
        display_name: impl Into<String>,
        source_name: impl Into<String>,
        page: Option<usize>,
        error: FileError,
        duration_ms: u64,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            comments: Vec::new(),
            raw_response: format!("Error: {error}"),
            source_name: source_name.into(),
            page,
            strategy: None,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Number of source files submitted.
    pub total_files: usize,
    /// Number of page results produced (degraded ones included).
    pub total_pages: usize,
    /// Page results that stand in for a failure.
    pub degraded_pages: usize,
    /// Page results whose comments came from the pattern scrape or the
    /// last-resort truncation rather than from JSON.
    pub fallback_pages: usize,
    /// Total comments across all pages.
    pub total_comments: usize,
    /// Wall-clock duration of the whole batch.
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Derive stats from finished page results.
    pub fn from_pages(total_files: usize, pages: &[PageResult], total_duration_ms: u64) -> Self {
        Self {
            total_files,
            total_pages: pages.len(),
            degraded_pages: pages.iter().filter(|p| p.is_degraded()).count(),
            fallback_pages: pages
                .iter()
                .filter(|p| p.strategy.is_some_and(|s| s.is_fallback()))
                .count(),
            total_comments: pages.iter().map(|p| p.comments.len()).sum(),
            total_duration_ms,
        }
    }
}

/// The ordered output of a batch: input-file order, then ascending page order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<PageResult>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PageResult> {
        self.results.iter()
    }

    /// Flatten into one record per comment, each carrying its page's
    /// display name. Degraded pages contribute no records.
    pub fn flatten(&self) -> Vec<FlatCommentRecord> {
        self.results
            .iter()
            .flat_map(|page| {
                page.comments.iter().map(move |c| FlatCommentRecord {
                    image_name: page.display_name.clone(),
                    username: c.username.clone(),
                    text: c.text.clone(),
                    timestamp: c.timestamp.clone(),
                    likes: c.likes.clone(),
                })
            })
            .collect()
    }
}

/// A comment enriched with the display name of the page it came from.
/// The unit written by the CSV exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCommentRecord {
    #[serde(rename = "Image Name")]
    pub image_name: String,
    #[serde(rename = "Username")]
    pub username: Option<String>,
    #[serde(rename = "Comment Text")]
    pub text: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "Likes")]
    pub likes: Option<String>,
}
