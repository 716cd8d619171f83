//! # comment-extract
//!
//! Extract structured user comments (username, text, timestamp, likes) from
//! social-media screenshots and PDF exports using a vision language model.
//!
//! ## Why this crate?
//!
//! Comment threads are usually shared as screenshots or "print to PDF"
//! exports, not as data. OCR gets the characters but loses which line is a
//! username, which is a like count and where one comment ends. Here each
//! screenshot (or each rendered PDF page) goes to a vision model with a fixed
//! instruction, and whatever comes back, clean JSON or chatty prose, is
//! normalised into comment records. A batch always yields one result per
//! page: failures degrade that page instead of aborting the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files (images / PDFs)
//!  │
//!  ├─ 1. Input      path, URL or uploaded bytes → SourceFile
//!  ├─ 2. Rasterise  images pass through; PDF pages via pdfium at ≥ 2×
//!  ├─ 3. Invoke     one model call per page (Gemini REST or edgequake-llm)
//!  ├─ 4. Normalise  fenced JSON → brace span → whole text → label scrape → raw text
//!  └─ 5. Output     ordered page results + stats, CSV / JSON export
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use comment_extract::{extract_paths, export, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let batch = extract_paths(&["thread.png", "export.pdf"], &config).await?;
//!     print!("{}", export::to_csv(&batch)?);
//!     eprintln!("{} comments, {} degraded pages",
//!         batch.stats.total_comments,
//!         batch.stats.degraded_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `comment-extract` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | Enables [`server`], the axum upload service |
//!
//! Disable both when using only the library:
//! ```toml
//! comment-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ExtractError, FileError, InvocationError};
pub use export::ExportFormat;
pub use extract::{extract_batch, extract_paths, extract_sync, extract_to_file};
pub use output::{BatchResult, BatchStats, Comment, FlatCommentRecord, PageResult};
pub use pipeline::batch::BatchExtractor;
pub use pipeline::input::{MediaKind, SourceFile};
pub use pipeline::invoke::{GeminiInvoker, ModelInvoker, ProviderInvoker};
pub use pipeline::normalize::{normalize_response, NormalizeStrategy, Normalized};
pub use pipeline::rasterize::{PageImage, PageRasterizer, PdfiumRasterizer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, PageStream};
