//! Pipeline stages for comment extraction.
//!
//! Each submodule implements one transformation step, so each can be tested
//! alone and the rendering or model backend swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ invoke ──▶ normalize
//! (file)    (pages)      (raw text)  (comments)
//!              └── encode (PNG / base64)
//! ```
//!
//! 1. [`input`]    : resolve a path or URL into an in-memory [`input::SourceFile`]
//! 2. [`rasterize`]: screenshots pass through; PDFs render page by page in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]   : PNG-encode rendered pages, base64 for request bodies
//! 4. [`invoke`]   : one model call per page; the only stage with network I/O
//! 5. [`normalize`]: recover comments from whatever text came back
//!
//! [`batch`] strings the stages together and owns the failure-isolation
//! rules.

pub mod batch;
pub mod encode;
pub mod input;
pub mod invoke;
pub mod normalize;
pub mod rasterize;
