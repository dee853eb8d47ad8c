//! External collaborators of the parse and extract stages.
//!
//! The stages only see two traits:
//!
//! * [`DocumentParser`] — one document in, its pages as Markdown out (stage 1)
//! * [`TextExtractor`]  — one Markdown document in, one record out (stage 2)
//!
//! The crate ships a model-backed implementation of each
//! ([`parser::VisionDocumentParser`], [`extractor::LlmTextExtractor`]);
//! tests and embedders can inject their own through
//! [`crate::orchestrator::PipelineOrchestrator::new`].
//!
//! ## Data Flow
//!
//! ```text
//! parse:   render ──▶ encode ──▶ llm ──▶ postprocess
//!          (pdfium)   (base64)   (VLM)   (cleanup)
//!          office ───────────────▲
//!          (docx/pptx text)
//!
//! extract: llm ──▶ postprocess::strip_json_fences ──▶ record normalisation
//! ```

pub mod encode;
pub mod extractor;
pub mod llm;
pub mod office;
pub mod parser;
pub mod postprocess;
pub mod render;

use crate::error::FileError;
use crate::merge::ExtractedRecord;
use async_trait::async_trait;
use std::path::Path;

/// One page of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// 1-based page number.
    pub page_num: usize,
    pub markdown: String,
}

/// Stage 1 collaborator: OCR / layout extraction of one document.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the document at `path` into pages, in page order.
    ///
    /// An empty `Vec` means the document had no pages; the stage still
    /// writes a parsed file containing only the title header.
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, FileError>;
}

/// Stage 2 collaborator: field extraction from one Markdown document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract a flat JSON object of deed fields from `markdown`.
    async fn extract(&self, markdown: &str) -> Result<ExtractedRecord, FileError>;
}
