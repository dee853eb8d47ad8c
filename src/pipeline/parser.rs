//! Vision-model document parser for stage 1.
//!
//! Every supported format is first reduced to a list of page inputs, either
//! an image (PDF pages, scanned photos) or text (Office and plain-text
//! formats). Each page is then sent to the model with the parsing
//! instruction, up to `page_concurrency` pages at a time, and the cleaned
//! replies are reassembled in page order.

use super::{encode, llm, office, postprocess, render, DocumentParser, ParsedPage};
use crate::config::PipelineConfig;
use crate::error::FileError;
use crate::prompts::{text_page_message, DEFAULT_PARSING_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// What gets sent to the model for one page.
#[derive(Debug, Clone)]
enum PageInput {
    Image(ImageData),
    Text(String),
}

/// [`DocumentParser`] backed by a multimodal LLM provider.
pub struct VisionDocumentParser {
    provider: Arc<dyn LLMProvider>,
    instruction: String,
    settings: llm::CallSettings,
    dpi: u32,
    max_rendered_pixels: u32,
    page_concurrency: usize,
}

impl VisionDocumentParser {
    /// Parser with default instruction, rendering and call settings.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self::from_config(provider, &PipelineConfig::default())
    }

    /// Parser using the prompt, rendering and model settings of `config`.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            instruction: config
                .parsing_instruction
                .clone()
                .unwrap_or_else(|| DEFAULT_PARSING_INSTRUCTION.to_string()),
            settings: llm::CallSettings::from(config),
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            page_concurrency: config.page_concurrency.max(1),
        }
    }

    async fn parse_page(&self, label: &str, input: PageInput) -> Result<String, FileError> {
        let user = match input {
            PageInput::Image(image) => ChatMessage::user_with_images("", vec![image]),
            PageInput::Text(text) if text.trim().is_empty() => return Ok(String::new()),
            PageInput::Text(text) => ChatMessage::user(text_page_message(&text)),
        };
        let messages = vec![ChatMessage::system(self.instruction.as_str()), user];

        let reply = llm::complete_with_retry(&self.provider, label, &messages, &self.settings).await?;
        Ok(postprocess::clean_markdown(&reply))
    }
}

#[async_trait]
impl DocumentParser for VisionDocumentParser {
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedPage>, FileError> {
        let inputs = load_pages(path, self.dpi, self.max_rendered_pixels).await?;
        let total = inputs.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Parsing {} ({} pages)", name, total);

        let mut results: Vec<(usize, Result<String, FileError>)> =
            stream::iter(inputs.into_iter().enumerate().map(|(idx, input)| {
                let label = format!("{} page {}/{}", name, idx + 1, total);
                async move { (idx, self.parse_page(&label, input).await) }
            }))
            .buffer_unordered(self.page_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);

        let mut pages = Vec::with_capacity(total);
        for (idx, result) in results {
            let markdown = result?;
            debug!("{}: page {} → {} chars", name, idx + 1, markdown.len());
            pages.push(ParsedPage {
                page_num: idx + 1,
                markdown,
            });
        }
        Ok(pages)
    }
}

/// Reduce a document to page inputs according to its extension.
async fn load_pages(path: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<PageInput>, FileError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let images = render::render_pages(path, dpi, max_pixels).await?;
            images
                .iter()
                .enumerate()
                .map(|(idx, img)| {
                    encode::encode_page(img)
                        .map(PageInput::Image)
                        .map_err(|e| FileError::RenderFailed {
                            page: idx + 1,
                            detail: format!("Image encoding failed: {e}"),
                        })
                })
                .collect()
        }
        "png" | "jpg" | "jpeg" => {
            let bytes = read_bytes(path).await?;
            Ok(vec![PageInput::Image(encode::encode_image_file(&bytes)?)])
        }
        "docx" => {
            let bytes = read_bytes(path).await?;
            let text = blocking(move || office::docx_text(&bytes)).await?;
            Ok(vec![PageInput::Text(text)])
        }
        "pptx" => {
            let bytes = read_bytes(path).await?;
            let slides = blocking(move || office::pptx_slides(&bytes)).await?;
            Ok(slides.into_iter().map(PageInput::Text).collect())
        }
        "txt" | "csv" | "json" | "html" | "xml" => {
            let bytes = read_bytes(path).await?;
            let text = String::from_utf8(bytes).map_err(|e| FileError::Unreadable {
                detail: format!("not valid UTF-8: {e}"),
            })?;
            if text.trim().is_empty() {
                return Err(FileError::Unreadable {
                    detail: "document is empty".to_string(),
                });
            }
            Ok(vec![PageInput::Text(text)])
        }
        other => Err(FileError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>, FileError> {
    tokio::fs::read(path).await.map_err(|e| FileError::io(path, e))
}

/// Run blocking archive/XML work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, FileError>
where
    F: FnOnce() -> Result<T, FileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FileError::Unreadable {
            detail: format!("extraction task panicked: {e}"),
        })?
}
