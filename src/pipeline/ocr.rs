//! Forced-OCR pass: rasterise every page and transcribe it with a vision
//! model.
//!
//! Used only when the direct text layer came back mostly blank (scanned
//! documents). Each page is rendered to a PNG via pdfium — inside
//! `spawn_blocking`, pdfium is not async-safe — then base64-encoded and sent
//! to the vision provider with a transcription-only prompt. PNG over JPEG
//! because lossless text crispness is what OCR accuracy lives on.
//!
//! A page whose transcription call fails yields an empty string at its
//! index: page indices must stay contiguous from 0, and a partial OCR
//! failure must never introduce silent gaps. All working buffers are
//! in-memory and dropped on every exit path.

use crate::config::PipelineConfig;
use crate::error::QuizError;
use crate::pipeline::generate::resolve_provider;
use crate::prompts::OCR_SYSTEM_PROMPT;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-extract the whole document through OCR: one transcription per page,
/// returned in page order.
pub async fn ocr_extract(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<String>, QuizError> {
    let provider = resolve_provider(config)?;

    let rendered = rasterize_pages(pdf_path, config.max_rendered_pixels).await?;
    let page_count = rendered.len();
    info!("OCR pass: rasterised {} page(s)", page_count);

    let encoded: Vec<(usize, ImageData)> = rendered
        .iter()
        .filter_map(|(idx, img)| match encode_page(img) {
            Ok(data) => Some((*idx, data)),
            Err(e) => {
                warn!("Failed to encode page {} for OCR: {}", idx + 1, e);
                None
            }
        })
        .collect();

    // Transcribe concurrently with the same fan-out as the generation pool;
    // collect into a dense, index-contiguous vec with empty strings where a
    // page could not be read.
    let transcribed: Vec<(usize, String)> = stream::iter(encoded.into_iter().map(|(idx, img)| {
        let provider = Arc::clone(&provider);
        async move {
            let text = transcribe_page(&provider, idx, img).await;
            (idx, text)
        }
    }))
    .buffer_unordered(config.workers)
    .collect()
    .await;

    let mut pages = vec![String::new(); page_count];
    for (idx, text) in transcribed {
        pages[idx] = text;
    }

    Ok(pages)
}

/// One vision call: page image in, plain transcription out.
///
/// Failure is absorbed into an empty page — the caller's contiguity
/// invariant matters more than one unreadable page.
async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    idx: usize,
    image_data: ImageData,
) -> String {
    let messages = vec![
        ChatMessage::system(OCR_SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image_data]),
    ];
    let options = CompletionOptions {
        temperature: Some(0.0),
        ..Default::default()
    };

    match provider.chat(&messages, Some(&options)).await {
        Ok(response) => {
            debug!(
                "OCR page {}: {} chars transcribed",
                idx + 1,
                response.content.len()
            );
            response.content
        }
        Err(e) => {
            warn!("OCR page {} failed, leaving blank: {}", idx + 1, e);
            String::new()
        }
    }
}

/// Rasterise every page of the PDF into images, capped at `max_pixels` on
/// the longest edge so oversized pages cannot exhaust memory.
async fn rasterize_pages(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, QuizError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || rasterize_pages_blocking(&path, max_pixels))
        .await
        .map_err(|e| QuizError::Internal(format!("Rasterisation task panicked: {e}")))?
}

fn rasterize_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, QuizError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| QuizError::Extraction {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| QuizError::Extraction {
                detail: format!("rasterisation failed for page {}: {e:?}", idx + 1),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rasterised page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}

/// Encode a rasterised page as a base64 PNG ready for the vision API.
fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded OCR page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encoded_page_is_png_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 48, Rgba([0, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // PNG magic
        assert_eq!(&decoded[..4], &[0x89, b'P', b'N', b'G']);
    }
}
