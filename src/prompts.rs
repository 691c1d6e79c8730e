//! System prompts and notification templates.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the default behaviour (e.g.
//!    tweaking the minimum questions per page) requires editing exactly one
//!    place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real provider, making prompt regressions easy to
//!    catch.
//!
//! Callers can override the generation prompt via
//! [`crate::config::PipelineConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for turning a batch of document pages into
/// multiple-choice questions.
///
/// Used when `PipelineConfig::system_prompt` is `None`. The model receives
/// the batch as a JSON array of page texts and must answer with a JSON array
/// of question objects — nothing else — so the response parses without
/// fence-stripping heuristics.
pub const QUIZ_SYSTEM_PROMPT: &str = r#"You are a precise and reliable quiz generation assistant for educational and professional content.

Your task is to generate multiple-choice questions (MCQs) based strictly on the provided text content. Each item in the input list represents one page of a document (e.g., a government rulebook, policy, or training manual).

Rules:
1. Do NOT hallucinate or infer information not explicitly stated in the text.
2. Return an empty list for pages that are not relevant to quiz generation (preliminary pages, table of contents, index, and similar).
3. Focus on important facts, definitions, processes, or key ideas.
4. Avoid repeating the same question across pages.
5. Each question must:
   - Have exactly 4 options.
   - Have one correct answer, given as the literal text of that option.
   - Be self-contained (understandable without context from other pages).
6. If a page holds meaningful content, generate at least 5 questions for it.

Output format:
Return ONLY a JSON array of question objects, with no commentary and no code fences:

[
  {
    "question": "string",
    "options": ["string", "string", "string", "string"],
    "answer": "string (must equal one of options)",
    "explanation": "string briefly explaining why the answer is correct"
  }
]"#;

/// System prompt for the forced-OCR transcription pass.
///
/// One rasterised page image per call; the model acts as a plain OCR engine
/// and must not summarise, reflow, or editorialise.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the page image, in natural reading order, as plain text.

- Output only the transcribed text, with no commentary.
- Preserve line breaks where they matter (headings, list items, table rows).
- If the page contains no readable text, output nothing."#;

/// Subject line for the completion notification.
pub const NOTIFICATION_SUBJECT: &str = "Your Quiz is Ready";

/// Build the HTML body for the "quiz is ready" notification email.
///
/// `location` is the publicly resolvable URI of the uploaded quiz PDF.
pub fn notification_body(location: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width:500px; margin:32px auto; border-radius:12px; border:1px solid #e0e0e0;">
  <div style="background: #38a169; color: #fff; padding: 32px 20px 16px 20px; border-radius:12px 12px 0 0;">
    <h2 style="margin: 0; font-size: 2rem; font-weight: 700;">Your Quiz is Ready!</h2>
  </div>
  <div style="padding: 24px 20px 32px 20px; background: #f9fafb; border-radius:0 0 12px 12px;">
    <p style="font-size: 1.1rem; margin-bottom: 24px;">
      Your personalized quiz PDF has been generated and is ready to download.
    </p>
    <a href="{location}"
       style="display: inline-block; background: #38a169; color: #fff; font-weight: bold; padding: 14px 32px; border-radius: 6px; font-size: 1.1rem; text-decoration:none;">
      Download Your Quiz
    </a>
  </div>
</div>"#
    )
}
