//! Quiz rendering: serialise the ordered question collection into a
//! paginated PDF.
//!
//! Rendering is split in two so the interesting part stays testable without
//! parsing PDF bytes:
//!
//! 1. [`layout`] — pure text layout. Numbered header, question text, four
//!    lettered options (fixed mapping 0→A … 3→D), the literal answer text,
//!    and an explanation line, in that fixed order, wrapped and paginated
//!    against a fixed lines-per-page budget. Deterministic: the same
//!    collection always produces the identical layout.
//!
//! 2. [`render_pdf`] — printpdf serialisation of that layout with builtin
//!    Helvetica fonts. Builtin fonts only cover the Latin-1 repertoire, so
//!    characters outside it are substituted with `?` instead of aborting —
//!    a readable quiz with a few replacement marks beats no quiz at all.

use crate::error::QuizError;
use crate::quiz::QuizQuestion;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::io::BufWriter;
use tracing::{debug, info};

/// Fixed option lettering: option index 0 renders as (A), 3 as (D).
pub const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Wrap column for body text, tuned for 11 pt Helvetica on A4 with 10 mm
/// margins.
const WRAP_COLS: usize = 90;

/// Text lines that fit one A4 page at the line pitch used below.
const LINES_PER_PAGE: usize = 54;

// A4 geometry in millimetres.
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
const LINE_PITCH_MM: f32 = 4.8;

/// Visual weight of one laid-out line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// "Question N:" header — bold, larger.
    Header,
    /// The question text itself — bold.
    Question,
    /// Options, answer, explanation — regular.
    Body,
    /// Spacer between questions.
    Blank,
}

/// One laid-out line of the output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLine {
    pub text: String,
    pub style: LineStyle,
}

/// Lay the question collection out into pages of wrapped lines.
///
/// Pure and deterministic; pagination happens here so the printpdf stage
/// below is a dumb line printer.
pub fn layout(questions: &[QuizQuestion]) -> Vec<Vec<LayoutLine>> {
    let mut pages: Vec<Vec<LayoutLine>> = Vec::new();
    let mut current: Vec<LayoutLine> = Vec::new();

    let mut push_line = |pages: &mut Vec<Vec<LayoutLine>>, current: &mut Vec<LayoutLine>, line: LayoutLine| {
        if current.len() >= LINES_PER_PAGE {
            pages.push(std::mem::take(current));
        }
        current.push(line);
    };

    for (number, question) in questions.iter().enumerate() {
        let mut block: Vec<LayoutLine> = Vec::new();

        block.push(LayoutLine {
            text: format!("Question {}:", number + 1),
            style: LineStyle::Header,
        });
        for line in wrap_text(&sanitize(&question.question), WRAP_COLS) {
            block.push(LayoutLine {
                text: line,
                style: LineStyle::Question,
            });
        }
        for (i, option) in question.options.iter().enumerate() {
            let letter = OPTION_LETTERS.get(i).copied().unwrap_or('?');
            for line in wrap_text(&format!("({letter}) {}", sanitize(option)), WRAP_COLS) {
                block.push(LayoutLine {
                    text: line,
                    style: LineStyle::Body,
                });
            }
        }
        for line in wrap_text(&format!("Answer: {}", sanitize(&question.answer)), WRAP_COLS) {
            block.push(LayoutLine {
                text: line,
                style: LineStyle::Body,
            });
        }
        for line in wrap_text(
            &format!("Explanation: {}", sanitize(&question.explanation)),
            WRAP_COLS,
        ) {
            block.push(LayoutLine {
                text: line,
                style: LineStyle::Body,
            });
        }
        block.push(LayoutLine {
            text: String::new(),
            style: LineStyle::Blank,
        });

        for line in block {
            push_line(&mut pages, &mut current, line);
        }
    }

    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

/// Serialise the question collection into PDF bytes.
///
/// Never fails on well-formed input: the layout is plain text and every
/// character has already been forced into the builtin-font repertoire.
pub fn render_pdf(questions: &[QuizQuestion]) -> Result<Vec<u8>, QuizError> {
    let pages = layout(questions);
    info!(
        "Rendering {} question(s) across {} page(s)",
        questions.len(),
        pages.len().max(1)
    );

    let (doc, first_page, first_layer) =
        PdfDocument::new("Quiz", Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| QuizError::Render {
            detail: format!("font: {e}"),
        })?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| QuizError::Render {
            detail: format!("font: {e}"),
        })?;

    let mut page_refs = vec![(first_page, first_layer)];
    for _ in 1..pages.len() {
        page_refs.push(doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1"));
    }

    for (page_lines, (page_idx, layer_idx)) in pages.iter().zip(page_refs) {
        let layer = doc.get_page(page_idx).get_layer(layer_idx);
        let mut y = Mm(PAGE_HEIGHT_MM - MARGIN_MM - 7.0);

        for line in page_lines {
            match line.style {
                LineStyle::Header => {
                    layer.use_text(&line.text, 13.0, Mm(MARGIN_MM), y, &bold)
                }
                LineStyle::Question => {
                    layer.use_text(&line.text, 11.0, Mm(MARGIN_MM), y, &bold)
                }
                LineStyle::Body => {
                    layer.use_text(&line.text, 11.0, Mm(MARGIN_MM), y, &regular)
                }
                LineStyle::Blank => {}
            }
            y -= Mm(LINE_PITCH_MM);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| QuizError::Render {
        detail: format!("save: {e}"),
    })?;
    let bytes = buf.into_inner().map_err(|e| QuizError::Render {
        detail: format!("buffer: {e}"),
    })?;

    debug!("Rendered quiz PDF: {} bytes", bytes.len());
    Ok(bytes)
}

/// Replace characters the builtin fonts cannot represent with `?`.
///
/// Helvetica as a builtin covers Latin-1 only; substituting keeps rendering
/// total instead of erroring mid-document on one stray glyph.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c == '\n' || c == '\t' {
                ' '
            } else if (c as u32) <= 0xFF {
                c
            } else {
                '?'
            }
        })
        .collect()
}

/// Greedy word wrap at `cols` characters.
fn wrap_text(text: &str, cols: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > cols {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str) -> QuizQuestion {
        QuizQuestion {
            question: text.to_string(),
            options: vec![
                "First".into(),
                "Second".into(),
                "Third".into(),
                "Fourth".into(),
            ],
            answer: "Second".into(),
            explanation: "Because the text says so.".into(),
        }
    }

    #[test]
    fn layout_is_idempotent() {
        let questions: Vec<QuizQuestion> =
            (0..20).map(|i| question(&format!("Question text {i}?"))).collect();
        assert_eq!(layout(&questions), layout(&questions));
    }

    #[test]
    fn options_use_fixed_letter_mapping() {
        let pages = layout(&[question("q?")]);
        let flat: Vec<&str> = pages[0].iter().map(|l| l.text.as_str()).collect();
        assert!(flat.contains(&"(A) First"));
        assert!(flat.contains(&"(B) Second"));
        assert!(flat.contains(&"(C) Third"));
        assert!(flat.contains(&"(D) Fourth"));
    }

    #[test]
    fn answer_and_explanation_render_literally_in_order() {
        let pages = layout(&[question("q?")]);
        let flat: Vec<&str> = pages[0].iter().map(|l| l.text.as_str()).collect();
        let answer_pos = flat.iter().position(|l| *l == "Answer: Second").unwrap();
        let expl_pos = flat
            .iter()
            .position(|l| l.starts_with("Explanation:"))
            .unwrap();
        assert!(answer_pos < expl_pos);

        let header_pos = flat.iter().position(|l| *l == "Question 1:").unwrap();
        let option_pos = flat.iter().position(|l| *l == "(A) First").unwrap();
        assert!(header_pos < option_pos && option_pos < answer_pos);
    }

    #[test]
    fn long_collections_paginate() {
        let questions: Vec<QuizQuestion> =
            (0..40).map(|i| question(&format!("Question {i}?"))).collect();
        let pages = layout(&questions);
        assert!(pages.len() > 1, "40 questions cannot fit one page");
        assert!(pages.iter().all(|p| p.len() <= LINES_PER_PAGE));
    }

    #[test]
    fn unrepresentable_characters_are_substituted() {
        assert_eq!(sanitize("a → b 日本"), "a ? b ??");
        assert_eq!(sanitize("café"), "café");
        assert_eq!(sanitize("tab\there"), "tab here");
    }

    #[test]
    fn wrap_respects_column_budget() {
        let text = "word ".repeat(50);
        for line in wrap_text(&text, 20) {
            assert!(line.len() <= 20, "line too long: {line:?}");
        }
    }

    #[test]
    fn render_produces_a_pdf() {
        let bytes = render_pdf(&[question("What does the rulebook say?")]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn render_of_empty_collection_is_still_a_pdf() {
        let bytes = render_pdf(&[]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
