//! Pagination utilities for text rendered as a paged document.
//!
//! Page breaks depend only on the font size, so a document keeps the same page
//! count when its container is resized. Width only affects how each page's
//! paragraphs are wrapped into lines.

/// Minimum allowed font size (points).
pub const MIN_FONT_SIZE: u32 = 12;
/// Maximum allowed font size (points).
pub const MAX_FONT_SIZE: u32 = 36;

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f32 = 0.55;

/// Characters that fit on one page at `font_size`.
pub fn page_budget(font_size: u32) -> usize {
    let scale = 16.0 / font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE) as f32;
    let columns = (80.0 * scale).round().clamp(30.0, 120.0) as usize;
    let rows = (28.0 * scale).round().clamp(10.0, 80.0) as usize;
    columns.saturating_mul(rows).max(1)
}

/// Split text into pages of at most [`page_budget`] characters, keeping
/// paragraphs whole where they fit. Always returns at least one page.
pub fn paginate(text: &str, font_size: u32) -> Vec<String> {
    let budget = page_budget(font_size);
    let mut pages = Vec::new();
    let mut page = String::new();
    let mut page_len = 0usize;

    for paragraph in split_paragraphs(text) {
        for block in fit_paragraph(&paragraph, budget) {
            let block_len = block.chars().count();
            if page_len > 0 && page_len + 2 + block_len > budget {
                pages.push(std::mem::take(&mut page));
                page_len = 0;
            }
            if page_len > 0 {
                page.push_str("\n\n");
                page_len += 2;
            }
            page.push_str(&block);
            page_len += block_len;
        }
    }

    if page_len > 0 || pages.is_empty() {
        pages.push(page);
    }
    pages
}

/// Break a paragraph longer than `budget` at word boundaries.
fn fit_paragraph(paragraph: &str, budget: usize) -> Vec<String> {
    if paragraph.chars().count() <= budget {
        return vec![paragraph.to_string()];
    }
    let mut blocks = Vec::new();
    let mut block = String::new();
    let mut block_len = 0usize;
    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();
        if block_len > 0 && block_len + 1 + word_len > budget {
            blocks.push(std::mem::take(&mut block));
            block_len = 0;
        }
        if block_len > 0 {
            block.push(' ');
            block_len += 1;
        }
        block.push_str(word);
        block_len += word_len;
    }
    if block_len > 0 {
        blocks.push(block);
    }
    blocks
}

/// How many characters fit on one line at `width` logical units.
pub fn chars_per_line(width: f32, font_size: u32) -> usize {
    let font = font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE) as f32;
    let width = if width.is_finite() { width.max(0.0) } else { 0.0 };
    ((width / (font * GLYPH_WIDTH_RATIO)).floor() as usize).max(8)
}

/// Greedy word wrap of one page. Blank lines between paragraphs are kept.
pub fn wrap_page(page: &str, width: f32, font_size: u32) -> Vec<String> {
    let limit = chars_per_line(width, font_size);
    let mut lines = Vec::new();

    for raw_line in page.lines() {
        if raw_line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in raw_line.split_whitespace() {
            let word_len = word.chars().count();
            if line_len > 0 && line_len + 1 + word_len > limit {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.push_str(word);
            line_len += word_len;
        }
        lines.push(line);
    }

    lines
}

/// Paragraphs are runs of non-blank lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    // A trailing blank line flushes the last paragraph.
    for line in text.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line.trim_end());
        }
    }
    paragraphs
}
