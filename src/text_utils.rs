//! Helpers for flowed text content: normalization, word counts and read-time.

use crate::config::{MAX_TEXT_FONT_SIZE, MIN_TEXT_FONT_SIZE};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// Punctuation-only tokens such as "—" or "***" are not words.
static RE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'’\-]*").unwrap());

/// NFC-normalize and unify line endings.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").nfc().collect()
}

/// One paragraph per line, the way text works are authored.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

pub fn word_count(text: &str) -> usize {
    RE_WORD.find_iter(text).count()
}

/// Whole minutes, never less than one.
pub fn estimate_read_minutes(word_count: u64, words_per_minute: u32) -> u64 {
    let wpm = u64::from(words_per_minute.max(1));
    word_count.div_ceil(wpm).max(1)
}

pub fn read_time_label(word_count: u64, words_per_minute: u32) -> String {
    format!(
        "{} min read",
        estimate_read_minutes(word_count, words_per_minute)
    )
}

pub fn clamp_font_size(size: u32) -> u32 {
    size.clamp(MIN_TEXT_FONT_SIZE, MAX_TEXT_FONT_SIZE)
}

/// A text work shown as one flowed block.
#[derive(Debug, Clone)]
pub struct FlowedText {
    text: String,
    font_size: u32,
    word_count: usize,
}

impl FlowedText {
    pub fn new(raw: &str, font_size: u32) -> Self {
        let text = normalize_text(raw);
        let word_count = word_count(&text);
        Self {
            text,
            font_size: clamp_font_size(font_size),
            word_count,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn paragraphs(&self) -> Vec<&str> {
        paragraphs(&self.text)
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = clamp_font_size(size);
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }
}
