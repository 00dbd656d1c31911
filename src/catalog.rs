//! Work and chapter records as delivered by the data layer.
//!
//! Field names follow the backend's table columns so rows deserialize as-is.
//! [`Catalog`] is a read-only, in-memory stand-in for the data layer: it loads
//! a JSON export and answers the same "filter, then order" queries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ContentFormat {
    Pdf,
    #[default]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum WorkType {
    Novel,
    Story,
    Poem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub work_type: WorkType,
    #[serde(default)]
    pub format: ContentFormat,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub word_count: Option<u64>,
    /// RFC 3339 timestamp; compared lexically.
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub work_id: String,
    pub chapter_number: i32,
    pub title: String,
    #[serde(default)]
    pub format: ContentFormat,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub word_count: Option<u64>,
}

impl Work {
    pub fn is_multi_chapter(&self) -> bool {
        self.work_type == WorkType::Novel
    }
}

/// Pinned works first, then newest first.
pub fn sort_for_listing(works: &mut [Work]) {
    works.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Ascending chapter number; equal numbers keep their incoming order.
pub fn order_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by_key(|chapter| chapter.chapter_number);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub works: Vec<Work>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&data)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        info!(
            path = %path.display(),
            works = catalog.works.len(),
            chapters = catalog.chapters.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    pub fn works(&self, work_type: Option<WorkType>) -> Vec<Work> {
        let mut works: Vec<Work> = self
            .works
            .iter()
            .filter(|work| work_type.is_none_or(|wanted| work.work_type == wanted))
            .cloned()
            .collect();
        sort_for_listing(&mut works);
        works
    }

    pub fn work(&self, id: &str) -> Option<&Work> {
        self.works.iter().find(|work| work.id == id)
    }

    pub fn chapters(&self, work_id: &str) -> Vec<Chapter> {
        let mut chapters: Vec<Chapter> = self
            .chapters
            .iter()
            .filter(|chapter| chapter.work_id == work_id)
            .cloned()
            .collect();
        order_chapters(&mut chapters);
        chapters
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn chapter(id: &str, work_id: &str, number: i32) -> Chapter {
        Chapter {
            id: id.to_string(),
            work_id: work_id.to_string(),
            chapter_number: number,
            title: format!("Chapter {number}"),
            format: ContentFormat::Text,
            content: Some(format!("Text of chapter {number}.")),
            pdf_url: None,
            like_count: 0,
            view_count: 0,
            word_count: None,
        }
    }

    const SAMPLE: &str = r#"{
        "works": [
            {"id": "w1", "title": "Old Poem", "type": "poem", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "w2", "title": "Pinned Story", "type": "story", "is_pinned": true, "created_at": "2023-05-01T00:00:00Z"},
            {"id": "w3", "title": "New Novel", "type": "novel", "format": "pdf", "pdf_url": "https://files.example.org/n.pdf", "like_count": 5, "created_at": "2025-02-01T00:00:00Z"}
        ],
        "chapters": [
            {"id": "c3", "work_id": "w3", "chapter_number": 3, "title": "Three"},
            {"id": "c1", "work_id": "w3", "chapter_number": 1, "title": "One", "view_count": 3},
            {"id": "c2", "work_id": "w3", "chapter_number": 2, "title": "Two"},
            {"id": "x1", "work_id": "w9", "chapter_number": 1, "title": "Elsewhere"}
        ]
    }"#;

    #[test]
    fn listing_puts_pinned_first_then_newest() {
        let catalog: Catalog = serde_json::from_str(SAMPLE).expect("sample parses");
        let ids: Vec<String> = catalog.works(None).into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["w2", "w3", "w1"]);
        let poems = catalog.works(Some(WorkType::Poem));
        assert_eq!(poems.len(), 1);
        assert_eq!(poems[0].format, ContentFormat::Text);
    }

    #[test]
    fn chapters_are_filtered_and_ordered() {
        let catalog: Catalog = serde_json::from_str(SAMPLE).expect("sample parses");
        let ids: Vec<String> = catalog.chapters("w3").into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert!(catalog.work("w3").expect("w3").is_multi_chapter());
        assert_eq!(catalog.work("w3").expect("w3").like_count, 5);
    }

    #[test]
    fn chapter_number_ties_keep_insertion_order() {
        let mut chapters = vec![chapter("b", "w", 2), chapter("a", "w", 1), chapter("b2", "w", 2)];
        order_chapters(&mut chapters);
        let ids: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "b2"]);
    }
}
