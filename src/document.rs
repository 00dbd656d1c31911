//! Paginated documents and their rendering at the viewport width.
//!
//! A [`DocumentSource`] is whatever can parse a work's file: it reports a page
//! count once loaded and renders single pages at a requested width. A
//! [`DocumentView`] owns one source for as long as the reader has the work or
//! chapter open, and re-renders every page whenever the width changes.
//!
//! Load and render failures are kept in [`DocumentStatus::Failed`] so the page
//! around the document can show an inline message and carry on.

use crate::pagination;
use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, warn};
use ts_rs::TS;

pub trait DocumentSource {
    fn id(&self) -> &str;

    /// Parse the document, returning its total page count.
    fn load(&mut self) -> Result<usize>;

    fn render_page(&self, index: usize, width: f32) -> Result<RenderedPage>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn load(&mut self) -> Result<usize> {
        (**self).load()
    }

    fn render_page(&self, index: usize, width: f32) -> Result<RenderedPage> {
        (**self).render_page(index, width)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub index: usize,
    pub width: f32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentStatus {
    Loading,
    Ready { page_count: u32 },
    Failed { message: String },
}

pub struct DocumentView<S: DocumentSource> {
    source: S,
    status: DocumentStatus,
    page_count: usize,
    pages: Vec<RenderedPage>,
}

impl<S: DocumentSource> DocumentView<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            status: DocumentStatus::Loading,
            page_count: 0,
            pages: Vec::new(),
        }
    }

    /// Create and load in one go.
    pub fn open(source: S) -> Self {
        let mut view = Self::new(source);
        view.load();
        view
    }

    pub fn load(&mut self) -> &DocumentStatus {
        match self.source.load() {
            Ok(count) => {
                info!(document = self.source.id(), pages = count, "Document loaded");
                self.page_count = count;
                self.status = DocumentStatus::Ready {
                    page_count: u32::try_from(count).unwrap_or(u32::MAX),
                };
            }
            Err(err) => {
                warn!(document = self.source.id(), "Failed to load document: {err:#}");
                self.page_count = 0;
                self.pages.clear();
                self.status = DocumentStatus::Failed {
                    message: format!("Failed to load document: {err}"),
                };
            }
        }
        &self.status
    }

    pub fn id(&self) -> &str {
        self.source.id()
    }

    pub fn status(&self) -> &DocumentStatus {
        &self.status
    }

    /// Zero until the document has loaded.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    pub fn render_width(&self) -> Option<f32> {
        self.pages.first().map(|page| page.width)
    }

    /// Render every page at `width`. Returns the number of pages rendered;
    /// nothing is redone when the width is unchanged.
    pub fn layout(&mut self, width: f32) -> usize {
        if !matches!(self.status, DocumentStatus::Ready { .. }) {
            return 0;
        }
        if !width.is_finite() || width <= 0.0 {
            debug!(document = self.source.id(), width, "Skipping layout at unusable width");
            return 0;
        }
        if self.pages.len() == self.page_count && self.render_width() == Some(width) {
            return 0;
        }

        let mut pages = Vec::with_capacity(self.page_count);
        for index in 0..self.page_count {
            match self.source.render_page(index, width) {
                Ok(page) => pages.push(page),
                Err(err) => {
                    warn!(
                        document = self.source.id(),
                        page = index,
                        "Failed to render page: {err:#}"
                    );
                    self.status = DocumentStatus::Failed {
                        message: format!("Failed to render page {}: {err}", index + 1),
                    };
                    self.pages.clear();
                    return 0;
                }
            }
        }
        debug!(document = self.source.id(), width, pages = pages.len(), "Document laid out");
        self.pages = pages;
        self.pages.len()
    }
}

/// Plain text split into pages by font size.
pub struct TextPageSource {
    id: String,
    text: String,
    font_size: u32,
    pages: Option<Vec<String>>,
}

impl TextPageSource {
    pub fn new(id: impl Into<String>, text: impl Into<String>, font_size: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            font_size,
            pages: None,
        }
    }
}

impl DocumentSource for TextPageSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&mut self) -> Result<usize> {
        let pages = pagination::paginate(&self.text, self.font_size);
        let count = pages.len();
        self.pages = Some(pages);
        Ok(count)
    }

    fn render_page(&self, index: usize, width: f32) -> Result<RenderedPage> {
        let pages = self
            .pages
            .as_ref()
            .ok_or_else(|| anyhow!("document {} not loaded", self.id))?;
        let page = pages
            .get(index)
            .ok_or_else(|| anyhow!("page {index} out of range ({} pages)", pages.len()))?;
        Ok(RenderedPage {
            index,
            width,
            lines: pagination::wrap_page(page, width, self.font_size),
        })
    }
}

/// Stands in for a file format nothing in the process can parse.
pub struct UnsupportedSource {
    id: String,
    reason: String,
}

impl UnsupportedSource {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl DocumentSource for UnsupportedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&mut self) -> Result<usize> {
        Err(anyhow!("{}", self.reason))
    }

    fn render_page(&self, _index: usize, _width: f32) -> Result<RenderedPage> {
        Err(anyhow!("{}", self.reason))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Fixed page count; counts render calls.
    pub(crate) struct FakePdf {
        pub(crate) pages: usize,
        pub(crate) renders: Rc<Cell<usize>>,
    }

    impl DocumentSource for FakePdf {
        fn id(&self) -> &str {
            "fake.pdf"
        }

        fn load(&mut self) -> Result<usize> {
            Ok(self.pages)
        }

        fn render_page(&self, index: usize, width: f32) -> Result<RenderedPage> {
            self.renders.set(self.renders.get() + 1);
            Ok(RenderedPage {
                index,
                width,
                lines: Vec::new(),
            })
        }
    }

    #[test]
    fn page_count_is_unknown_before_load() {
        let view = DocumentView::new(FakePdf {
            pages: 10,
            renders: Rc::default(),
        });
        assert_eq!(view.page_count(), 0);
        assert_eq!(view.status(), &DocumentStatus::Loading);
    }

    #[test]
    fn resize_re_renders_every_page() {
        let renders = Rc::new(Cell::new(0));
        let mut view = DocumentView::open(FakePdf {
            pages: 10,
            renders: Rc::clone(&renders),
        });
        assert_eq!(view.layout(800.0), 10);
        assert_eq!(view.layout(800.0), 0);
        assert_eq!(view.layout(400.0), 10);
        assert_eq!(renders.get(), 20);
        assert!(view.pages().iter().all(|page| page.width == 400.0));
        assert_eq!(view.layout(0.0), 0);
        assert_eq!(view.render_width(), Some(400.0));
    }

    #[test]
    fn load_failure_is_reported_inline() {
        let mut view = DocumentView::open(UnsupportedSource::new("w.pdf", "no PDF renderer"));
        assert_eq!(
            view.status(),
            &DocumentStatus::Failed {
                message: "Failed to load document: no PDF renderer".to_string()
            }
        );
        assert_eq!(view.layout(600.0), 0);
        assert!(view.pages().is_empty());
    }

    #[test]
    fn text_source_keeps_page_count_across_widths() {
        let text = (0..120)
            .map(|i| format!("Line {i} of a rather long story that keeps on going."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut view = DocumentView::open(TextPageSource::new("story", text, 18));
        let count = view.page_count();
        assert!(count > 1);
        view.layout(900.0);
        let wide_lines: usize = view.pages().iter().map(|p| p.lines.len()).sum();
        view.layout(300.0);
        let narrow_lines: usize = view.pages().iter().map(|p| p.lines.len()).sum();
        assert_eq!(view.pages().len(), count);
        assert!(narrow_lines > wide_lines);
    }

    #[test]
    fn boxed_sources_are_sources() {
        let source: Box<dyn DocumentSource> = Box::new(TextPageSource::new("t", "Hello.", 16));
        let mut view = DocumentView::open(source);
        assert_eq!(view.page_count(), 1);
        assert_eq!(view.layout(500.0), 1);
        assert_eq!(view.pages()[0].lines, vec!["Hello.".to_string()]);
    }
}
