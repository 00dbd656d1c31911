//! One reader's session with one work.
//!
//! [`ReadingSession`] wires the engine parts together the way a reader page
//! uses them: opening a work counts a view and hydrates its like state; for
//! novels the last chapter read on this device is restored (or the first
//! one), and every chapter switch is remembered and counted; the document for
//! the current work or chapter is mounted into a viewport and re-laid out as
//! the container changes size or goes fullscreen.
//!
//! Entering fullscreen binds the reading surface (scroll lock held, progress
//! reset to 0); leaving it, or remounting it, releases the lock. Resizes and
//! likes while the surface is bound leave progress alone.

use crate::catalog::{Chapter, ContentFormat, Work, order_chapters};
use crate::config::EngineConfig;
use crate::counter::CounterOutbox;
use crate::document::{
    DocumentSource, DocumentStatus, DocumentView, TextPageSource, UnsupportedSource,
};
use crate::engagement::{EngagementCounter, EngagementState, EntityKind};
use crate::position::ReadingPositionTracker;
use crate::progress::{
    BoundSurface, ProgressSink, ScrollLock, ScrollMetrics, ScrollProgressTracker, SurfaceState,
};
use crate::store::KeyValueStore;
use crate::text_utils::{self, FlowedText};
use crate::viewport::{Container, ViewportAttachment, ViewportManager};
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

type SharedSink = Rc<RefCell<dyn ProgressSink>>;
type SharedLock = Rc<RefCell<dyn ScrollLock>>;

/// What is currently being read: the work itself or one of its chapters.
struct Target<'a> {
    id: &'a str,
    format: ContentFormat,
    content: Option<&'a str>,
    pdf_url: Option<&'a str>,
    word_count: Option<u64>,
}

/// `D` handles must share state when cloned (a directory-backed store, or an
/// `Rc<RefCell<_>>`), since likes and reading positions live in the same store.
pub struct ReadingSession<D, S>
where
    D: KeyValueStore + Clone,
    S: KeyValueStore,
{
    config: EngineConfig,
    work: Work,
    chapters: Vec<Chapter>,
    selected_chapter: Option<String>,
    engagement: EngagementCounter<D, S>,
    position: ReadingPositionTracker<D>,
    viewport: ViewportManager,
    attachment: Option<ViewportAttachment>,
    progress: ScrollProgressTracker,
    reading_ports: Option<(SharedSink, SharedLock)>,
    surface: Option<BoundSurface<SharedSink, SharedLock>>,
    document: Option<DocumentView<Box<dyn DocumentSource>>>,
}

impl<D, S> ReadingSession<D, S>
where
    D: KeyValueStore + Clone,
    S: KeyValueStore,
{
    /// Open `work`. For novels, `preferred_chapter` (an explicit choice by
    /// the reader) wins over the chapter restored from the device; it must be
    /// one of `chapters`.
    pub fn open(
        config: EngineConfig,
        work: Work,
        mut chapters: Vec<Chapter>,
        preferred_chapter: Option<&str>,
        durable: D,
        session_store: S,
        outbox: CounterOutbox,
    ) -> Result<Self> {
        if let Some(wanted) = preferred_chapter {
            if !chapters.iter().any(|chapter| chapter.id == wanted) {
                return Err(anyhow!("chapter {wanted} is not part of work {}", work.id));
            }
        }
        order_chapters(&mut chapters);
        let mut engagement = EngagementCounter::new(durable.clone(), session_store, outbox);
        engagement.get_state(EntityKind::Work, &work.id, work.like_count);
        engagement.record_view(EntityKind::Work, &work.id, work.view_count);

        let position = ReadingPositionTracker::new(durable);
        let viewport = ViewportManager::from_config(&config);
        info!(work = %work.id, title = %work.title, chapters = chapters.len(), "Opened work");

        let mut session = Self {
            config,
            work,
            chapters,
            selected_chapter: None,
            engagement,
            position,
            viewport,
            attachment: None,
            progress: ScrollProgressTracker::new(),
            reading_ports: None,
            surface: None,
            document: None,
        };

        if session.work.is_multi_chapter() {
            let initial = match preferred_chapter {
                Some(wanted) => Some(wanted.to_string()),
                None => session
                    .position
                    .resolve_initial_chapter(&session.work.id, &session.chapters),
            };
            if let Some(initial) = initial {
                session.activate_chapter(initial);
            }
        }
        Ok(session)
    }

    pub fn work(&self) -> &Work {
        &self.work
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn selected_chapter(&self) -> Option<&Chapter> {
        let id = self.selected_chapter.as_deref()?;
        self.chapters.iter().find(|chapter| chapter.id == id)
    }

    /// Switch chapters. Unknown ids are rejected before anything is stored.
    pub fn select_chapter(&mut self, chapter_id: &str) -> Result<&Chapter> {
        if !self.chapters.iter().any(|chapter| chapter.id == chapter_id) {
            return Err(anyhow!(
                "chapter {chapter_id} is not part of work {}",
                self.work.id
            ));
        }
        if self.selected_chapter.as_deref() != Some(chapter_id) {
            // The old chapter's document goes away with the selection.
            self.unmount_document();
            self.activate_chapter(chapter_id.to_string());
        }
        self.selected_chapter()
            .ok_or_else(|| anyhow!("chapter {chapter_id} vanished"))
    }

    fn activate_chapter(&mut self, chapter_id: String) {
        self.position.record_selection(&self.work.id, &chapter_id);
        if let Some(chapter) = self.chapters.iter().find(|chapter| chapter.id == chapter_id) {
            // Coming back to a chapter keeps the count built up by earlier
            // toggles; the listed count is stale by then.
            if self.engagement.state(EntityKind::Chapter, &chapter.id).is_none() {
                self.engagement
                    .get_state(EntityKind::Chapter, &chapter.id, chapter.like_count);
            }
            self.engagement
                .record_view(EntityKind::Chapter, &chapter.id, chapter.view_count);
            info!(
                work = %self.work.id,
                chapter = %chapter.id,
                number = chapter.chapter_number,
                "Selected chapter"
            );
        }
        self.selected_chapter = Some(chapter_id);
    }

    pub fn work_engagement(&self) -> Option<EngagementState> {
        self.engagement.state(EntityKind::Work, &self.work.id)
    }

    pub fn chapter_engagement(&self) -> Option<EngagementState> {
        let id = self.selected_chapter.as_deref()?;
        self.engagement.state(EntityKind::Chapter, id)
    }

    pub fn toggle_work_like(&mut self) -> EngagementState {
        self.engagement.toggle(EntityKind::Work, &self.work.id)
    }

    pub fn toggle_chapter_like(&mut self) -> Option<EngagementState> {
        let id = self.selected_chapter.clone()?;
        Some(self.engagement.toggle(EntityKind::Chapter, &id))
    }

    /// Adopt counts from a fresh fetch of the work record.
    pub fn refresh_work(&mut self, fresh: &Work) {
        if fresh.id != self.work.id {
            return;
        }
        self.engagement
            .reconcile(EntityKind::Work, &fresh.id, fresh.like_count);
        self.work.like_count = fresh.like_count;
        self.work.view_count = fresh.view_count;
    }

    fn target(&self) -> Target<'_> {
        match self.selected_chapter() {
            Some(chapter) => Target {
                id: &chapter.id,
                format: chapter.format,
                content: chapter.content.as_deref(),
                pdf_url: chapter.pdf_url.as_deref(),
                word_count: chapter.word_count,
            },
            None => Target {
                id: &self.work.id,
                format: self.work.format,
                content: self.work.content.as_deref(),
                pdf_url: self.work.pdf_url.as_deref(),
                word_count: self.work.word_count,
            },
        }
    }

    /// Text content of the current target, ready for flowed display.
    pub fn flowed_text(&self) -> Option<FlowedText> {
        let target = self.target();
        if target.format == ContentFormat::Pdf {
            return None;
        }
        target
            .content
            .map(|content| FlowedText::new(content, self.config.text_font_size))
    }

    /// Read-time label, from the record's word count or else the content.
    pub fn read_time_label(&self) -> Option<String> {
        let target = self.target();
        let words = match target.word_count {
            Some(words) if words > 0 => words,
            _ => text_utils::word_count(target.content?) as u64,
        };
        (words > 0).then(|| text_utils::read_time_label(words, self.config.words_per_minute))
    }

    /// Source for the current target when the caller has no better one.
    pub fn default_source(&self) -> Box<dyn DocumentSource> {
        let target = self.target();
        match (target.format, target.content, target.pdf_url) {
            (ContentFormat::Pdf, _, Some(url)) => Box::new(UnsupportedSource::new(
                target.id,
                format!("no PDF renderer available for {url}"),
            )),
            (ContentFormat::Text, Some(content), _) => Box::new(TextPageSource::new(
                target.id,
                text_utils::normalize_text(content),
                self.config.text_font_size,
            )),
            _ => Box::new(UnsupportedSource::new(target.id, "no content available")),
        }
    }

    /// Mount a document into `container` and lay it out at the render width.
    pub fn mount_document(
        &mut self,
        source: Box<dyn DocumentSource>,
        container: &dyn Container,
        fullscreen: bool,
    ) -> &DocumentStatus {
        self.attachment = Some(self.viewport.attach(container, fullscreen));
        let mut view = DocumentView::open(source);
        view.layout(self.viewport.render_width());
        self.document.insert(view).status()
    }

    /// Progress bar and outer-scroll lock used by the fullscreen surface.
    /// Takes effect on the next fullscreen mount.
    pub fn set_reading_surface(
        &mut self,
        sink: impl ProgressSink + 'static,
        lock: impl ScrollLock + 'static,
    ) {
        let sink: SharedSink = Rc::new(RefCell::new(sink));
        let lock: SharedLock = Rc::new(RefCell::new(lock));
        self.reading_ports = Some((sink, lock));
    }

    /// Fullscreen open/close remounts the document's container. Entering
    /// fullscreen binds a fresh reading surface at 0% progress.
    pub fn set_fullscreen(&mut self, container: &dyn Container, fullscreen: bool) {
        // Release the old surface and observation before the new container
        // is measured.
        self.surface.take();
        self.attachment.take();
        self.attachment = Some(self.viewport.attach(container, fullscreen));
        if fullscreen {
            if let Some((sink, lock)) = &self.reading_ports {
                self.surface = Some(self.progress.bind(Rc::clone(sink), Rc::clone(lock)));
            }
        }
        debug!(fullscreen, width = self.viewport.current_width(), "Reading surface remounted");
        self.relayout();
    }

    /// Forward a scroll event from the fullscreen surface.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) {
        if let Some(surface) = self.surface.as_mut() {
            surface.on_scroll(metrics);
        }
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.progress.state()
    }

    /// Forward a container resize. Returns true if pages were re-rendered.
    pub fn notify_resize(&mut self, width: f32) -> bool {
        let changed = self
            .attachment
            .as_ref()
            .is_some_and(|attachment| attachment.notify_resize(width));
        changed && self.relayout() > 0
    }

    fn relayout(&mut self) -> usize {
        let width = self.viewport.render_width();
        self.document
            .as_mut()
            .map(|view| view.layout(width))
            .unwrap_or(0)
    }

    pub fn unmount_document(&mut self) {
        self.surface.take();
        self.attachment.take();
        if let Some(view) = self.document.take() {
            debug!(document = view.id(), "Document unmounted");
        }
    }

    pub fn document(&self) -> Option<&DocumentView<Box<dyn DocumentSource>>> {
        self.document.as_ref()
    }

    pub fn viewport(&self) -> &ViewportManager {
        &self.viewport
    }

    /// End the session, waiting for queued counter updates to be attempted.
    pub fn close(mut self) {
        self.unmount_document();
        info!(work = %self.work.id, "Closed work");
        self.engagement.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WorkType;
    use crate::catalog::tests::chapter;
    use crate::counter::tests::{RecordingCounter, no_wait};
    use crate::counter::{CounterCommand, CounterField};
    use crate::document::tests::FakePdf;
    use crate::engagement::EntityKey;
    use crate::store::MemoryStore;
    use std::cell::Cell;
    use std::sync::Arc;

    type Durable = Rc<RefCell<MemoryStore>>;

    struct Pane(f32);

    impl Container for Pane {
        fn content_width(&self) -> f32 {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct Bar(Rc<Cell<f32>>);

    impl ProgressSink for Bar {
        fn set_progress(&mut self, percent: f32) {
            self.0.set(percent);
        }
    }

    #[derive(Clone, Default)]
    struct BodyLock {
        held: Rc<Cell<i32>>,
        restores: Rc<Cell<u32>>,
    }

    impl ScrollLock for BodyLock {
        fn disable_outer_scroll(&mut self) {
            self.held.set(self.held.get() + 1);
        }

        fn restore_outer_scroll(&mut self) {
            self.held.set(self.held.get() - 1);
            self.restores.set(self.restores.get() + 1);
        }
    }

    fn novel() -> Work {
        Work {
            id: "W".to_string(),
            title: "A Novel".to_string(),
            description: None,
            work_type: WorkType::Novel,
            format: ContentFormat::Text,
            content: None,
            pdf_url: None,
            cover_image_url: None,
            is_pinned: false,
            like_count: 5,
            view_count: 10,
            word_count: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    fn chapters() -> Vec<Chapter> {
        let mut third = chapter("chapter-3-id", "W", 3);
        third.view_count = 3;
        vec![
            third,
            chapter("chapter-1-id", "W", 1),
            chapter("chapter-2-id", "W", 2),
        ]
    }

    fn open_at(
        durable: Durable,
        work: Work,
        preferred_chapter: Option<&str>,
    ) -> (ReadingSession<Durable, MemoryStore>, Arc<RecordingCounter>) {
        let service = Arc::new(RecordingCounter::default());
        let outbox = CounterOutbox::spawn(service.clone(), 64, no_wait());
        let session = ReadingSession::open(
            EngineConfig::default(),
            work,
            chapters(),
            preferred_chapter,
            durable,
            MemoryStore::new(),
            outbox,
        )
        .expect("session opens");
        (session, service)
    }

    fn open_with(
        durable: Durable,
        work: Work,
    ) -> (ReadingSession<Durable, MemoryStore>, Arc<RecordingCounter>) {
        open_at(durable, work, None)
    }

    fn view_command(kind: EntityKind, id: &str, value: i64) -> CounterCommand {
        CounterCommand {
            entity: EntityKey::new(kind, id),
            field: CounterField::ViewCount,
            value,
        }
    }

    fn half_way() -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: 500.0,
            scroll_height: 1100.0,
            client_height: 100.0,
        }
    }

    #[test]
    fn opening_a_novel_restores_saved_chapter_and_counts_views() {
        let durable: Durable = Rc::default();
        durable
            .borrow_mut()
            .set("novel_progress_W", "chapter-3-id")
            .unwrap();
        let (session, service) = open_with(durable, novel());

        assert_eq!(
            session.selected_chapter().map(|c| c.id.as_str()),
            Some("chapter-3-id")
        );
        let ordered: Vec<i32> = session.chapters().iter().map(|c| c.chapter_number).collect();
        assert_eq!(ordered, vec![1, 2, 3]);

        session.close();
        assert_eq!(
            service.snapshot(),
            vec![
                view_command(EntityKind::Work, "W", 11),
                view_command(EntityKind::Chapter, "chapter-3-id", 4),
            ]
        );
    }

    #[test]
    fn explicit_chapter_skips_the_restored_one() {
        let durable: Durable = Rc::default();
        let (session, service) = open_at(Rc::clone(&durable), novel(), Some("chapter-2-id"));
        assert_eq!(
            session.selected_chapter().map(|c| c.id.as_str()),
            Some("chapter-2-id")
        );
        session.close();

        let viewed: Vec<String> = service
            .snapshot()
            .iter()
            .map(|c| c.entity.to_string())
            .collect();
        assert_eq!(viewed, vec!["works:W", "chapters:chapter-2-id"]);
        assert_eq!(
            durable.borrow().get("novel_progress_W").unwrap().as_deref(),
            Some("chapter-2-id")
        );
    }

    #[test]
    fn unknown_explicit_chapter_is_rejected_before_counting() {
        let durable: Durable = Rc::default();
        let service = Arc::new(RecordingCounter::default());
        let outbox = CounterOutbox::spawn(service.clone(), 8, no_wait());
        let opened = ReadingSession::open(
            EngineConfig::default(),
            novel(),
            chapters(),
            Some("missing"),
            Rc::clone(&durable),
            MemoryStore::new(),
            outbox,
        );
        assert!(opened.is_err());
        assert!(service.snapshot().is_empty());
        assert!(durable.borrow().is_empty());
    }

    #[test]
    fn reopening_in_same_session_does_not_recount() {
        let durable: Durable = Rc::default();
        let session_store = Rc::new(RefCell::new(MemoryStore::new()));

        let service = Arc::new(RecordingCounter::default());
        for _ in 0..3 {
            let outbox = CounterOutbox::spawn(service.clone(), 64, no_wait());
            let session = ReadingSession::open(
                EngineConfig::default(),
                novel(),
                chapters(),
                None,
                Rc::clone(&durable),
                Rc::clone(&session_store),
                outbox,
            )
            .expect("session opens");
            session.close();
        }
        // One work view plus one view of chapter 1.
        assert_eq!(service.snapshot().len(), 2);
    }

    #[test]
    fn selecting_a_chapter_is_remembered_on_the_device() {
        let durable: Durable = Rc::default();
        let (mut session, _service) = open_with(Rc::clone(&durable), novel());
        assert_eq!(
            session.selected_chapter().map(|c| c.id.as_str()),
            Some("chapter-1-id")
        );

        session.select_chapter("chapter-2-id").expect("known chapter");
        assert!(session.select_chapter("missing").is_err());
        session.close();

        assert_eq!(
            durable.borrow().get("novel_progress_W").unwrap().as_deref(),
            Some("chapter-2-id")
        );
    }

    #[test]
    fn likes_toggle_for_work_and_chapter() {
        let durable: Durable = Rc::default();
        let (mut session, service) = open_with(Rc::clone(&durable), novel());

        let liked = session.toggle_work_like();
        assert!(liked.liked);
        assert_eq!(liked.displayed_count, 6);
        let chapter = session.toggle_chapter_like().expect("chapter selected");
        assert_eq!(chapter.displayed_count, 1);
        assert_eq!(session.work_engagement(), Some(liked));

        let mut fresh = novel();
        fresh.like_count = 9;
        session.refresh_work(&fresh);
        assert_eq!(session.work_engagement().map(|s| s.displayed_count), Some(9));
        session.close();

        assert_eq!(durable.borrow().get("works:W").unwrap().as_deref(), Some("1"));
        let likes: Vec<i64> = service
            .snapshot()
            .iter()
            .filter(|c| c.field == CounterField::LikeCount)
            .map(|c| c.value)
            .collect();
        assert_eq!(likes, vec![6, 1]);
    }

    #[test]
    fn returning_to_a_liked_chapter_keeps_its_count() {
        let (mut session, service) = open_with(Rc::default(), novel());
        let liked = session.toggle_chapter_like().expect("chapter selected");
        assert_eq!(liked.displayed_count, 1);

        session.select_chapter("chapter-2-id").expect("known chapter");
        session.select_chapter("chapter-1-id").expect("known chapter");
        assert_eq!(session.chapter_engagement(), Some(liked));

        let unliked = session.toggle_chapter_like().expect("chapter selected");
        assert!(!unliked.liked);
        assert_eq!(unliked.displayed_count, 0);
        session.close();

        let likes: Vec<i64> = service
            .snapshot()
            .iter()
            .filter(|c| c.field == CounterField::LikeCount)
            .map(|c| c.value)
            .collect();
        assert_eq!(likes, vec![1, 0]);
    }

    #[test]
    fn resize_re_renders_mounted_document() {
        let (mut session, _service) = open_with(Rc::default(), novel());
        let renders = Rc::new(Cell::new(0));
        let status = session
            .mount_document(
                Box::new(FakePdf {
                    pages: 10,
                    renders: Rc::clone(&renders),
                }),
                &Pane(816.0),
                false,
            )
            .clone();
        assert_eq!(status, DocumentStatus::Ready { page_count: 10 });
        assert_eq!(session.viewport().render_width(), 800.0);
        assert_eq!(renders.get(), 10);

        assert!(session.notify_resize(416.0));
        assert!(!session.notify_resize(0.0));
        let document = session.document().expect("mounted");
        assert_eq!(document.pages().len(), 10);
        assert!(document.pages().iter().all(|page| page.width == 400.0));
        assert_eq!(renders.get(), 20);
        session.close();
    }

    #[test]
    fn fullscreen_round_trip_resets_progress_and_releases_lock() {
        let (mut session, _service) = open_with(Rc::default(), novel());
        let source = session.default_source();
        session.mount_document(source, &Pane(700.0), false);
        let bar = Bar::default();
        let lock = BodyLock::default();
        session.set_reading_surface(bar.clone(), lock.clone());
        assert_eq!(session.surface_state(), SurfaceState::Closed);

        session.set_fullscreen(&Pane(390.0), true);
        assert!(session.viewport().state().fullscreen);
        assert_eq!(session.surface_state(), SurfaceState::Open);
        session.on_scroll(half_way());
        assert_eq!(bar.0.get(), 50.0);
        assert_eq!(lock.held.get(), 1);

        session.set_fullscreen(&Pane(700.0), false);
        assert_eq!(session.surface_state(), SurfaceState::Closed);
        assert_eq!(lock.held.get(), 0);
        assert_eq!(lock.restores.get(), 1);

        session.set_fullscreen(&Pane(390.0), true);
        assert_eq!(bar.0.get(), 0.0);
        session.close();
        assert_eq!(lock.held.get(), 0);
        assert_eq!(lock.restores.get(), 2);
    }

    #[test]
    fn resizing_and_liking_in_fullscreen_keep_progress() {
        let (mut session, _service) = open_with(Rc::default(), novel());
        let source = session.default_source();
        session.mount_document(source, &Pane(700.0), false);
        let bar = Bar::default();
        let lock = BodyLock::default();
        session.set_reading_surface(bar.clone(), lock.clone());
        session.set_fullscreen(&Pane(420.0), true);
        session.on_scroll(half_way());

        session.notify_resize(380.0);
        session.toggle_chapter_like();
        assert_eq!(session.viewport().current_width(), 380.0);
        assert_eq!(bar.0.get(), 50.0);
        assert_eq!(lock.held.get(), 1);
        assert_eq!(lock.restores.get(), 0);

        // Leaving the chapter tears the surface down with the document.
        session.select_chapter("chapter-2-id").expect("known chapter");
        assert_eq!(session.surface_state(), SurfaceState::Closed);
        assert_eq!(lock.restores.get(), 1);
        session.close();
    }

    #[test]
    fn text_story_has_read_time_and_flowed_text() {
        let mut story = novel();
        story.id = "S".to_string();
        story.work_type = WorkType::Story;
        story.content = Some("word ".repeat(450));
        let (session, _service) = open_with(Rc::default(), story);
        assert!(session.selected_chapter().is_none());
        assert_eq!(session.read_time_label().as_deref(), Some("3 min read"));
        let flowed = session.flowed_text().expect("text content");
        assert_eq!(flowed.font_size(), 18);
        assert_eq!(flowed.word_count(), 450);
        session.close();
    }

    #[test]
    fn pdf_without_renderer_fails_inline() {
        let mut poem = novel();
        poem.work_type = WorkType::Poem;
        poem.format = ContentFormat::Pdf;
        poem.pdf_url = Some("https://files.example.org/poem.pdf".to_string());
        let (mut session, _service) = open_with(Rc::default(), poem);
        assert!(session.flowed_text().is_none());
        let source = session.default_source();
        let status = session.mount_document(source, &Pane(600.0), false);
        assert!(matches!(status, DocumentStatus::Failed { .. }));
        session.close();
    }
}
