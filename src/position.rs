//! Remembers which chapter of a novel the reader had open on this device.

use crate::catalog::Chapter;
use crate::store::KeyValueStore;
use tracing::{debug, info, warn};

fn progress_key(work_id: &str) -> String {
    format!("novel_progress_{work_id}")
}

pub struct ReadingPositionTracker<D: KeyValueStore> {
    store: D,
}

impl<D: KeyValueStore> ReadingPositionTracker<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Saved chapter if it is still part of `chapters`, otherwise the chapter
    /// with the lowest number. `None` only for an empty list.
    pub fn resolve_initial_chapter(&self, work_id: &str, chapters: &[Chapter]) -> Option<String> {
        let saved = match self.store.get(&progress_key(work_id)) {
            Ok(saved) => saved,
            Err(err) => {
                debug!(work = work_id, "Reading position unreadable: {err:#}");
                None
            }
        };

        if let Some(saved) = saved {
            if chapters.iter().any(|chapter| chapter.id == saved) {
                info!(work = work_id, chapter = %saved, "Resuming saved chapter");
                return Some(saved);
            }
            debug!(work = work_id, chapter = %saved, "Saved chapter no longer listed");
        }

        // min_by_key keeps the first of equal minima.
        chapters
            .iter()
            .min_by_key(|chapter| chapter.chapter_number)
            .map(|chapter| chapter.id.clone())
    }

    /// Callers must pass a chapter that belongs to `work_id`.
    pub fn record_selection(&mut self, work_id: &str, chapter_id: &str) {
        if let Err(err) = self.store.set(&progress_key(work_id), chapter_id) {
            warn!(work = work_id, chapter = chapter_id, "Failed to save reading position: {err:#}");
        }
    }
}
