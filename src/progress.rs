//! Scroll-driven reading progress for the fullscreen reading surface.
//!
//! Scroll events can arrive every few milliseconds, so progress never goes
//! through session state. Each event is turned into a percentage and written
//! straight to a [`ProgressSink`], which on a real front-end is a handle to
//! the progress bar element.
//!
//! Binding a surface returns a [`BoundSurface`] guard. While it is alive the
//! outer page scroll is locked; the lock is released exactly once, whether the
//! surface is closed explicitly or simply dropped. The guard does not borrow
//! the tracker, so it can be stored next to it (see `ReadingSession`).

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, warn};

/// Denominator floor for surfaces whose content does not overflow.
const SCROLL_EPSILON: f32 = f32::EPSILON;

/// Narrow output port for the progress bar. Must be cheap: called per event.
pub trait ProgressSink {
    fn set_progress(&mut self, percent: f32);
}

/// Disables and restores scrolling of whatever sits behind the surface.
pub trait ScrollLock {
    fn disable_outer_scroll(&mut self);
    fn restore_outer_scroll(&mut self);
}

/// Shared handles, so one bar and one lock can serve every remount.
impl<T: ProgressSink + ?Sized> ProgressSink for Rc<RefCell<T>> {
    fn set_progress(&mut self, percent: f32) {
        self.borrow_mut().set_progress(percent);
    }
}

impl<T: ScrollLock + ?Sized> ScrollLock for Rc<RefCell<T>> {
    fn disable_outer_scroll(&mut self) {
        self.borrow_mut().disable_outer_scroll();
    }

    fn restore_outer_scroll(&mut self) {
        self.borrow_mut().restore_outer_scroll();
    }
}

/// Raw geometry reported by one scroll event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

/// Percentage of the scrollable range covered, clamped to `[0, 100]`.
pub fn scroll_percent(metrics: ScrollMetrics) -> f32 {
    let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
    let range = (finite(metrics.scroll_height) - finite(metrics.client_height)).max(SCROLL_EPSILON);
    let pct = finite(metrics.scroll_top) / range * 100.0;
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Closed,
    Open,
}

/// Owns the open/closed state of the reading surface.
#[derive(Debug, Default)]
pub struct ScrollProgressTracker {
    // Sequence number of the live surface, if any.
    live: Rc<Cell<Option<u64>>>,
    opened: u64,
}

impl ScrollProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SurfaceState {
        match self.live.get() {
            Some(_) => SurfaceState::Open,
            None => SurfaceState::Closed,
        }
    }

    /// Number of times a surface has been bound.
    pub fn open_count(&self) -> u64 {
        self.opened
    }

    /// Open the surface: lock the outer scroll and reset progress to 0.
    /// A surface still bound from before is superseded and no longer
    /// counts as open, though it keeps its lock until it is released.
    pub fn bind<S: ProgressSink, L: ScrollLock>(
        &mut self,
        mut sink: S,
        mut lock: L,
    ) -> BoundSurface<S, L> {
        lock.disable_outer_scroll();
        sink.set_progress(0.0);
        self.opened += 1;
        self.live.set(Some(self.opened));
        debug!(open_count = self.opened, "Reading surface opened");
        BoundSurface {
            live: Rc::clone(&self.live),
            sequence: self.opened,
            sink,
            lock: Some(lock),
        }
    }
}

pub struct BoundSurface<S: ProgressSink, L: ScrollLock> {
    live: Rc<Cell<Option<u64>>>,
    sequence: u64,
    sink: S,
    lock: Option<L>,
}

impl<S: ProgressSink, L: ScrollLock> BoundSurface<S, L> {
    /// Hot path: no allocation, no logging.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) {
        self.sink.set_progress(scroll_percent(metrics));
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Close the surface and hand back the sink.
    pub fn unbind(mut self) -> S
    where
        S: Default,
    {
        self.release();
        std::mem::take(&mut self.sink)
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        match self.lock.take() {
            Some(mut lock) => {
                lock.restore_outer_scroll();
                if self.live.get() == Some(self.sequence) {
                    self.live.set(None);
                }
                debug!(sequence = self.sequence, "Reading surface closed");
            }
            None => warn!("Reading surface released twice"),
        }
    }
}

impl<S: ProgressSink, L: ScrollLock> Drop for BoundSurface<S, L> {
    fn drop(&mut self) {
        if self.lock.is_some() {
            self.release();
        }
    }
}
