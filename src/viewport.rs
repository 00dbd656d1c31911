//! Tracks the width of the container a paginated document is rendered into.
//!
//! The manager is attached to one container at a time. Attaching measures the
//! container immediately, and the returned [`ViewportAttachment`] is the only
//! way resize notifications reach the manager. Dropping the attachment (or
//! attaching to a new container, which is how fullscreen transitions are
//! modelled) stops observation: notifications arriving through a superseded
//! attachment are ignored.
//!
//! Zero-width measurements happen when a container is measured before layout.
//! They are never propagated; the last good width (or the configured default)
//! stays in effect.

use crate::config::EngineConfig;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use ts_rs::TS;

/// Smallest width a page is ever rendered at.
pub const MIN_RENDER_WIDTH: f32 = 1.0;

/// Something that can report its laid-out content width.
pub trait Container {
    /// Content-box width in logical units; 0 if not laid out yet.
    fn content_width(&self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ViewportState {
    pub container_width: f32,
    pub fullscreen: bool,
}

type WidthListener = Box<dyn FnMut(f32)>;

struct Inner {
    state: ViewportState,
    generation: u64,
    attached: bool,
    listeners: Vec<WidthListener>,
}

impl Inner {
    /// Returns the new width when the measurement changed the state.
    fn apply_measurement(&mut self, width: f32) -> Option<f32> {
        if !width.is_finite() || width <= 0.0 {
            debug!(width, "Suppressed unusable container measurement");
            return None;
        }
        if width == self.state.container_width {
            return None;
        }
        trace!(
            from = self.state.container_width,
            to = width,
            "Container width changed"
        );
        self.state.container_width = width;
        Some(width)
    }
}

pub struct ViewportManager {
    inner: Rc<RefCell<Inner>>,
    page_inset: f32,
}

impl ViewportManager {
    pub fn new(default_width: f32, page_inset: f32) -> Self {
        let default_width = if default_width.is_finite() && default_width > 0.0 {
            default_width
        } else {
            800.0
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: ViewportState {
                    container_width: default_width,
                    fullscreen: false,
                },
                generation: 0,
                attached: false,
                listeners: Vec::new(),
            })),
            page_inset: page_inset.max(0.0),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_container_width, config.page_inset)
    }

    /// Start observing `container`. Any previous attachment is superseded.
    pub fn attach(&self, container: &dyn Container, fullscreen: bool) -> ViewportAttachment {
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            inner.attached = true;
            inner.state.fullscreen = fullscreen;
            inner.generation
        };
        debug!(generation, fullscreen, "Viewport attached");
        let attachment = ViewportAttachment {
            inner: Rc::downgrade(&self.inner),
            generation,
        };
        attachment.notify_resize(container.content_width());
        attachment
    }

    /// Most recent non-zero container width, or the default before any.
    pub fn current_width(&self) -> f32 {
        self.inner.borrow().state.container_width
    }

    /// Width pages are rendered at: the container width minus the inset.
    pub fn render_width(&self) -> f32 {
        (self.current_width() - self.page_inset).max(MIN_RENDER_WIDTH)
    }

    pub fn state(&self) -> ViewportState {
        self.inner.borrow().state
    }

    pub fn is_attached(&self) -> bool {
        self.inner.borrow().attached
    }

    /// Register a callback fired with the new width after every change.
    /// Callbacks may read from the manager but must not attach to it.
    pub fn on_width_change(&self, listener: impl FnMut(f32) + 'static) {
        self.inner.borrow_mut().listeners.push(Box::new(listener));
    }
}

/// Live observation of one container. Dropping it detaches.
pub struct ViewportAttachment {
    inner: Weak<RefCell<Inner>>,
    generation: u64,
}

impl ViewportAttachment {
    /// Feed a resize notification. Returns true if the width changed.
    pub fn notify_resize(&self, width: f32) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let (changed, mut listeners) = {
            let mut guard = inner.borrow_mut();
            if !guard.attached || guard.generation != self.generation {
                trace!(
                    generation = self.generation,
                    "Ignoring resize from stale attachment"
                );
                return false;
            }
            match guard.apply_measurement(width) {
                Some(changed) => (changed, std::mem::take(&mut guard.listeners)),
                None => return false,
            }
        };

        for listener in listeners.iter_mut() {
            listener(changed);
        }

        let mut guard = inner.borrow_mut();
        // Keep listeners registered from inside a callback.
        listeners.append(&mut guard.listeners);
        guard.listeners = listeners;
        true
    }

    /// Take a fresh measurement from the container.
    pub fn remeasure(&self, container: &dyn Container) -> bool {
        self.notify_resize(container.content_width())
    }

    pub fn is_current(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| {
                let guard = inner.borrow();
                guard.attached && guard.generation == self.generation
            })
            .unwrap_or(false)
    }

    pub fn detach(self) {}
}

impl Drop for ViewportAttachment {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut guard = inner.borrow_mut();
            if guard.generation == self.generation && guard.attached {
                guard.attached = false;
                debug!(generation = self.generation, "Viewport detached");
            }
        }
    }
}
