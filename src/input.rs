//! Input model: pointer events, toolbar commands, and the per-session binding
//! table that routes them to the current draft thread.
//!
//! Screen-to-document mapping is the host renderer's job. The controller
//! asks a [`LocationResolver`] for each event's [`Location`] and never
//! transforms coordinates itself. [`PageLayout`] is a simple resolver for a
//! vertical stack of equally sized pages, used by the replay binary.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, env_parse};
use crate::consts::{DEFAULT_PAGE_COUNT, DEFAULT_PAGE_GAP, DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};
use crate::geom::{Location, Point};
use crate::thread::ThreadId;

// =============================================================================
// EVENTS
// =============================================================================

/// Phase of a pointer gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Down,
    Move,
    Up,
    /// The platform aborted the gesture (touch only).
    Cancel,
}

/// Physical source of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub kind: PointerKind,
    #[serde(default)]
    pub device: Device,
    /// Position in host screen space.
    pub screen: Point,
    /// Host-supplied event time in milliseconds.
    pub timestamp: u64,
}

impl PointerEvent {
    #[must_use]
    pub fn new(kind: PointerKind, device: Device, x: f64, y: f64, timestamp: u64) -> Self {
        Self { kind, device, screen: Point::new(x, y), timestamp }
    }

    #[must_use]
    pub fn mouse(kind: PointerKind, x: f64, y: f64, timestamp: u64) -> Self {
        Self::new(kind, Device::Mouse, x, y, timestamp)
    }

    #[must_use]
    pub fn touch(kind: PointerKind, x: f64, y: f64, timestamp: u64) -> Self {
        Self::new(kind, Device::Touch, x, y, timestamp)
    }
}

/// Toolbar commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Post the drawing and leave drawing mode.
    Commit,
    Undo,
    Redo,
}

// =============================================================================
// BINDINGS
// =============================================================================

/// What a binding reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Pointer(Device, PointerKind),
    Command(Command),
}

impl From<&PointerEvent> for Trigger {
    fn from(event: &PointerEvent) -> Self {
        Self::Pointer(event.device, event.kind)
    }
}

impl From<Command> for Trigger {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

/// Thread operation a trigger dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Start,
    Move,
    Stop,
    Save,
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub trigger: Trigger,
    pub thread: ThreadId,
    pub handler: Handler,
}

/// Trigger table for one drawing-mode session.
///
/// Rebuilt whenever the session's draft thread is replaced, and dropped
/// whole when the mode deactivates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeBindings {
    bindings: Vec<Binding>,
}

impl ModeBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard drawing table, all routed to `thread`.
    ///
    /// Mouse and touch both start, extend and stop strokes; a touch cancel
    /// stops the stroke. Mouse cancel is left unbound.
    #[must_use]
    pub fn for_thread(thread: ThreadId) -> Self {
        use Device::{Mouse, Touch};
        use PointerKind::{Cancel, Down, Move, Up};

        let table = [
            (Trigger::Pointer(Mouse, Move), Handler::Move),
            (Trigger::Pointer(Touch, Move), Handler::Move),
            (Trigger::Pointer(Mouse, Down), Handler::Start),
            (Trigger::Pointer(Touch, Down), Handler::Start),
            (Trigger::Pointer(Mouse, Up), Handler::Stop),
            (Trigger::Pointer(Touch, Cancel), Handler::Stop),
            (Trigger::Pointer(Touch, Up), Handler::Stop),
            (Trigger::Command(Command::Commit), Handler::Save),
            (Trigger::Command(Command::Undo), Handler::Undo),
            (Trigger::Command(Command::Redo), Handler::Redo),
        ];
        let mut bindings = Self::new();
        for (trigger, handler) in table {
            bindings.bind(trigger, thread, handler);
        }
        bindings
    }

    /// Add a binding. A trigger already bound is rebound.
    pub fn bind(&mut self, trigger: Trigger, thread: ThreadId, handler: Handler) {
        self.bindings.retain(|b| b.trigger != trigger);
        self.bindings.push(Binding { trigger, thread, handler });
    }

    /// Look up the thread and operation bound to `trigger`.
    #[must_use]
    pub fn resolve(&self, trigger: Trigger) -> Option<(ThreadId, Handler)> {
        self.bindings
            .iter()
            .find(|b| b.trigger == trigger)
            .map(|b| (b.thread, b.handler))
    }

    /// The thread the pointer triggers are routed to.
    #[must_use]
    pub fn thread(&self) -> Option<ThreadId> {
        self.bindings.first().map(|b| b.thread)
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// =============================================================================
// LOCATION RESOLUTION
// =============================================================================

/// Maps a pointer event onto a document page.
pub trait LocationResolver {
    /// `None` when the event is not over any page.
    fn location_from_event(&self, event: &PointerEvent) -> Option<Location>;
}

/// Pages of equal size stacked top to bottom with a fixed gap, starting at
/// screen origin. Page numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    pub page_width: f64,
    pub page_height: f64,
    pub page_gap: f64,
    pub page_count: u32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_width: DEFAULT_PAGE_WIDTH,
            page_height: DEFAULT_PAGE_HEIGHT,
            page_gap: DEFAULT_PAGE_GAP,
            page_count: DEFAULT_PAGE_COUNT,
        }
    }
}

impl PageLayout {
    #[must_use]
    pub fn new(page_width: f64, page_height: f64, page_gap: f64, page_count: u32) -> Self {
        Self { page_width, page_height, page_gap, page_count }
    }

    /// Load from `DRAW_PAGE_WIDTH`, `DRAW_PAGE_HEIGHT`, `DRAW_PAGE_GAP` and
    /// `DRAW_PAGE_COUNT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable values, non-positive page
    /// dimensions, a negative gap, or zero pages.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let layout = Self {
            page_width: env_parse("DRAW_PAGE_WIDTH", d.page_width)?,
            page_height: env_parse("DRAW_PAGE_HEIGHT", d.page_height)?,
            page_gap: env_parse("DRAW_PAGE_GAP", d.page_gap)?,
            page_count: env_parse("DRAW_PAGE_COUNT", d.page_count)?,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid { key: key.into(), reason: reason.into() };
        if !(self.page_width.is_finite() && self.page_width > 0.0) {
            return Err(invalid("DRAW_PAGE_WIDTH", "must be positive"));
        }
        if !(self.page_height.is_finite() && self.page_height > 0.0) {
            return Err(invalid("DRAW_PAGE_HEIGHT", "must be positive"));
        }
        if !(self.page_gap.is_finite() && self.page_gap >= 0.0) {
            return Err(invalid("DRAW_PAGE_GAP", "must be non-negative"));
        }
        if self.page_count == 0 {
            return Err(invalid("DRAW_PAGE_COUNT", "must be at least 1"));
        }
        Ok(())
    }

    /// Screen y of the top edge of `page`.
    #[must_use]
    pub fn page_top(&self, page: u32) -> f64 {
        f64::from(page.saturating_sub(1)) * (self.page_height + self.page_gap)
    }

    /// Resolve a screen point to a page-local location.
    #[must_use]
    pub fn resolve(&self, screen: Point) -> Option<Location> {
        if screen.x < 0.0 || screen.x > self.page_width || screen.y < 0.0 {
            return None;
        }
        let stride = self.page_height + self.page_gap;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = (screen.y / stride).floor() as u32;
        if index >= self.page_count {
            return None;
        }
        let page = index + 1;
        let local_y = screen.y - self.page_top(page);
        if local_y > self.page_height {
            return None;
        }
        Some(Location::new(screen.x, local_y, page))
    }
}

impl LocationResolver for PageLayout {
    fn location_from_event(&self, event: &PointerEvent) -> Option<Location> {
        self.resolve(event.screen)
    }
}
