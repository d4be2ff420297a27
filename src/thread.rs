//! Drawing threads: one free-form drawing annotation and its stroke log.
//!
//! A thread moves `Drafting → Committed → Deleted` (or straight from
//! `Drafting` to `Deleted` when a draft is discarded). While drafting it
//! accumulates strokes from pointer input; each finished stroke lands on the
//! undo stack of its [`StrokeHistory`]. Operations return [`ThreadEvent`]s
//! instead of notifying anyone directly, so a thread holds no reference to
//! the controller that owns it.

#[cfg(test)]
#[path = "thread_test.rs"]
mod thread_test;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::geom::{BoundingBox, Location, Point, StrokePoint, ThreadLocation};
use crate::index::Indexable;
use crate::router::Routable;
use crate::service::{AnnotationService, DrawingAnnotation, SaveRequest, ServiceError};

/// Unique identifier for a drawing thread.
pub type ThreadId = Uuid;

// =============================================================================
// STATUS / ERRORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Drafting,
    Committed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
    #[error("thread {0} is not drafting")]
    NotDrafting(ThreadId),
    #[error("thread {0} has no strokes to save")]
    Empty(ThreadId),
    #[error("thread {0} already has a save in flight")]
    SavePending(ThreadId),
    #[error("no save in flight for thread {0}")]
    NoSavePending(ThreadId),
    #[error("save failed: {0}")]
    Persist(#[from] ServiceError),
}

// =============================================================================
// STROKES
// =============================================================================

/// One continuous pointer-down to pointer-up path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    #[must_use]
    pub fn first(&self) -> Option<&StrokePoint> {
        self.points.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Tight box around the stroke's points, without any border.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.points.iter().fold(BoundingBox::empty(), |acc, p| {
            acc.union(&BoundingBox::new(p.x, p.y, p.x, p.y))
        })
    }
}

/// Undo/redo log of finished strokes.
///
/// The visible strokes are exactly the undo stack. The two stacks never
/// share a stroke, and pushing a new stroke clears the redo stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeHistory {
    undo: Vec<Stroke>,
    redo: Vec<Stroke>,
}

impl StrokeHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stroke: Stroke) {
        self.redo.clear();
        self.undo.push(stroke);
    }

    /// Move the newest stroke to the redo stack. False when nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(stroke) = self.undo.pop() else {
            return false;
        };
        self.redo.push(stroke);
        true
    }

    /// Move the newest undone stroke back. False when nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(stroke) = self.redo.pop() else {
            return false;
        };
        self.undo.push(stroke);
        true
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.undo
    }

    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Lifecycle event names, used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTopic {
    LocationAssigned,
    DrawCommit,
    PageChanged,
    AvailableActions,
    AnnotationSaved,
    ThreadDeleted,
}

impl EventTopic {
    /// Wire name of the event.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::LocationAssigned => "locationassigned",
            Self::DrawCommit => "drawcommit",
            Self::PageChanged => "pagechanged",
            Self::AvailableActions => "availableactions",
            Self::AnnotationSaved => "annotationsaved",
            Self::ThreadDeleted => "threaddeleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ThreadEventKind {
    /// The thread received its first location. Emitted once per thread.
    LocationAssigned,
    /// A save was submitted; the thread no longer takes strokes.
    DrawCommit,
    /// Pointer input crossed onto another page at `location`.
    PageChanged { location: Location, timestamp: u64 },
    /// Undo/redo stack sizes after a stroke, undo, or redo.
    AvailableActions { undo: usize, redo: usize },
    /// The service confirmed the save; the thread is committed.
    AnnotationSaved,
    /// The thread was deleted or discarded.
    ThreadDeleted,
}

impl ThreadEventKind {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::LocationAssigned => EventTopic::LocationAssigned,
            Self::DrawCommit => EventTopic::DrawCommit,
            Self::PageChanged { .. } => EventTopic::PageChanged,
            Self::AvailableActions { .. } => EventTopic::AvailableActions,
            Self::AnnotationSaved => EventTopic::AnnotationSaved,
            Self::ThreadDeleted => EventTopic::ThreadDeleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadEvent {
    pub thread_id: ThreadId,
    #[serde(flatten)]
    pub kind: ThreadEventKind,
}

impl Routable for ThreadEvent {
    type Source = ThreadId;
    type Topic = EventTopic;

    fn source(&self) -> ThreadId {
        self.thread_id
    }

    fn topic(&self) -> EventTopic {
        self.kind.topic()
    }
}

// =============================================================================
// THREAD
// =============================================================================

#[derive(Debug, Clone)]
pub struct DrawingThread {
    id: ThreadId,
    sequence: u64,
    location: Option<ThreadLocation>,
    history: StrokeHistory,
    active: Option<Stroke>,
    status: ThreadStatus,
    save_pending: bool,
    boundary_visible: bool,
    border_offset: f64,
}

impl DrawingThread {
    /// Create a drafting thread with a fresh id.
    ///
    /// `sequence` orders threads by creation; `border_offset` pads every
    /// stroke point when growing the bounding box.
    #[must_use]
    pub fn new(sequence: u64, border_offset: f64) -> Self {
        Self::with_id(Uuid::new_v4(), sequence, border_offset)
    }

    #[must_use]
    pub fn with_id(id: ThreadId, sequence: u64, border_offset: f64) -> Self {
        Self {
            id,
            sequence,
            location: None,
            history: StrokeHistory::new(),
            active: None,
            status: ThreadStatus::Drafting,
            save_pending: false,
            boundary_visible: false,
            border_offset,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    #[must_use]
    pub fn location(&self) -> Option<ThreadLocation> {
        self.location
    }

    #[must_use]
    pub fn page(&self) -> Option<u32> {
        self.location.map(|l| l.page)
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.location.map(|l| l.bounds)
    }

    /// Finished, visible strokes in drawing order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        self.history.strokes()
    }

    #[must_use]
    pub fn active_stroke(&self) -> Option<&Stroke> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn is_save_pending(&self) -> bool {
        self.save_pending
    }

    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    #[must_use]
    pub fn boundary_visible(&self) -> bool {
        self.boundary_visible
    }

    /// Drafting threads with no save in flight accept stroke edits.
    #[must_use]
    pub fn accepts_strokes(&self) -> bool {
        self.status == ThreadStatus::Drafting && !self.save_pending
    }

    /// The payload a save would persist, once the thread has a location.
    #[must_use]
    pub fn to_annotation(&self) -> Option<DrawingAnnotation> {
        let loc = self.location?;
        Some(DrawingAnnotation { page: loc.page, bounds: loc.bounds, strokes: self.history.strokes().to_vec() })
    }

    // --- Pointer input ---

    /// Begin a stroke at `location`.
    ///
    /// Ignored while a stroke is active or the thread is locked. A start on a
    /// page other than the thread's emits `PageChanged` instead.
    pub fn handle_start(&mut self, location: &Location, timestamp: u64) -> Vec<ThreadEvent> {
        if !self.accepts_strokes() || self.active.is_some() {
            return Vec::new();
        }
        if self.has_page_changed(location) {
            return vec![self.event(ThreadEventKind::PageChanged { location: *location, timestamp })];
        }

        let mut events = Vec::new();
        if self.location.is_none() {
            self.location = Some(ThreadLocation { page: location.page, bounds: BoundingBox::empty() });
            events.push(self.event(ThreadEventKind::LocationAssigned));
        }
        let point = StrokePoint::new(location.x, location.y, timestamp);
        self.grow(point);
        self.active = Some(Stroke { points: vec![point] });
        events
    }

    /// Extend the active stroke. Crossing onto another page finishes the
    /// stroke and emits `PageChanged`.
    pub fn handle_move(&mut self, location: &Location, timestamp: u64) -> Vec<ThreadEvent> {
        if !self.accepts_strokes() || self.active.is_none() {
            return Vec::new();
        }
        if self.has_page_changed(location) {
            let mut events: Vec<ThreadEvent> = self.finish_stroke().into_iter().collect();
            events.push(self.event(ThreadEventKind::PageChanged { location: *location, timestamp }));
            return events;
        }

        let point = StrokePoint::new(location.x, location.y, timestamp);
        self.grow(point);
        if let Some(stroke) = self.active.as_mut() {
            stroke.points.push(point);
        }
        Vec::new()
    }

    /// Finish the active stroke, recording `location` as its last point when
    /// it is on the thread's page.
    pub fn handle_stop(&mut self, location: Option<&Location>, timestamp: u64) -> Vec<ThreadEvent> {
        if !self.accepts_strokes() || self.active.is_none() {
            return Vec::new();
        }
        if let Some(loc) = location.filter(|l| !self.has_page_changed(l)) {
            let point = StrokePoint::new(loc.x, loc.y, timestamp);
            self.grow(point);
            if let Some(stroke) = self.active.as_mut() {
                stroke.points.push(point);
            }
        }
        self.finish_stroke().into_iter().collect()
    }

    // --- Undo / redo ---

    pub fn undo(&mut self) -> Vec<ThreadEvent> {
        if !self.accepts_strokes() || self.active.is_some() || !self.history.undo() {
            return Vec::new();
        }
        vec![self.available_actions()]
    }

    pub fn redo(&mut self) -> Vec<ThreadEvent> {
        if !self.accepts_strokes() || self.active.is_some() || !self.history.redo() {
            return Vec::new();
        }
        vec![self.available_actions()]
    }

    // --- Persistence ---

    /// Submit the thread for saving and lock it against further edits.
    ///
    /// Any active stroke is finished first. On success the thread stays
    /// `Drafting` with a save pending until [`Self::complete_save`].
    ///
    /// # Errors
    ///
    /// `NotDrafting`, `SavePending`, `Empty` when there is nothing to save,
    /// or `Persist` when the service refused the submission. The thread is
    /// left drafting and unlocked in every error case.
    pub fn save_annotation(&mut self, service: &mut dyn AnnotationService) -> Result<Vec<ThreadEvent>, ThreadError> {
        if self.status != ThreadStatus::Drafting {
            return Err(ThreadError::NotDrafting(self.id));
        }
        if self.save_pending {
            return Err(ThreadError::SavePending(self.id));
        }

        let mut events: Vec<ThreadEvent> = self.finish_stroke().into_iter().collect();
        let annotation = match self.to_annotation() {
            Some(a) if !a.strokes.is_empty() => a,
            _ => return Err(ThreadError::Empty(self.id)),
        };

        service.save(SaveRequest { thread_id: self.id, annotation })?;
        self.save_pending = true;
        debug!(thread_id = %self.id, strokes = self.history.undo_count(), "save submitted");
        events.push(self.event(ThreadEventKind::DrawCommit));
        Ok(events)
    }

    /// Apply the service's answer to an outstanding save.
    ///
    /// # Errors
    ///
    /// `NoSavePending` when no save is outstanding (including after the
    /// thread was deleted), or `Persist` carrying the service failure, in
    /// which case the thread is drafting and unlocked again.
    pub fn complete_save(&mut self, result: Result<(), ServiceError>) -> Result<Vec<ThreadEvent>, ThreadError> {
        if !self.save_pending {
            return Err(ThreadError::NoSavePending(self.id));
        }
        self.save_pending = false;
        result?;
        self.status = ThreadStatus::Committed;
        Ok(vec![self.event(ThreadEventKind::AnnotationSaved)])
    }

    /// Mark the thread deleted. Committed threads are also deleted from the
    /// service. Idempotent.
    pub fn delete_thread(&mut self, service: &mut dyn AnnotationService) -> Vec<ThreadEvent> {
        if self.status == ThreadStatus::Deleted {
            return Vec::new();
        }
        let was_committed = self.status == ThreadStatus::Committed;
        self.status = ThreadStatus::Deleted;
        self.save_pending = false;
        self.active = None;
        self.boundary_visible = false;

        if was_committed {
            if let Err(e) = service.delete(self.id) {
                warn!(error = %e, thread_id = %self.id, "annotation delete failed");
            }
        }
        vec![self.event(ThreadEventKind::ThreadDeleted)]
    }

    // --- Selection visuals ---

    pub fn draw_boundary(&mut self) {
        self.boundary_visible = true;
    }

    pub fn clear_boundary(&mut self) {
        self.boundary_visible = false;
    }

    // --- Internals ---

    fn event(&self, kind: ThreadEventKind) -> ThreadEvent {
        ThreadEvent { thread_id: self.id, kind }
    }

    fn available_actions(&self) -> ThreadEvent {
        self.event(ThreadEventKind::AvailableActions {
            undo: self.history.undo_count(),
            redo: self.history.redo_count(),
        })
    }

    fn has_page_changed(&self, location: &Location) -> bool {
        self.location.is_some_and(|l| l.page != location.page)
    }

    /// Union the padded point into the bounding box. Never shrinks.
    fn grow(&mut self, point: StrokePoint) {
        let padded = BoundingBox::around(Point::new(point.x, point.y), self.border_offset);
        if let Some(loc) = self.location.as_mut() {
            loc.bounds = loc.bounds.union(&padded);
        }
    }

    fn finish_stroke(&mut self) -> Option<ThreadEvent> {
        let stroke = self.active.take()?;
        if stroke.is_empty() {
            return None;
        }
        self.history.push(stroke);
        Some(self.available_actions())
    }
}

impl Indexable for DrawingThread {
    type Key = ThreadId;

    fn index_key(&self) -> ThreadId {
        self.id
    }

    fn index_bounds(&self) -> Option<BoundingBox> {
        if self.status == ThreadStatus::Deleted {
            return None;
        }
        self.bounds()
    }
}
