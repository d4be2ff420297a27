//! Drawing mode controller: thread lifecycle, input routing and hit-testing.
//!
//! DESIGN
//! ======
//! The controller owns every drawing thread in a registry keyed by id and
//! files committed threads in a [`SpatialIndex`] for hit-testing. While the
//! mode is active a [`ModeSession`] holds the current draft and the binding
//! table that routes pointer events and toolbar commands to it.
//!
//! Threads report lifecycle changes as returned [`ThreadEvent`]s. The
//! controller publishes them to its [`EventRouter`] and drains deliveries
//! until the queue is empty, so a handler that produces more events (a page
//! change saving the old thread and starting a new one) is processed in the
//! same call. Each thread gets two listeners:
//!
//! - annotation: `locationassigned`, `drawcommit`, `pagechanged`,
//!   `availableactions`. Dropped on `drawcommit`.
//! - lifecycle: `annotationsaved`, `threaddeleted`. Dropped with the rest of
//!   the thread's listeners on `threaddeleted`.
//!
//! Every public entry point returns the [`Action`]s the host should apply.
//! Missing input (no session, unknown thread, unresolvable location) yields
//! no actions.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::{ControllerConfig, TieBreak};
use crate::geom::{BoundingBox, Location};
use crate::index::SpatialIndex;
use crate::input::{Command, Handler, LocationResolver, ModeBindings, PointerEvent, Trigger};
use crate::router::{EventRouter, ListenerId};
use crate::service::{AnnotationService, SaveOutcome};
use crate::thread::{DrawingThread, EventTopic, ThreadError, ThreadEvent, ThreadEventKind, ThreadId, ThreadStatus};

const ANNOTATION_TOPICS: [EventTopic; 4] = [
    EventTopic::LocationAssigned,
    EventTopic::DrawCommit,
    EventTopic::PageChanged,
    EventTopic::AvailableActions,
];

const LIFECYCLE_TOPICS: [EventTopic; 2] = [EventTopic::AnnotationSaved, EventTopic::ThreadDeleted];

/// Effects returned from controller entry points for the host to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    SetUndoEnabled(bool),
    SetRedoEnabled(bool),
    /// A draft received its first location.
    ThreadPlaced { id: ThreadId, page: u32 },
    DrawBoundary { id: ThreadId },
    ClearBoundary { id: ThreadId },
    /// Redraw a thread that a deleted thread may have covered.
    ShowThread { id: ThreadId },
    /// The thread was saved and is now hit-testable.
    ThreadSaved { id: ThreadId },
    ThreadDeleted { id: ThreadId },
    /// The save was refused; the thread is kept as a draft for retry.
    SaveFailed { id: ThreadId, message: String },
    ModeExited,
}

/// Toolbar undo/redo state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Affordances {
    pub undo: bool,
    pub redo: bool,
}

/// State that exists only while drawing mode is active.
#[derive(Debug, Clone, Default)]
pub struct ModeSession {
    /// The in-progress draft. Only `None` while a page change swaps drafts.
    pub current: Option<ThreadId>,
    pub bindings: ModeBindings,
}

pub struct DrawingModeController<R, S> {
    config: ControllerConfig,
    resolver: R,
    service: S,
    threads: HashMap<ThreadId, DrawingThread>,
    index: SpatialIndex<ThreadId>,
    router: EventRouter<ThreadEvent>,
    annotation_listeners: HashMap<ThreadId, ListenerId>,
    session: Option<ModeSession>,
    selected: Option<ThreadId>,
    affordances: Affordances,
    rng: StdRng,
    next_sequence: u64,
}

impl<R: LocationResolver, S: AnnotationService> DrawingModeController<R, S> {
    #[must_use]
    pub fn new(config: ControllerConfig, resolver: R, service: S) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            index: SpatialIndex::with_node_capacity(config.node_capacity),
            config,
            resolver,
            service,
            threads: HashMap::new(),
            router: EventRouter::new(),
            annotation_listeners: HashMap::new(),
            session: None,
            selected: None,
            affordances: Affordances::default(),
            rng,
            next_sequence: 1,
        }
    }

    // --- Mode lifecycle ---

    /// Enter drawing mode with a fresh draft. No-op when already active.
    pub fn activate(&mut self) -> Vec<Action> {
        if self.session.is_some() {
            debug!("drawing mode already active");
            return Vec::new();
        }
        let id = self.create_thread();
        self.session = Some(ModeSession { current: Some(id), bindings: ModeBindings::for_thread(id) });
        info!(thread_id = %id, "drawing mode activated");
        self.reset_affordances()
    }

    /// Leave drawing mode, discarding an unsaved draft.
    pub fn deactivate(&mut self) -> Vec<Action> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        if let Some(id) = session.current {
            actions.extend(self.discard_draft(id));
        }
        let purged = self.purge_deleted();
        info!(purged, "drawing mode deactivated");
        actions.push(Action::ModeExited);
        actions
    }

    // --- Input ---

    /// Route a pointer event through the session bindings.
    pub fn on_pointer(&mut self, event: &PointerEvent) -> Vec<Action> {
        let Some(session) = &self.session else {
            trace!("pointer event ignored: mode inactive");
            return Vec::new();
        };
        let Some((id, handler)) = session.bindings.resolve(Trigger::from(event)) else {
            return Vec::new();
        };
        let location = self.resolver.location_from_event(event);
        let Some(thread) = self.threads.get_mut(&id) else {
            return Vec::new();
        };

        let events = match (handler, location) {
            (Handler::Start, Some(loc)) => thread.handle_start(&loc, event.timestamp),
            (Handler::Move, Some(loc)) => thread.handle_move(&loc, event.timestamp),
            (Handler::Stop, loc) => thread.handle_stop(loc.as_ref(), event.timestamp),
            _ => return Vec::new(),
        };
        self.dispatch(events)
    }

    /// Route a toolbar command through the session bindings.
    pub fn on_command(&mut self, command: Command) -> Vec<Action> {
        let Some((id, handler)) = self
            .session
            .as_ref()
            .and_then(|s| s.bindings.resolve(Trigger::from(command)))
        else {
            debug!(?command, "command ignored: mode inactive");
            return Vec::new();
        };

        match handler {
            Handler::Save => self.commit(id),
            Handler::Undo | Handler::Redo => {
                let Some(thread) = self.threads.get_mut(&id) else {
                    return Vec::new();
                };
                let events = if handler == Handler::Undo { thread.undo() } else { thread.redo() };
                self.dispatch(events)
            }
            Handler::Start | Handler::Move | Handler::Stop => Vec::new(),
        }
    }

    // --- Persistence ---

    /// Apply one asynchronous save result.
    pub fn on_save_outcome(&mut self, outcome: SaveOutcome) -> Vec<Action> {
        let id = outcome.thread_id;
        let Some(thread) = self.threads.get_mut(&id) else {
            debug!(thread_id = %id, "save outcome for unknown thread");
            return Vec::new();
        };
        match thread.complete_save(outcome.result) {
            Ok(events) => self.dispatch(events),
            Err(ThreadError::Persist(e)) => {
                warn!(error = %e, thread_id = %id, "annotation save failed");
                vec![Action::SaveFailed { id, message: e.to_string() }]
            }
            Err(e) => {
                debug!(error = %e, "save outcome ignored");
                Vec::new()
            }
        }
    }

    /// Apply every save result currently waiting on `outcomes`.
    pub fn pump_outcomes(&mut self, outcomes: &mut mpsc::UnboundedReceiver<SaveOutcome>) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Ok(outcome) = outcomes.try_recv() {
            actions.extend(self.on_save_outcome(outcome));
        }
        actions
    }

    /// Resubmit a draft whose save failed.
    pub fn retry_save(&mut self, id: ThreadId) -> Vec<Action> {
        if self.session.as_ref().is_some_and(|s| s.current == Some(id)) {
            debug!(thread_id = %id, "retry ignored: thread is the current draft");
            return Vec::new();
        }
        self.save_thread(id)
    }

    // --- Selection ---

    /// Hit-test the pointer against committed threads and select one.
    pub fn handle_selection(&mut self, event: &PointerEvent) -> Vec<Action> {
        let Some(location) = self.resolver.location_from_event(event) else {
            return Vec::new();
        };
        let candidates = self.hits_at(&location);

        let mut actions = match self.selected {
            Some(prev) => self.hide_boundary(prev),
            None => Vec::new(),
        };
        let Some(id) = self.pick(&candidates) else {
            self.selected = None;
            return actions;
        };
        actions.extend(self.select(id));
        actions
    }

    /// Select `id`, or delete it when it is already selected. Selecting a
    /// new thread hides the previous selection's boundary first.
    pub fn select(&mut self, id: ThreadId) -> Vec<Action> {
        match self.threads.get(&id) {
            Some(thread) if thread.status() == ThreadStatus::Committed => {}
            Some(_) => {
                debug!(thread_id = %id, "only committed threads are selectable");
                return Vec::new();
            }
            None => return Vec::new(),
        }

        let mut actions = match self.selected {
            Some(prev) => self.hide_boundary(prev),
            None => Vec::new(),
        };
        if self.selected != Some(id) {
            if let Some(thread) = self.threads.get_mut(&id) {
                thread.draw_boundary();
                self.selected = Some(id);
                actions.push(Action::DrawBoundary { id });
            }
            return actions;
        }

        let Some(thread) = self.threads.get_mut(&id) else {
            return actions;
        };
        let covered = thread.bounds();
        let events = thread.delete_thread(&mut self.service);
        actions.extend(self.dispatch(events));
        self.selected = None;
        if let Some(bbox) = covered {
            actions.extend(self.index.search(&bbox).into_iter().map(|id| Action::ShowThread { id }));
        }
        actions
    }

    /// Clear `id`'s boundary if it is showing.
    fn hide_boundary(&mut self, id: ThreadId) -> Vec<Action> {
        match self.threads.get_mut(&id) {
            Some(thread) if thread.boundary_visible() => {
                thread.clear_boundary();
                vec![Action::ClearBoundary { id }]
            }
            _ => Vec::new(),
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&ModeSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.session.as_ref().and_then(|s| s.current)
    }

    #[must_use]
    pub fn thread(&self, id: &ThreadId) -> Option<&DrawingThread> {
        self.threads.get(id)
    }

    pub fn threads(&self) -> impl Iterator<Item = &DrawingThread> {
        self.threads.values()
    }

    #[must_use]
    pub fn selected(&self) -> Option<ThreadId> {
        self.selected
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        self.affordances
    }

    #[must_use]
    pub fn index(&self) -> &SpatialIndex<ThreadId> {
        &self.index
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.router.listener_count()
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Drop deleted threads from the registry. Returns how many were removed.
    pub fn purge_deleted(&mut self) -> usize {
        let before = self.threads.len();
        self.threads.retain(|_, t| t.status() != ThreadStatus::Deleted);
        before - self.threads.len()
    }

    // --- Internals ---

    fn create_thread(&mut self) -> ThreadId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let thread = DrawingThread::new(sequence, self.config.border_offset);
        let id = thread.id();

        let listener = self.router.subscribe(id, &ANNOTATION_TOPICS);
        self.annotation_listeners.insert(id, listener);
        self.router.subscribe(id, &LIFECYCLE_TOPICS);
        self.threads.insert(id, thread);
        debug!(thread_id = %id, sequence, "thread created");
        id
    }

    /// Post the draft and leave the mode.
    fn commit(&mut self, id: ThreadId) -> Vec<Action> {
        if let Some(session) = self.session.as_mut() {
            if session.current == Some(id) {
                session.current = None;
            }
        }
        let mut actions = self.save_thread(id);
        actions.extend(self.deactivate());
        actions
    }

    /// Submit `id` for saving. An empty draft is discarded instead.
    fn save_thread(&mut self, id: ThreadId) -> Vec<Action> {
        let Some(thread) = self.threads.get_mut(&id) else {
            return Vec::new();
        };
        match thread.save_annotation(&mut self.service) {
            Ok(events) => self.dispatch(events),
            Err(ThreadError::Empty(_)) => {
                debug!(thread_id = %id, "discarding empty draft");
                let events = thread.delete_thread(&mut self.service);
                self.dispatch(events)
            }
            Err(ThreadError::Persist(e)) => {
                warn!(error = %e, thread_id = %id, "annotation save submission failed");
                vec![Action::SaveFailed { id, message: e.to_string() }]
            }
            Err(e) => {
                debug!(error = %e, "save skipped");
                Vec::new()
            }
        }
    }

    fn discard_draft(&mut self, id: ThreadId) -> Vec<Action> {
        let Some(thread) = self.threads.get_mut(&id) else {
            return Vec::new();
        };
        if thread.is_save_pending() {
            return Vec::new();
        }
        let events = thread.delete_thread(&mut self.service);
        self.dispatch(events)
    }

    /// Publish `events` and handle deliveries until the queue drains.
    fn dispatch(&mut self, events: Vec<ThreadEvent>) -> Vec<Action> {
        self.router.publish_all(events);
        let mut actions = Vec::new();
        while let Some(delivery) = self.router.next_delivery() {
            actions.extend(self.handle_event(delivery.event));
        }
        actions
    }

    fn handle_event(&mut self, event: ThreadEvent) -> Vec<Action> {
        let id = event.thread_id;
        trace!(thread_id = %id, topic = event.kind.topic().name(), "thread event");
        match event.kind {
            ThreadEventKind::LocationAssigned => self
                .threads
                .get(&id)
                .and_then(DrawingThread::page)
                .map(|page| vec![Action::ThreadPlaced { id, page }])
                .unwrap_or_default(),
            ThreadEventKind::DrawCommit => {
                if let Some(listener) = self.annotation_listeners.remove(&id) {
                    self.router.unsubscribe(listener);
                }
                Vec::new()
            }
            ThreadEventKind::PageChanged { location, timestamp } => self.on_page_changed(id, location, timestamp),
            ThreadEventKind::AvailableActions { undo, redo } => self.update_affordances(undo, redo),
            ThreadEventKind::AnnotationSaved => self.register_thread(id),
            ThreadEventKind::ThreadDeleted => self.unregister_thread(id),
        }
    }

    /// Save the old draft and continue drawing on a new thread at `location`.
    fn on_page_changed(&mut self, old: ThreadId, location: Location, timestamp: u64) -> Vec<Action> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.current != Some(old) {
            return Vec::new();
        }
        session.current = None;
        session.bindings.clear();

        let mut actions = self.save_thread(old);

        let new = self.create_thread();
        if let Some(session) = self.session.as_mut() {
            session.current = Some(new);
            session.bindings = ModeBindings::for_thread(new);
        }
        debug!(old = %old, new = %new, page = location.page, "page changed mid-draw");
        actions.extend(self.reset_affordances());

        if let Some(thread) = self.threads.get_mut(&new) {
            let events = thread.handle_start(&location, timestamp);
            actions.extend(self.dispatch(events));
        }
        actions
    }

    fn update_affordances(&mut self, undo: usize, redo: usize) -> Vec<Action> {
        let mut actions = Vec::new();
        match undo {
            0 | 1 => {
                self.affordances.undo = undo == 1;
                actions.push(Action::SetUndoEnabled(undo == 1));
            }
            _ => {}
        }
        match redo {
            0 | 1 => {
                self.affordances.redo = redo == 1;
                actions.push(Action::SetRedoEnabled(redo == 1));
            }
            _ => {}
        }
        actions
    }

    fn reset_affordances(&mut self) -> Vec<Action> {
        self.affordances = Affordances::default();
        vec![Action::SetUndoEnabled(false), Action::SetRedoEnabled(false)]
    }

    fn register_thread(&mut self, id: ThreadId) -> Vec<Action> {
        let Some(thread) = self.threads.get(&id) else {
            return Vec::new();
        };
        if let Err(e) = self.index.insert(thread) {
            warn!(error = %e, "saved thread could not be indexed");
        }
        vec![Action::ThreadSaved { id }]
    }

    /// Drop `id` from the index and the router. Hosts only hear about threads
    /// that were ever placed on a page.
    fn unregister_thread(&mut self, id: ThreadId) -> Vec<Action> {
        self.index.remove_key(&id);
        self.router.unsubscribe_source(id);
        self.annotation_listeners.remove(&id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        let placed = self.threads.get(&id).is_some_and(|t| t.location().is_some());
        if placed { vec![Action::ThreadDeleted { id }] } else { Vec::new() }
    }

    /// Committed threads on `location`'s page within the hit box, as
    /// `(id, sequence)` in creation order.
    fn hits_at(&self, location: &Location) -> Vec<(ThreadId, u64)> {
        let query = BoundingBox::around(location.point(), self.config.border_offset);
        let mut hits: Vec<(ThreadId, u64)> = self
            .index
            .search(&query)
            .into_iter()
            .filter_map(|id| self.threads.get(&id))
            .filter(|t| t.page() == Some(location.page))
            .map(|t| (t.id(), t.sequence()))
            .collect();
        hits.sort_by_key(|&(_, sequence)| sequence);
        hits
    }

    fn pick(&mut self, candidates: &[(ThreadId, u64)]) -> Option<ThreadId> {
        if candidates.is_empty() {
            return None;
        }
        let chosen = match self.config.tie_break {
            TieBreak::Random => candidates.get(self.rng.random_range(0..candidates.len())),
            TieBreak::MostRecent => candidates.iter().max_by_key(|&&(_, sequence)| sequence),
        };
        chosen.map(|&(id, _)| id)
    }
}
