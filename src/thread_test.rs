#![allow(clippy::float_cmp)]

use super::*;
use crate::consts::DRAW_BORDER_OFFSET;

// =============================================================
// Helpers
// =============================================================

#[derive(Debug, Default)]
struct RecordingService {
    saves: Vec<SaveRequest>,
    deletes: Vec<ThreadId>,
    fail_saves: bool,
}

impl AnnotationService for RecordingService {
    fn save(&mut self, request: SaveRequest) -> Result<(), ServiceError> {
        if self.fail_saves {
            return Err(ServiceError::Disconnected);
        }
        self.saves.push(request);
        Ok(())
    }

    fn delete(&mut self, thread_id: ThreadId) -> Result<(), ServiceError> {
        self.deletes.push(thread_id);
        Ok(())
    }
}

fn thread() -> DrawingThread {
    DrawingThread::new(1, DRAW_BORDER_OFFSET)
}

fn at(x: f64, y: f64) -> Location {
    Location::new(x, y, 1)
}

fn kinds(events: &[ThreadEvent]) -> Vec<ThreadEventKind> {
    events.iter().map(|e| e.kind.clone()).collect()
}

/// Draw one stroke through `points` on page 1.
fn stroke(t: &mut DrawingThread, points: &[(f64, f64)]) -> Vec<ThreadEvent> {
    let mut events = Vec::new();
    let (first, rest) = points.split_first().unwrap();
    events.extend(t.handle_start(&at(first.0, first.1), 0));
    for (i, (x, y)) in rest.iter().enumerate() {
        events.extend(t.handle_move(&at(*x, *y), i as u64 + 1));
    }
    events.extend(t.handle_stop(None, 99));
    events
}

fn committed_thread(service: &mut RecordingService) -> DrawingThread {
    let mut t = thread();
    stroke(&mut t, &[(10.0, 10.0), (20.0, 20.0)]);
    t.save_annotation(service).unwrap();
    t.complete_save(Ok(())).unwrap();
    t
}

// =============================================================
// Stroke input
// =============================================================

#[test]
fn new_thread_is_unlocated_draft() {
    let t = thread();
    assert_eq!(t.status(), ThreadStatus::Drafting);
    assert!(t.location().is_none());
    assert!(t.strokes().is_empty());
    assert!(t.index_bounds().is_none());
}

#[test]
fn first_start_assigns_location_once() {
    let mut t = thread();
    let events = t.handle_start(&at(10.0, 10.0), 0);
    assert_eq!(kinds(&events), vec![ThreadEventKind::LocationAssigned]);
    assert_eq!(t.page(), Some(1));
    t.handle_stop(None, 1);

    let again = t.handle_start(&at(30.0, 30.0), 2);
    assert!(again.is_empty());
}

#[test]
fn stop_finishes_stroke_and_reports_actions() {
    let mut t = thread();
    let events = stroke(&mut t, &[(0.0, 0.0), (5.0, 5.0)]);
    assert_eq!(
        kinds(&events),
        vec![ThreadEventKind::LocationAssigned, ThreadEventKind::AvailableActions { undo: 1, redo: 0 }]
    );
    assert_eq!(t.strokes().len(), 1);
    assert_eq!(t.strokes()[0].len(), 2);
    assert!(!t.is_drawing());
}

#[test]
fn stop_appends_final_point_on_same_page() {
    let mut t = thread();
    t.handle_start(&at(0.0, 0.0), 0);
    t.handle_stop(Some(&at(8.0, 8.0)), 5);
    assert_eq!(t.strokes()[0].points, vec![StrokePoint::new(0.0, 0.0, 0), StrokePoint::new(8.0, 8.0, 5)]);
}

#[test]
fn move_without_start_is_ignored() {
    let mut t = thread();
    assert!(t.handle_move(&at(1.0, 1.0), 0).is_empty());
    assert!(t.handle_stop(None, 0).is_empty());
    assert!(t.location().is_none());
}

#[test]
fn start_while_drawing_is_ignored() {
    let mut t = thread();
    t.handle_start(&at(0.0, 0.0), 0);
    assert!(t.handle_start(&at(50.0, 50.0), 1).is_empty());
    assert_eq!(t.active_stroke().map(Stroke::len), Some(1));
}

// =============================================================
// Bounding box
// =============================================================

#[test]
fn bounds_are_union_of_padded_points() {
    let mut t = thread();
    stroke(&mut t, &[(10.0, 10.0), (30.0, 5.0), (20.0, 40.0)]);
    let off = DRAW_BORDER_OFFSET;
    assert_eq!(t.bounds(), Some(BoundingBox::new(10.0 - off, 5.0 - off, 30.0 + off, 40.0 + off)));
}

#[test]
fn bounds_do_not_depend_on_point_order() {
    let pts = [(3.0, 7.0), (-4.0, 12.0), (15.0, 1.0), (8.0, 8.0)];
    let mut forward = thread();
    stroke(&mut forward, &pts);
    let mut reversed_pts = pts;
    reversed_pts.reverse();
    let mut backward = thread();
    stroke(&mut backward, &reversed_pts);
    assert_eq!(forward.bounds(), backward.bounds());
}

#[test]
fn bounds_never_shrink_on_undo() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    stroke(&mut t, &[(100.0, 100.0)]);
    let before = t.bounds();
    t.undo();
    assert_eq!(t.bounds(), before);
}

// =============================================================
// Page changes
// =============================================================

#[test]
fn start_on_other_page_emits_page_changed() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    let loc = Location::new(4.0, 4.0, 2);
    let events = t.handle_start(&loc, 7);
    assert_eq!(kinds(&events), vec![ThreadEventKind::PageChanged { location: loc, timestamp: 7 }]);
    assert!(!t.is_drawing());
    assert_eq!(t.page(), Some(1));
}

#[test]
fn move_onto_other_page_finishes_stroke_first() {
    let mut t = thread();
    t.handle_start(&at(0.0, 0.0), 0);
    t.handle_move(&at(1.0, 1.0), 1);
    let loc = Location::new(2.0, 2.0, 2);
    let events = t.handle_move(&loc, 2);
    assert_eq!(
        kinds(&events),
        vec![
            ThreadEventKind::AvailableActions { undo: 1, redo: 0 },
            ThreadEventKind::PageChanged { location: loc, timestamp: 2 },
        ]
    );
    assert_eq!(t.strokes()[0].len(), 2);
    assert!(!t.is_drawing());
}

#[test]
fn stop_on_other_page_skips_final_point() {
    let mut t = thread();
    t.handle_start(&at(0.0, 0.0), 0);
    t.handle_stop(Some(&Location::new(9.0, 9.0, 3)), 1);
    assert_eq!(t.strokes()[0].len(), 1);
}

// =============================================================
// Undo / redo
// =============================================================

#[test]
fn undo_then_redo_restores_strokes() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    stroke(&mut t, &[(10.0, 10.0)]);
    let before = t.strokes().to_vec();

    assert_eq!(kinds(&t.undo()), vec![ThreadEventKind::AvailableActions { undo: 1, redo: 1 }]);
    assert_eq!(t.strokes().len(), 1);
    assert_eq!(kinds(&t.redo()), vec![ThreadEventKind::AvailableActions { undo: 2, redo: 0 }]);
    assert_eq!(t.strokes(), before.as_slice());
}

#[test]
fn redo_requires_prior_undo() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    assert!(t.redo().is_empty());
    assert_eq!(t.redo_count(), 0);
}

#[test]
fn undo_on_empty_history_is_noop() {
    let mut t = thread();
    assert!(t.undo().is_empty());
}

#[test]
fn new_stroke_clears_redo() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    stroke(&mut t, &[(10.0, 10.0)]);
    t.undo();
    assert_eq!(t.redo_count(), 1);
    let events = stroke(&mut t, &[(20.0, 20.0)]);
    assert_eq!(kinds(&events), vec![ThreadEventKind::AvailableActions { undo: 2, redo: 0 }]);
    assert!(t.redo().is_empty());
}

#[test]
fn undo_while_drawing_is_ignored() {
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    t.handle_start(&at(5.0, 5.0), 1);
    assert!(t.undo().is_empty());
    assert_eq!(t.undo_count(), 1);
}

#[test]
fn history_stacks_stay_disjoint() {
    let mut h = StrokeHistory::new();
    h.push(Stroke { points: vec![StrokePoint::new(1.0, 1.0, 0)] });
    h.push(Stroke { points: vec![StrokePoint::new(2.0, 2.0, 0)] });
    assert!(h.undo());
    assert!(h.undo());
    assert!(!h.undo());
    assert_eq!((h.undo_count(), h.redo_count()), (0, 2));
    assert!(h.redo());
    assert_eq!(h.strokes()[0].first(), Some(&StrokePoint::new(1.0, 1.0, 0)));
}

// =============================================================
// Save
// =============================================================

#[test]
fn save_submits_payload_and_locks_thread() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0), (4.0, 4.0)]);

    let events = t.save_annotation(&mut service).unwrap();
    assert_eq!(kinds(&events), vec![ThreadEventKind::DrawCommit]);
    assert!(t.is_save_pending());
    assert_eq!(service.saves.len(), 1);
    assert_eq!(service.saves[0].thread_id, t.id());
    assert_eq!(service.saves[0].annotation.strokes.len(), 1);

    assert!(t.handle_start(&at(1.0, 1.0), 9).is_empty());
    assert!(t.undo().is_empty());
    assert_eq!(t.save_annotation(&mut service), Err(ThreadError::SavePending(t.id())));
}

#[test]
fn save_finishes_active_stroke() {
    let mut service = RecordingService::default();
    let mut t = thread();
    t.handle_start(&at(0.0, 0.0), 0);
    let events = t.save_annotation(&mut service).unwrap();
    assert_eq!(
        kinds(&events),
        vec![ThreadEventKind::AvailableActions { undo: 1, redo: 0 }, ThreadEventKind::DrawCommit]
    );
    assert!(!t.is_drawing());
}

#[test]
fn save_empty_thread_fails() {
    let mut service = RecordingService::default();
    let mut t = thread();
    assert_eq!(t.save_annotation(&mut service), Err(ThreadError::Empty(t.id())));
    assert!(service.saves.is_empty());
}

#[test]
fn save_with_everything_undone_fails() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    t.undo();
    assert_eq!(t.save_annotation(&mut service), Err(ThreadError::Empty(t.id())));
}

#[test]
fn submission_failure_leaves_thread_editable() {
    let mut service = RecordingService { fail_saves: true, ..RecordingService::default() };
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    let err = t.save_annotation(&mut service).unwrap_err();
    assert_eq!(err, ThreadError::Persist(ServiceError::Disconnected));
    assert!(!t.is_save_pending());
    assert_eq!(t.status(), ThreadStatus::Drafting);
    assert!(t.accepts_strokes());
}

#[test]
fn complete_save_commits() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    t.save_annotation(&mut service).unwrap();
    let events = t.complete_save(Ok(())).unwrap();
    assert_eq!(kinds(&events), vec![ThreadEventKind::AnnotationSaved]);
    assert_eq!(t.status(), ThreadStatus::Committed);
    assert!(t.index_bounds().is_some());
    assert_eq!(t.save_annotation(&mut service), Err(ThreadError::NotDrafting(t.id())));
}

#[test]
fn failed_completion_returns_to_draft() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    t.save_annotation(&mut service).unwrap();
    let err = t.complete_save(Err(ServiceError::Rejected("nope".into()))).unwrap_err();
    assert!(matches!(err, ThreadError::Persist(ServiceError::Rejected(_))));
    assert_eq!(t.status(), ThreadStatus::Drafting);
    assert!(!t.is_save_pending());
    // A retry is allowed.
    assert!(t.save_annotation(&mut service).is_ok());
}

#[test]
fn complete_without_pending_save_errors() {
    let mut t = thread();
    assert_eq!(t.complete_save(Ok(())), Err(ThreadError::NoSavePending(t.id())));
}

// =============================================================
// Delete
// =============================================================

#[test]
fn delete_draft_skips_service() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    let events = t.delete_thread(&mut service);
    assert_eq!(kinds(&events), vec![ThreadEventKind::ThreadDeleted]);
    assert_eq!(t.status(), ThreadStatus::Deleted);
    assert!(service.deletes.is_empty());
    assert!(t.index_bounds().is_none());
}

#[test]
fn delete_committed_calls_service_once() {
    let mut service = RecordingService::default();
    let mut t = committed_thread(&mut service);
    t.draw_boundary();
    t.delete_thread(&mut service);
    assert!(t.delete_thread(&mut service).is_empty());
    assert_eq!(service.deletes, vec![t.id()]);
    assert!(!t.boundary_visible());
}

#[test]
fn delete_clears_pending_save() {
    let mut service = RecordingService::default();
    let mut t = thread();
    stroke(&mut t, &[(0.0, 0.0)]);
    t.save_annotation(&mut service).unwrap();
    t.delete_thread(&mut service);
    assert_eq!(t.complete_save(Ok(())), Err(ThreadError::NoSavePending(t.id())));
    assert_eq!(t.status(), ThreadStatus::Deleted);
}

// =============================================================
// Boundary / events
// =============================================================

#[test]
fn boundary_toggles() {
    let mut t = thread();
    t.draw_boundary();
    assert!(t.boundary_visible());
    t.clear_boundary();
    assert!(!t.boundary_visible());
}

#[test]
fn topic_names_match_wire_names() {
    assert_eq!(EventTopic::LocationAssigned.name(), "locationassigned");
    assert_eq!(EventTopic::AvailableActions.name(), "availableactions");
    assert_eq!(EventTopic::ThreadDeleted.name(), "threaddeleted");
}

#[test]
fn event_serializes_with_type_tag() {
    let ev = ThreadEvent {
        thread_id: Uuid::nil(),
        kind: ThreadEventKind::AvailableActions { undo: 2, redo: 1 },
    };
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["type"], "availableactions");
    assert_eq!(json["undo"], 2);
    assert_eq!(ev.topic(), EventTopic::AvailableActions);
    assert_eq!(ev.source(), Uuid::nil());
}
