use uuid::Uuid;

use super::*;
use crate::geom::StrokePoint;

fn annotation(page: u32) -> DrawingAnnotation {
    DrawingAnnotation {
        page,
        bounds: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        strokes: vec![Stroke { points: vec![StrokePoint::new(5.0, 5.0, 1)] }],
    }
}

fn save_request(page: u32) -> SaveRequest {
    SaveRequest { thread_id: Uuid::new_v4(), annotation: annotation(page) }
}

// =============================================================================
// ChannelService
// =============================================================================

#[tokio::test]
async fn channel_service_forwards_save() {
    let (mut service, mut rx) = ChannelService::channel();
    let req = save_request(1);
    service.save(req.clone()).unwrap();
    assert_eq!(rx.recv().await, Some(ServiceRequest::Save(req)));
}

#[tokio::test]
async fn channel_service_forwards_delete() {
    let (mut service, mut rx) = ChannelService::channel();
    let id = Uuid::new_v4();
    service.delete(id).unwrap();
    assert_eq!(rx.recv().await, Some(ServiceRequest::Delete(id)));
}

#[test]
fn channel_service_reports_disconnect() {
    let (mut service, rx) = ChannelService::channel();
    drop(rx);
    assert_eq!(service.save(save_request(1)), Err(ServiceError::Disconnected));
    assert_eq!(service.delete(Uuid::new_v4()), Err(ServiceError::Disconnected));
}

// =============================================================================
// LoopbackBackend
// =============================================================================

#[tokio::test]
async fn loopback_stores_saved_annotation() {
    let backend = LoopbackBackend::new();
    let req = save_request(2);
    let outcome = backend.handle(ServiceRequest::Save(req.clone())).await;
    assert_eq!(outcome, Some(SaveOutcome::saved(req.thread_id)));
    assert_eq!(backend.store().read().await.get(&req.thread_id), Some(&req.annotation));
}

#[tokio::test]
async fn loopback_rejects_configured_page() {
    let backend = LoopbackBackend::new().rejecting_page(3);
    let req = save_request(3);
    let outcome = backend.handle(ServiceRequest::Save(req.clone())).await.unwrap();
    assert_eq!(outcome.thread_id, req.thread_id);
    assert!(matches!(outcome.result, Err(ServiceError::Rejected(_))));
    assert!(backend.store().read().await.is_empty());
}

#[tokio::test]
async fn loopback_delete_removes_and_reports_nothing() {
    let backend = LoopbackBackend::new();
    let req = save_request(1);
    backend.handle(ServiceRequest::Save(req.clone())).await;
    assert_eq!(backend.handle(ServiceRequest::Delete(req.thread_id)).await, None);
    assert!(backend.store().read().await.is_empty());
    // Unknown ids are tolerated.
    assert_eq!(backend.handle(ServiceRequest::Delete(Uuid::new_v4())).await, None);
}

#[tokio::test]
async fn spawned_backend_round_trips_outcomes() {
    let backend = LoopbackBackend::new().rejecting_page(9);
    let store = backend.store();
    let (mut service, requests) = ChannelService::channel();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let handle = backend.spawn(requests, outcome_tx);

    let ok = save_request(1);
    let bad = save_request(9);
    service.save(ok.clone()).unwrap();
    service.save(bad.clone()).unwrap();

    assert_eq!(outcomes.recv().await, Some(SaveOutcome::saved(ok.thread_id)));
    let second = outcomes.recv().await.unwrap();
    assert_eq!(second.thread_id, bad.thread_id);
    assert!(second.result.is_err());

    drop(service);
    handle.await.unwrap();
    assert_eq!(store.read().await.len(), 1);
}

// =============================================================================
// Serde
// =============================================================================

#[test]
fn save_outcome_serializes_result() {
    let id = Uuid::nil();
    let json = serde_json::to_value(SaveOutcome::failed(id, ServiceError::Disconnected)).unwrap();
    assert_eq!(json["result"]["Err"], serde_json::json!("Disconnected"));
    let ok = serde_json::to_value(SaveOutcome::saved(id)).unwrap();
    assert_eq!(ok["result"]["Ok"], serde_json::Value::Null);
}
