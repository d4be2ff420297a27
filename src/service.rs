//! Annotation service seam: save and delete of drawing annotations.
//!
//! DESIGN
//! ======
//! Persistence is fire-and-continue. [`AnnotationService::save`] only
//! submits a request; the result arrives later as a [`SaveOutcome`] that the
//! host feeds back into the controller. [`ChannelService`] is the tokio
//! adapter: requests go out over an unbounded mpsc channel and outcomes come
//! back over another, drained by
//! [`crate::controller::DrawingModeController::pump_outcomes`].
//! [`LoopbackBackend`] is an in-process consumer of that channel used by the
//! replay binary and tests.

#[cfg(test)]
#[path = "service_test.rs"]
mod service_test;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::geom::BoundingBox;
use crate::thread::{Stroke, ThreadId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ServiceError {
    #[error("annotation service disconnected")]
    Disconnected,
    #[error("annotation rejected: {0}")]
    Rejected(String),
}

/// The payload persisted for one committed drawing thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingAnnotation {
    pub page: u32,
    pub bounds: BoundingBox,
    pub strokes: Vec<Stroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub thread_id: ThreadId,
    pub annotation: DrawingAnnotation,
}

/// Asynchronous completion of a [`SaveRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub thread_id: ThreadId,
    pub result: Result<(), ServiceError>,
}

impl SaveOutcome {
    #[must_use]
    pub fn saved(thread_id: ThreadId) -> Self {
        Self { thread_id, result: Ok(()) }
    }

    #[must_use]
    pub fn failed(thread_id: ThreadId, error: ServiceError) -> Self {
        Self { thread_id, result: Err(error) }
    }
}

/// Outbound persistence calls made by drawing threads.
pub trait AnnotationService {
    /// Submit a save. `Ok` means accepted, not persisted.
    ///
    /// # Errors
    ///
    /// Returns an error when the request could not be submitted at all.
    fn save(&mut self, request: SaveRequest) -> Result<(), ServiceError>;

    /// Submit a delete of a previously saved annotation.
    ///
    /// # Errors
    ///
    /// Returns an error when the request could not be submitted at all.
    fn delete(&mut self, thread_id: ThreadId) -> Result<(), ServiceError>;
}

// =============================================================================
// CHANNEL ADAPTER
// =============================================================================

/// A request as carried over the service channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    Save(SaveRequest),
    Delete(ThreadId),
}

/// [`AnnotationService`] that forwards requests to an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelService {
    tx: mpsc::UnboundedSender<ServiceRequest>,
}

impl ChannelService {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ServiceRequest>) -> Self {
        Self { tx }
    }

    /// Build a service together with the receiving end of its request channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServiceRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl AnnotationService for ChannelService {
    fn save(&mut self, request: SaveRequest) -> Result<(), ServiceError> {
        self.tx
            .send(ServiceRequest::Save(request))
            .map_err(|_| ServiceError::Disconnected)
    }

    fn delete(&mut self, thread_id: ThreadId) -> Result<(), ServiceError> {
        self.tx
            .send(ServiceRequest::Delete(thread_id))
            .map_err(|_| ServiceError::Disconnected)
    }
}

// =============================================================================
// LOOPBACK BACKEND
// =============================================================================

/// Saved annotations keyed by thread id.
pub type SharedStore = Arc<RwLock<HashMap<ThreadId, DrawingAnnotation>>>;

/// In-process backend that stores annotations in memory and acknowledges
/// every save, except on pages it has been told to reject.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    store: SharedStore,
    rejected_pages: HashSet<u32>,
}

impl LoopbackBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every save for annotations on `page`.
    #[must_use]
    pub fn rejecting_page(mut self, page: u32) -> Self {
        self.rejected_pages.insert(page);
        self
    }

    /// Handle to the backing store.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Apply one request, returning the outcome to report for saves.
    pub async fn handle(&self, request: ServiceRequest) -> Option<SaveOutcome> {
        match request {
            ServiceRequest::Save(req) => {
                if self.rejected_pages.contains(&req.annotation.page) {
                    let error = ServiceError::Rejected(format!("page {} is read-only", req.annotation.page));
                    return Some(SaveOutcome::failed(req.thread_id, error));
                }
                self.store.write().await.insert(req.thread_id, req.annotation);
                debug!(thread_id = %req.thread_id, "annotation stored");
                Some(SaveOutcome::saved(req.thread_id))
            }
            ServiceRequest::Delete(thread_id) => {
                if self.store.write().await.remove(&thread_id).is_none() {
                    debug!(%thread_id, "delete for unknown annotation");
                }
                None
            }
        }
    }

    /// Spawn the backend task. It runs until the request channel closes or
    /// the outcome receiver is dropped.
    pub fn spawn(
        self,
        mut requests: mpsc::UnboundedReceiver<ServiceRequest>,
        outcomes: mpsc::UnboundedSender<SaveOutcome>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if let Some(outcome) = self.handle(request).await {
                    if outcomes.send(outcome).is_err() {
                        warn!("outcome receiver dropped; stopping loopback backend");
                        break;
                    }
                }
            }
        })
    }
}
