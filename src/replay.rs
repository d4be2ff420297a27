//! Scripted replay of a drawing session against the loopback backend.
//!
//! A [`Script`] is a JSON document of controller steps. [`run_script`] wires a
//! [`DrawingModeController`] to a [`ChannelService`] and a spawned
//! [`LoopbackBackend`], plays every step, waits for outstanding saves, and
//! returns a [`ReplaySummary`] of the actions emitted and the final threads.

#[cfg(test)]
#[path = "replay_test.rs"]
mod replay_test;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{ConfigError, ControllerConfig};
use crate::controller::{Action, DrawingModeController};
use crate::geom::ThreadLocation;
use crate::input::{Command, Device, LocationResolver, PageLayout, PointerEvent, PointerKind};
use crate::service::{AnnotationService, ChannelService, LoopbackBackend, SaveOutcome};
use crate::thread::{ThreadId, ThreadStatus};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("loopback backend stopped with saves outstanding")]
    BackendStopped,
    #[error("loopback backend task failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: ControllerConfig,
    #[serde(default)]
    pub layout: PageLayout,
    /// Pages whose saves the backend refuses.
    #[serde(default)]
    pub rejected_pages: Vec<u32>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Activate,
    Deactivate,
    Pointer {
        kind: PointerKind,
        #[serde(default)]
        device: Device,
        x: f64,
        y: f64,
        #[serde(default)]
        t: u64,
    },
    Command {
        command: Command,
    },
    /// Hit-test at a screen point.
    Select {
        x: f64,
        y: f64,
    },
    /// Wait until every submitted save has been answered.
    Settle,
    /// Resubmit every draft whose save failed.
    RetryFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub sequence: u64,
    pub status: ThreadStatus,
    pub location: Option<ThreadLocation>,
    pub strokes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub actions: Vec<Action>,
    pub threads: Vec<ThreadSummary>,
    pub indexed: usize,
    /// Annotations held by the backend when the replay finished.
    pub stored: usize,
}

/// Read and parse a script file.
///
/// # Errors
///
/// Returns [`ReplayError::Io`] or [`ReplayError::Parse`].
pub async fn load_script(path: impl AsRef<Path>) -> Result<Script, ReplayError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Play `script` to completion.
///
/// # Errors
///
/// Returns [`ReplayError`] for invalid configuration or when the backend
/// task dies before answering every save.
pub async fn run_script(script: Script) -> Result<ReplaySummary, ReplayError> {
    script.config.validate()?;
    script.layout.validate()?;

    let backend = script
        .rejected_pages
        .iter()
        .fold(LoopbackBackend::new(), |backend, &page| backend.rejecting_page(page));
    let store = backend.store();
    let (service, requests) = ChannelService::channel();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let handle = backend.spawn(requests, outcome_tx);

    let mut ctl = DrawingModeController::new(script.config, script.layout, service);
    let mut actions = Vec::new();
    info!(steps = script.steps.len(), "replay started");

    for step in script.steps {
        debug!(?step, "replay step");
        match step {
            Step::Activate => actions.extend(ctl.activate()),
            Step::Deactivate => actions.extend(ctl.deactivate()),
            Step::Pointer { kind, device, x, y, t } => {
                actions.extend(ctl.on_pointer(&PointerEvent::new(kind, device, x, y, t)));
            }
            Step::Command { command } => actions.extend(ctl.on_command(command)),
            Step::Select { x, y } => {
                actions.extend(ctl.handle_selection(&PointerEvent::mouse(PointerKind::Down, x, y, 0)));
            }
            Step::Settle => settle(&mut ctl, &mut outcomes, &mut actions).await?,
            Step::RetryFailed => {
                let failed: Vec<ThreadId> = ctl
                    .threads()
                    .filter(|t| t.status() == ThreadStatus::Drafting && !t.is_save_pending())
                    .filter(|t| ctl.current_thread() != Some(t.id()))
                    .map(|t| t.id())
                    .collect();
                for id in failed {
                    actions.extend(ctl.retry_save(id));
                }
            }
        }
        actions.extend(ctl.pump_outcomes(&mut outcomes));
    }
    settle(&mut ctl, &mut outcomes, &mut actions).await?;

    let mut threads: Vec<ThreadSummary> = ctl
        .threads()
        .map(|t| ThreadSummary {
            id: t.id(),
            sequence: t.sequence(),
            status: t.status(),
            location: t.location(),
            strokes: t.strokes().len(),
        })
        .collect();
    threads.sort_by_key(|t| t.sequence);
    let indexed = ctl.index().len();

    // Dropping the controller closes the request channel and stops the backend.
    drop(ctl);
    handle.await.map_err(|e| ReplayError::Backend(e.to_string()))?;
    let stored = store.read().await.len();

    info!(actions = actions.len(), threads = threads.len(), stored, "replay finished");
    Ok(ReplaySummary { actions, threads, indexed, stored })
}

/// Feed outcomes back until no thread has a save in flight.
async fn settle<R, S>(
    ctl: &mut DrawingModeController<R, S>,
    outcomes: &mut mpsc::UnboundedReceiver<SaveOutcome>,
    actions: &mut Vec<Action>,
) -> Result<(), ReplayError>
where
    R: LocationResolver,
    S: AnnotationService,
{
    while ctl.threads().any(|t| t.is_save_pending()) {
        let Some(outcome) = outcomes.recv().await else {
            return Err(ReplayError::BackendStopped);
        };
        actions.extend(ctl.on_save_outcome(outcome));
    }
    Ok(())
}
