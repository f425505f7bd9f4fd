//! Reconciler actor
//!
//! All reconciliation flows through one task consuming commands from an mpsc
//! channel, so every read-compare-write on the cached live set and the
//! authoritative records is serialized. Webhook handlers get their result
//! back through a oneshot responder; the snapshot path is fire-and-forget
//! from the monitor loop.

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::error::AppError;

use super::models::{PathSnapshot, StreamEvent};
use super::reconcile::{EventOutcome, Reconciler};

const COMMAND_BUFFER: usize = 256;

pub enum ReconcilerCommand {
    ReconcileSnapshot {
        paths: Vec<PathSnapshot>,
    },
    ApplyEvent {
        event: StreamEvent,
        responder: oneshot::Sender<Result<EventOutcome, AppError>>,
    },
}

/// Cloneable handle used by the HTTP handlers and the snapshot monitor.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcilerCommand>,
}

impl ReconcilerHandle {
    pub async fn reconcile_snapshot(&self, paths: Vec<PathSnapshot>) -> Result<(), AppError> {
        self.tx
            .send(ReconcilerCommand::ReconcileSnapshot { paths })
            .await
            .map_err(|_| AppError::Internal("reconciler is not running".into()))
    }

    pub async fn apply_event(&self, event: StreamEvent) -> Result<EventOutcome, AppError> {
        let (responder, rx) = oneshot::channel();
        self.tx
            .send(ReconcilerCommand::ApplyEvent { event, responder })
            .await
            .map_err(|_| AppError::Internal("reconciler is not running".into()))?;
        rx.await
            .map_err(|_| AppError::Internal("reconciler dropped the request".into()))?
    }
}

pub struct ReconcilerActor {
    reconciler: Reconciler,
    rx: mpsc::Receiver<ReconcilerCommand>,
}

impl ReconcilerActor {
    pub fn new(reconciler: Reconciler) -> (Self, ReconcilerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (Self { reconciler, rx }, ReconcilerHandle { tx })
    }

    /// Process commands until every handle is dropped, then drain and exit.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                ReconcilerCommand::ReconcileSnapshot { paths } => {
                    self.reconciler.reconcile_snapshot(paths).await;
                }
                ReconcilerCommand::ApplyEvent { event, responder } => {
                    let result = self.reconciler.apply_event(event).await;
                    let _ = responder.send(result);
                }
            }
        }
        info!("reconciler actor shut down");
    }
}
