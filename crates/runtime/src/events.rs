//! Machine status events and the process-wide publisher seam.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::RuntimeIdentity;

/// Lifecycle status of one machine within a workspace runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

/// A point-in-time status notification for one machine.
///
/// Within one start attempt, `Starting` always precedes exactly one
/// terminal status (`Running` or `Failed`), and no event is published for
/// a machine whose bootstrap was never attempted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusEvent {
    pub identity: RuntimeIdentity,
    pub machine_name: String,
    pub status: MachineStatus,
}

impl MachineStatusEvent {
    pub fn new(identity: RuntimeIdentity, machine_name: impl Into<String>, status: MachineStatus) -> Self {
        Self {
            identity,
            machine_name: machine_name.into(),
            status,
        }
    }
}

/// Fire-and-forget sink for status events. Ordering is preserved per
/// publisher call; delivery is unacknowledged. Safe for concurrent publish.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: MachineStatusEvent);
}

/// [`EventPublisher`] backed by a tokio broadcast channel. Publishing with
/// no live subscribers drops the event silently.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<MachineStatusEvent>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a new subscription receiving every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MachineStatusEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: MachineStatusEvent) {
        trace!(
            machine = %event.machine_name,
            status = ?event.status,
            "publishing machine status event"
        );
        // No subscribers is not an error for a fire-and-forget sink.
        let _ = self.tx.send(event);
    }
}
