//! Thread boundary between the model controller and its callers.
//!
//! The controller thread owns the command receiver and the event sender;
//! callers hold a [`ControllerBridge`]. Aborting does not go through the
//! command queue: the bridge flips the shared abort flag directly so a
//! running model sees it between updates.

use crate::controller::state::{ControllerState, ExecutionReport};
use crate::model::{ModelComponent, PropertyValue, Repository};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Events sent from the controller thread.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged(ControllerState),

    /// A component started its iterations.
    ExecutionStarted { component: String },

    /// A component finished (or left) its iterations.
    ExecutionStopped { component: String },

    /// Progress of a running process in `[0, 1]`. Dropped when the queue is full.
    Progress { component: String, progress: f32 },

    /// A run failed in this component.
    ComponentError { component: String, message: String },

    /// `true` while a model is executing.
    Busy(bool),

    /// An execution request completed.
    Finished(ExecutionReport),

    ComponentAdded(String),

    ComponentRemoved(String),

    /// A model file was imported. Pairs of (name in file, registered name).
    ModelLoaded { names: Vec<(String, String)> },

    /// A model file was written.
    ModelSaved(PathBuf),

    /// Response to [`ControllerCommand::RequestSnapshot`].
    Snapshot(Vec<ComponentSnapshot>),

    /// A command could not be carried out.
    CommandError(String),

    /// The controller thread is shutting down.
    Shutdown,
}

/// Read-only view of one registered component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSnapshot {
    pub name: String,
    pub class_name: String,
    pub host: Option<String>,
    pub time_level: i16,
    pub num_iterations: u32,
    /// Process type for process components.
    pub process_type: Option<String>,
    pub children: Vec<String>,
}

impl ComponentSnapshot {
    pub fn capture(repo: &Repository, component: &ModelComponent) -> Self {
        Self {
            name: component.name().to_string(),
            class_name: component.class_name().to_string(),
            host: component.host().map(|h| repo.name_of(h).to_string()),
            time_level: component.time_level(),
            num_iterations: component.num_iterations(),
            process_type: component.process().map(|p| p.type_name().to_string()),
            children: component
                .children()
                .iter()
                .map(|id| repo.name_of(*id).to_string())
                .collect(),
        }
    }

    /// Snapshot of every component, hosts before their children.
    pub fn capture_all(repo: &Repository) -> Vec<Self> {
        repo.subtree(repo.root_id())
            .into_iter()
            .filter_map(|id| repo.get(id))
            .map(|c| Self::capture(repo, c))
            .collect()
    }
}

/// Commands sent to the controller thread.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Execute a component and its subtree.
    ExecuteModel { component: String },
    /// Abort the running model. The bridge also sets the abort flag directly.
    AbortModel,
    /// Import a model file under `import_host` (root if `None`).
    LoadModel {
        path: PathBuf,
        import_host: Option<String>,
    },
    /// Write `component` and its subtree to a model file.
    SaveModel { path: PathBuf, component: String },
    /// Create a component (aggregate or data buffer) by class or alias.
    AddComponent {
        type_name: String,
        name: String,
        host: Option<String>,
    },
    /// Create a process component by process class or alias.
    AddProcessComponent {
        process_type: String,
        name: String,
        host: Option<String>,
    },
    RemoveComponent(String),
    /// Set a component property or process parameter.
    SetProperty {
        component: String,
        name: String,
        value: PropertyValue,
    },
    /// Reset run-time state of the whole model.
    Reset,
    /// Request a [`ControllerEvent::Snapshot`].
    RequestSnapshot,
    /// Shut down the controller thread.
    Shutdown,
}

/// Channel capacity for commands (caller → controller).
pub const CMD_CHANNEL_CAPACITY: usize = 256;
/// Channel capacity for events (controller → caller).
pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Caller-side handle for the controller thread.
pub struct ControllerBridge {
    pub cmd_tx: Sender<ControllerCommand>,
    pub event_rx: Receiver<ControllerEvent>,
    abort: Arc<AtomicBool>,
}

impl ControllerBridge {
    /// Create a bridge pair: `(bridge, cmd_rx, event_tx)`.
    ///
    /// The controller thread owns `cmd_rx` and `event_tx`; `abort` must be
    /// the controller's abort flag.
    pub fn new(
        abort: Arc<AtomicBool>,
    ) -> (Self, Receiver<ControllerCommand>, Sender<ControllerEvent>) {
        Self::with_capacity(abort, CMD_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(
        abort: Arc<AtomicBool>,
        cmd_capacity: usize,
        event_capacity: usize,
    ) -> (Self, Receiver<ControllerCommand>, Sender<ControllerEvent>) {
        let (cmd_tx, cmd_rx) = bounded(cmd_capacity.max(1));
        let (event_tx, event_rx) = bounded(event_capacity.max(1));
        (
            Self {
                cmd_tx,
                event_rx,
                abort,
            },
            cmd_rx,
            event_tx,
        )
    }

    // --- Events ---

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<ControllerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block for up to `timeout`. `None` on timeout or if the controller is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ControllerEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Wait until an execution request finishes, returning its report.
    ///
    /// Other events received meanwhile are handed to `on_event`.
    pub fn wait_for_finish(
        &self,
        timeout: Duration,
        mut on_event: impl FnMut(&ControllerEvent),
    ) -> Option<ExecutionReport> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.recv_timeout(remaining)? {
                ControllerEvent::Finished(report) => return Some(report),
                other => on_event(&other),
            }
        }
    }

    // --- Commands ---

    pub fn send_command(&self, cmd: ControllerCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn execute_model(&self, component: impl Into<String>) {
        let _ = self.cmd_tx.send(ControllerCommand::ExecuteModel {
            component: component.into(),
        });
    }

    /// Request an abort. Takes effect even while the controller is busy.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.cmd_tx.try_send(ControllerCommand::AbortModel);
    }

    pub fn load_model(&self, path: impl Into<PathBuf>, import_host: Option<String>) {
        let _ = self.cmd_tx.send(ControllerCommand::LoadModel {
            path: path.into(),
            import_host,
        });
    }

    pub fn save_model(&self, path: impl Into<PathBuf>, component: impl Into<String>) {
        let _ = self.cmd_tx.send(ControllerCommand::SaveModel {
            path: path.into(),
            component: component.into(),
        });
    }

    pub fn remove_component(&self, name: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(ControllerCommand::RemoveComponent(name.into()));
    }

    pub fn request_snapshot(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::RequestSnapshot);
    }

    pub fn reset(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Reset);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_sets_flag_without_controller() {
        let flag = Arc::new(AtomicBool::new(false));
        let (bridge, cmd_rx, _event_tx) = ControllerBridge::new(Arc::clone(&flag));
        bridge.abort();
        assert!(flag.load(Ordering::SeqCst));
        assert!(matches!(cmd_rx.try_recv(), Ok(ControllerCommand::AbortModel)));
    }

    #[test]
    fn test_drain_events() {
        let (bridge, _cmd_rx, event_tx) =
            ControllerBridge::new(Arc::new(AtomicBool::new(false)));
        event_tx.send(ControllerEvent::Busy(true)).unwrap();
        event_tx.send(ControllerEvent::Busy(false)).unwrap();
        let events = bridge.drain();
        assert_eq!(events.len(), 2);
        assert!(bridge.try_recv().is_none());
    }

    #[test]
    fn test_send_fails_after_receiver_dropped() {
        let (bridge, cmd_rx, _event_tx) =
            ControllerBridge::new(Arc::new(AtomicBool::new(false)));
        drop(cmd_rx);
        assert!(!bridge.send_command(ControllerCommand::Reset));
    }

    #[test]
    fn test_snapshot_lists_hosts_first() {
        let mut repo = Repository::new();
        repo.add_component(ModelComponent::aggregate("Loop"), None)
            .unwrap();
        repo.add_component(ModelComponent::data("Buffer"), Some("Loop"))
            .unwrap();
        let snaps = ComponentSnapshot::capture_all(&repo);
        let names: Vec<_> = snaps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["root", "Loop", "Buffer"]);
        assert_eq!(snaps[1].children, vec!["Buffer".to_string()]);
        assert_eq!(snaps[2].host.as_deref(), Some("Loop"));
        assert_eq!(snaps[2].class_name, "NMDataComponent");
    }
}
