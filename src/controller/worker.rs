//! Controller thread: owns a [`ModelController`] and serves bridge commands.

use crate::controller::bridge::{
    ComponentSnapshot, ControllerBridge, ControllerCommand, ControllerEvent,
    CMD_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY,
};
use crate::controller::ModelController;
use crate::model::PropertyValue;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the idle loop waits for a command before re-checking `running`.
const IDLE_POLL: Duration = Duration::from_millis(50);

pub struct ControllerWorker {
    controller: ModelController,
    cmd_rx: Receiver<ControllerCommand>,
    event_tx: Sender<ControllerEvent>,
    running: Arc<AtomicBool>,
}

impl ControllerWorker {
    pub fn new(
        controller: ModelController,
        cmd_rx: Receiver<ControllerCommand>,
        event_tx: Sender<ControllerEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            controller: controller.with_events(event_tx.clone()),
            cmd_rx,
            event_tx,
            running,
        }
    }

    /// Move `controller` onto its own thread.
    ///
    /// The join handle returns the controller once the thread shuts down.
    pub fn spawn(
        controller: ModelController,
    ) -> std::io::Result<(ControllerBridge, JoinHandle<ModelController>)> {
        Self::spawn_with_capacity(controller, CMD_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY)
    }

    pub fn spawn_with_capacity(
        controller: ModelController,
        cmd_capacity: usize,
        event_capacity: usize,
    ) -> std::io::Result<(ControllerBridge, JoinHandle<ModelController>)> {
        let (bridge, cmd_rx, event_tx) =
            ControllerBridge::with_capacity(controller.abort_flag(), cmd_capacity, event_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let worker = Self::new(controller, cmd_rx, event_tx, running);
        let handle = std::thread::Builder::new()
            .name("lumass-controller".to_string())
            .spawn(move || worker.run())?;
        Ok((bridge, handle))
    }

    /// Serve commands until `running` is cleared, Shutdown is received or
    /// every bridge is dropped.
    pub fn run(mut self) -> ModelController {
        tracing::info!("Controller thread started");

        while self.running.load(Ordering::Relaxed) {
            match self.cmd_rx.recv_timeout(IDLE_POLL) {
                Ok(cmd) => {
                    self.handle_command(cmd);
                    self.process_commands();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("All bridges dropped");
                    break;
                }
            }
        }

        let _ = self.event_tx.send(ControllerEvent::Shutdown);
        tracing::info!("Controller thread exiting");
        self.controller
    }

    fn process_commands(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            let Ok(cmd) = self.cmd_rx.try_recv() else {
                break;
            };
            self.handle_command(cmd);
        }
    }

    fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::ExecuteModel { component } => {
                self.handle_execute(&component);
            }
            ControllerCommand::AbortModel => {
                // A run in progress has already seen the flag; nothing is running now.
                tracing::debug!("Abort received while idle");
            }
            ControllerCommand::LoadModel { path, import_host } => {
                self.handle_load(path, import_host);
            }
            ControllerCommand::SaveModel { path, component } => {
                self.handle_save(path, &component);
            }
            ControllerCommand::AddComponent {
                type_name,
                name,
                host,
            } => {
                let result = self
                    .controller
                    .create_component(&type_name, &name, host.as_deref());
                if let Err(e) = result {
                    self.command_error(format!("Failed to add '{}': {}", name, e));
                }
            }
            ControllerCommand::AddProcessComponent {
                process_type,
                name,
                host,
            } => {
                let result =
                    self.controller
                        .create_process_component(&process_type, &name, host.as_deref());
                if let Err(e) = result {
                    self.command_error(format!("Failed to add '{}': {}", name, e));
                }
            }
            ControllerCommand::RemoveComponent(name) => {
                if !self.controller.remove_component(&name) {
                    self.command_error(format!("Failed to remove '{}'", name));
                }
            }
            ControllerCommand::SetProperty {
                component,
                name,
                value,
            } => {
                self.handle_set_property(&component, &name, value);
            }
            ControllerCommand::Reset => {
                self.controller.reset();
            }
            ControllerCommand::RequestSnapshot => {
                let snapshot = ComponentSnapshot::capture_all(self.controller.repository());
                let _ = self.event_tx.send(ControllerEvent::Snapshot(snapshot));
            }
            ControllerCommand::Shutdown => {
                self.running.store(false, Ordering::Relaxed);
            }
        }
    }

    fn command_error(&self, message: String) {
        tracing::warn!("{}", message);
        let _ = self.event_tx.send(ControllerEvent::CommandError(message));
    }

    fn handle_execute(&mut self, component: &str) {
        if let Err(e) = self.controller.execute_model(component) {
            self.command_error(format!("Cannot execute '{}': {}", component, e));
        }
    }

    fn handle_load(&mut self, path: PathBuf, import_host: Option<String>) {
        if let Err(e) = self.controller.load_model(&path, import_host.as_deref()) {
            self.command_error(format!("Failed to load '{}': {}", path.display(), e));
        }
    }

    fn handle_save(&mut self, path: PathBuf, component: &str) {
        match self.controller.save_model(&path, component) {
            Ok(()) => {
                let _ = self.event_tx.send(ControllerEvent::ModelSaved(path));
            }
            Err(e) => self.command_error(format!("Failed to save '{}': {}", component, e)),
        }
    }

    /// Component properties first, then the component's process parameters.
    fn handle_set_property(&mut self, component: &str, name: &str, value: PropertyValue) {
        let Some(target) = self.controller.get_component_mut(component) else {
            self.command_error(format!("Unknown component '{}'", component));
            return;
        };
        if target.property(name).is_some() {
            if !target.set_property(name, value) {
                self.command_error(format!("{}: invalid value for '{}'", component, name));
            }
            return;
        }
        match target.process_mut() {
            Some(process) => {
                if !process.set_parameter(name, value) {
                    tracing::debug!("{}: stored undeclared parameter '{}'", component, name);
                }
            }
            None => self.command_error(format!("{}: no property '{}'", component, name)),
        }
    }
}
