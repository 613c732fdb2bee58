//! The model controller: executes components of a model.
//!
//! The controller owns the [`Repository`] and runs on a single thread. An
//! execution request walks the requested component recursively:
//!
//! ```text
//! execute_model(X)
//!   reset subtree, open resources
//!   update_component(X)           NumIterations times:
//!     ├── process component  → link parameters + inputs, update process
//!     ├── data buffer        → fetch the selected input's output
//!     └── aggregate          → plan children (StepScheduler), recurse
//!   close resources (always)
//! ```
//!
//! Callers on other threads use a [`ControllerBridge`] and the
//! [`ControllerWorker`] command loop.

pub mod bridge;
pub mod scheduler;
pub mod state;
pub mod worker;

pub use bridge::{ComponentSnapshot, ControllerBridge, ControllerCommand, ControllerEvent};
pub use scheduler::{ExecutionPlan, PlanStats, StepScheduler};
pub use state::{format_elapsed, ControllerState, ExecutionOutcome, ExecutionReport};
pub use worker::ControllerWorker;

use crate::model::component::split_reference;
use crate::model::process::expand_iteration_expressions;
use crate::model::{
    AdvanceParameter, ComponentFactory, ComponentId, DataObject, ModelComponent, ModelError,
    ModelResult, Process, ProcessContext, ProcessFactory, Repository, StepContext,
};
use crate::serialiser::{ModelSerialiser, NameRegister};
use crossbeam_channel::Sender;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// What a component does when it is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    Process,
    Data,
    Aggregate,
}

pub struct ModelController {
    repository: Repository,
    process_factory: Arc<ProcessFactory>,
    component_factory: ComponentFactory,
    state: ControllerState,
    abort: Arc<AtomicBool>,
    events: Option<Sender<ControllerEvent>>,
    /// Components currently being updated, outermost first.
    execution_stack: Vec<ComponentId>,
    /// Process updates in the current run.
    updates: usize,
    /// Indentation width for saved model files.
    indent: usize,
}

impl ModelController {
    pub fn new(process_factory: Arc<ProcessFactory>) -> Self {
        Self {
            repository: Repository::new(),
            process_factory,
            component_factory: ComponentFactory::new(),
            state: ControllerState::Idle,
            abort: Arc::new(AtomicBool::new(false)),
            events: None,
            execution_stack: Vec::new(),
            updates: 0,
            indent: 2,
        }
    }

    /// Send lifecycle events to `events`.
    pub fn with_events(mut self, events: Sender<ControllerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    // ==================== Accessors ====================

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut self.repository
    }

    pub fn process_factory(&self) -> &Arc<ProcessFactory> {
        &self.process_factory
    }

    pub fn component_factory(&self) -> &ComponentFactory {
        &self.component_factory
    }

    pub fn component_factory_mut(&mut self) -> &mut ComponentFactory {
        &mut self.component_factory
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ControllerState::Running
    }

    /// Shared abort flag; setting it stops the current run at the next check.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Names of the components currently being updated, outermost first.
    pub fn execution_stack(&self) -> Vec<String> {
        self.execution_stack
            .iter()
            .map(|id| self.repository.name_of(*id).to_string())
            .collect()
    }

    // ==================== Components ====================

    /// Register `component` under `host` (root if `None`); returns the final name.
    pub fn add_component(
        &mut self,
        component: ModelComponent,
        host: Option<&str>,
    ) -> ModelResult<String> {
        let name = self.repository.add_component(component, host)?;
        tracing::debug!("Added component '{}'", name);
        self.emit(ControllerEvent::ComponentAdded(name.clone()));
        Ok(name)
    }

    /// Create a component of `type_name` (class or alias) and add it.
    pub fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        host: Option<&str>,
    ) -> ModelResult<String> {
        let component = self
            .component_factory
            .create_named(type_name, name)
            .ok_or_else(|| ModelError::UnknownComponentType(type_name.to_string()))?;
        self.add_component(component, host)
    }

    /// Create a component owning a new process of `process_type` and add it.
    pub fn create_process_component(
        &mut self,
        process_type: &str,
        name: &str,
        host: Option<&str>,
    ) -> ModelResult<String> {
        let process = self
            .process_factory
            .create_process(process_type)
            .ok_or_else(|| ModelError::UnknownProcessType(process_type.to_string()))?;
        self.add_component(ModelComponent::with_process(name, process), host)
    }

    /// Remove `name` and its subtree. `false` for unknown names and root.
    pub fn remove_component(&mut self, name: &str) -> bool {
        if self.is_running() {
            tracing::warn!("Cannot remove '{}' while the model is running", name);
            return false;
        }
        let removed = self.repository.remove_component(name);
        if removed {
            tracing::debug!("Removed component '{}'", name);
            self.emit(ControllerEvent::ComponentRemoved(name.to_string()));
        }
        removed
    }

    pub fn get_component(&self, name: &str) -> Option<&ModelComponent> {
        self.repository.get_component(name)
    }

    pub fn get_component_mut(&mut self, name: &str) -> Option<&mut ModelComponent> {
        self.repository.get_component_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.repository.contains(name)
    }

    /// Output `idx` of the named component.
    pub fn component_output(&self, name: &str, idx: usize) -> Option<DataObject> {
        self.repository.get_component(name)?.output(idx)
    }

    /// Expand iteration expressions in `text` on behalf of `component`.
    pub fn process_string_parameter(&self, component: &str, text: &str) -> String {
        expand_iteration_expressions(text, &self.repository, component)
    }

    /// Reset run-time state of the whole model.
    pub fn reset(&mut self) {
        let root = self.repository.root_id();
        self.repository.reset_subtree(root);
    }

    // ==================== Model files ====================

    /// Import a model file under `import_host` (root if `None`).
    pub fn load_model(
        &mut self,
        path: &Path,
        import_host: Option<&str>,
    ) -> crate::error::Result<NameRegister> {
        let register = ModelSerialiser::new(&self.component_factory, &self.process_factory)
            .parse_file(path, import_host, &mut self.repository)?;
        self.emit(ControllerEvent::ModelLoaded {
            names: register.clone().into_pairs(),
        });
        Ok(register)
    }

    /// Import a model document held in memory.
    pub fn load_model_str(
        &mut self,
        source: &str,
        import_host: Option<&str>,
    ) -> crate::error::Result<NameRegister> {
        let register = ModelSerialiser::new(&self.component_factory, &self.process_factory)
            .parse_str(source, import_host, &mut self.repository)?;
        self.emit(ControllerEvent::ModelLoaded {
            names: register.clone().into_pairs(),
        });
        Ok(register)
    }

    /// Write `component` and its subtree to `path`.
    pub fn save_model(&self, path: &Path, component: &str) -> crate::error::Result<()> {
        ModelSerialiser::new(&self.component_factory, &self.process_factory)
            .with_indent(self.indent)
            .serialise_model(&self.repository, component, path)
    }

    /// The document [`save_model`](Self::save_model) would write.
    pub fn save_model_to_string(&self, component: &str) -> crate::error::Result<String> {
        ModelSerialiser::new(&self.component_factory, &self.process_factory)
            .with_indent(self.indent)
            .serialise_to_string(&self.repository, component)
    }

    // ==================== Execution ====================

    /// Request the current run to stop.
    ///
    /// The flag is checked between component updates and is visible to
    /// processes through their context. The innermost process on the
    /// execution stack is also asked to abort.
    pub fn abort_model(&mut self) {
        tracing::info!("Model abort requested");
        self.abort.store(true, Ordering::SeqCst);
        for id in self.execution_stack.iter().rev() {
            let process = self
                .repository
                .get_mut(*id)
                .and_then(|c| c.process_mut());
            if let Some(process) = process {
                process.abort_execution();
                break;
            }
        }
    }

    fn is_abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Execute `name` and its subtree.
    ///
    /// Fails only if the request is rejected (already running, unknown
    /// component); failures during the run are reported in the returned
    /// [`ExecutionReport`].
    pub fn execute_model(&mut self, name: &str) -> ModelResult<ExecutionReport> {
        if self.is_running() {
            tracing::warn!("Execution of '{}' rejected, model is already running", name);
            return Err(ModelError::AlreadyRunning);
        }
        let id = self
            .repository
            .id_of(name)
            .ok_or_else(|| ModelError::UnregisteredComponent(name.to_string()))?;

        if self.abort.swap(false, Ordering::SeqCst) {
            tracing::debug!("Discarding abort requested before '{}' started", name);
        }
        self.updates = 0;
        self.set_state(ControllerState::Running);
        self.emit(ControllerEvent::Busy(true));
        tracing::info!("Executing '{}'", name);
        let start = Instant::now();

        self.repository.reset_subtree(id);
        let host_step = self
            .repository
            .get(id)
            .and_then(|c| c.host())
            .and_then(|h| self.repository.get(h))
            .map(|h| h.iteration_step() as usize)
            .unwrap_or(0);

        let result = self
            .open_resources(id)
            .and_then(|_| self.update_component(id, host_step));
        self.close_resources(id);
        self.execution_stack.clear();

        let outcome = match result {
            Ok(()) => ExecutionOutcome::Completed,
            Err(ModelError::Aborted) => ExecutionOutcome::Aborted,
            Err(e) => {
                let component = e.component().unwrap_or(name).to_string();
                let message = e.detail();
                tracing::error!("{}: {}", component, message);
                self.emit(ControllerEvent::ComponentError {
                    component: component.clone(),
                    message: message.clone(),
                });
                ExecutionOutcome::Failed { component, message }
            }
        };

        let report = ExecutionReport {
            component: name.to_string(),
            outcome,
            elapsed: start.elapsed(),
            updates: self.updates,
        };
        tracing::info!(
            "Execution of '{}' {} after {} (min:sec), {} updates",
            name,
            report.outcome.state(),
            report.elapsed_display(),
            report.updates
        );

        self.set_state(report.outcome.state());
        self.emit(ControllerEvent::Finished(report.clone()));
        self.emit(ControllerEvent::Busy(false));
        self.set_state(ControllerState::Idle);
        Ok(report)
    }

    fn set_state(&mut self, state: ControllerState) {
        self.state = state;
        self.emit(ControllerEvent::StateChanged(state));
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Per-component notifications are dropped when the event channel is
    /// full so a slow consumer never holds up a run.
    fn emit_lossy(&self, event: ControllerEvent) {
        if let Some(tx) = &self.events {
            if tx.try_send(event).is_err() {
                tracing::trace!("Event channel full, notification dropped");
            }
        }
    }

    fn open_resources(&mut self, id: ComponentId) -> ModelResult<()> {
        for sub in self.repository.subtree(id) {
            if let Some(process) = self.repository.get_mut(sub).and_then(|c| c.process_mut()) {
                process.open_resources()?;
            }
        }
        Ok(())
    }

    fn close_resources(&mut self, id: ComponentId) {
        for sub in self.repository.subtree(id) {
            if let Some(process) = self.repository.get_mut(sub).and_then(|c| c.process_mut()) {
                process.close_resources();
            }
        }
    }

    fn update_kind(&self, id: ComponentId) -> UpdateKind {
        match self.repository.get(id) {
            Some(c) if c.has_process() => UpdateKind::Process,
            Some(c) if c.is_data() => UpdateKind::Data,
            _ => UpdateKind::Aggregate,
        }
    }

    /// Iteration count for this host step, honouring `NumIterationsExpression`.
    fn resolve_num_iterations(&self, id: ComponentId, host_step: usize) -> ModelResult<u32> {
        let Some(component) = self.repository.get(id) else {
            return Err(ModelError::UnregisteredComponent(id.to_string()));
        };
        let expressions = component.num_iterations_expression();
        let Some(idx) = AdvanceParameter::UseUp.index(host_step, host_step, expressions.len())
        else {
            return Ok(component.num_iterations());
        };

        let text = expand_iteration_expressions(&expressions[idx], &self.repository, component.name());
        let text = text.trim();
        if text.is_empty() {
            return Ok(component.num_iterations());
        }
        text.parse::<u32>()
            .map_err(|_| ModelError::InvalidParameter {
                component: component.name().to_string(),
                message: format!("invalid NumIterationsExpression '{}'", text),
            })
    }

    fn update_component(&mut self, id: ComponentId, host_step: usize) -> ModelResult<()> {
        let iterations = self.resolve_num_iterations(id, host_step)?;
        let name = self.repository.name_of(id).to_string();
        if iterations == 0 {
            tracing::debug!("Skipping '{}': zero iterations", name);
            return Ok(());
        }

        self.emit_lossy(ControllerEvent::ExecutionStarted {
            component: name.clone(),
        });
        self.execution_stack.push(id);
        let result = self.iterate(id, &name, iterations, host_step);
        self.execution_stack.pop();
        self.emit_lossy(ControllerEvent::ExecutionStopped {
            component: name.clone(),
        });
        result
    }

    fn iterate(
        &mut self,
        id: ComponentId,
        name: &str,
        iterations: u32,
        host_step: usize,
    ) -> ModelResult<()> {
        for step in 0..iterations {
            if self.is_abort_requested() {
                return Err(ModelError::Aborted);
            }
            if let Some(component) = self.repository.get_mut(id) {
                component.set_iteration_step(step);
            }
            match self.update_kind(id) {
                UpdateKind::Process => self
                    .run_process(id, name, host_step)
                    .map_err(|e| self.step_error(id, host_step, step, e))?,
                UpdateKind::Data => self
                    .fetch_data(id, name)
                    .map_err(|e| self.step_error(id, host_step, step, e))?,
                UpdateKind::Aggregate => self.run_children(id, step as usize)?,
            }
        }
        Ok(())
    }

    fn run_children(&mut self, host: ComponentId, step: usize) -> ModelResult<()> {
        let plan = StepScheduler::plan(&self.repository, host, step)?;
        if plan.stats.feedback_edges > 0 && step == 0 {
            tracing::debug!(
                "'{}': {} data buffer feedback edge(s), consumers read the previous value",
                self.repository.name_of(host),
                plan.stats.feedback_edges
            );
        }
        for child in plan.order {
            if self.is_abort_requested() {
                return Err(ModelError::Aborted);
            }
            self.update_component(child, step)?;
        }
        Ok(())
    }

    /// Prefix an error with host and component steps (1-based).
    fn step_error(&self, id: ComponentId, host_step: usize, step: u32, error: ModelError) -> ModelError {
        if error == ModelError::Aborted {
            return error;
        }
        let component = self.repository.name_of(id).to_string();
        let host = self
            .repository
            .get(id)
            .and_then(|c| c.host())
            .map(|h| self.repository.name_of(h).to_string())
            .unwrap_or_else(|| component.clone());
        ModelError::Execution {
            message: format!(
                "{} step #{}: {} step #{}: {}",
                host,
                host_step + 1,
                component,
                step + 1,
                error.detail()
            ),
            component,
        }
    }

    fn run_process(&mut self, id: ComponentId, name: &str, host_step: usize) -> ModelResult<()> {
        let mut process = self
            .repository
            .get_mut(id)
            .and_then(|c| c.take_process())
            .ok_or_else(|| ModelError::UninitialisedProcessObject {
                component: name.to_string(),
            })?;
        let result = self.link_and_update(id, name, host_step, process.as_mut());
        if let Some(component) = self.repository.get_mut(id) {
            component.restore_process(process);
        }
        result
    }

    fn link_and_update(
        &mut self,
        id: ComponentId,
        name: &str,
        host_step: usize,
        process: &mut dyn Process,
    ) -> ModelResult<()> {
        if !process.state().is_initialised() {
            process.instantiate()?;
            process.state_mut().set_initialised(true);
        }

        let inputs = self
            .repository
            .get(id)
            .map(|c| c.inputs().to_vec())
            .unwrap_or_default();
        let policy = process.state().parameter_handling;
        let position = process.state().param_pos();
        let index = policy.index(position, host_step, inputs.len());

        let ctx = StepContext::new(name, position, host_step, policy, &self.repository);
        process.link_parameters(&ctx)?;
        if let Some(idx) = index {
            for (nth, reference) in inputs[idx].iter().enumerate() {
                let data = self.fetch_output(name, reference)?;
                process.set_nth_input(nth, data)?;
            }
        }
        process.state_mut().mark_linked(index.unwrap_or(0));

        let events = self.events.clone();
        let component = name.to_string();
        let mut progress = move |fraction: f32| {
            if let Some(tx) = &events {
                let _ = tx.try_send(ControllerEvent::Progress {
                    component: component.clone(),
                    progress: fraction,
                });
            }
        };
        let abort = Arc::clone(&self.abort);
        let step = self.repository.get(id).map(|c| c.iteration_step()).unwrap_or(0) as usize;
        let mut ctx = ProcessContext::new(name, step, host_step, &abort, &mut progress);

        match catch_unwind(AssertUnwindSafe(|| process.update(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(payload) => {
                return Err(ModelError::Execution {
                    component: name.to_string(),
                    message: format!("process panicked: {}", panic_message(payload.as_ref())),
                });
            }
        }

        process.state_mut().mark_updated();
        self.updates += 1;
        tracing::debug!(
            "Updated '{}' ({}) host step {}, parameter index {:?}",
            name,
            process.type_name(),
            host_step + 1,
            index
        );
        Ok(())
    }

    /// Resolve a `name[:outputIndex]` reference to the source's output.
    fn fetch_output(&self, consumer: &str, reference: &str) -> ModelResult<DataObject> {
        let (source, raw_idx) = split_reference(reference);
        let idx = match raw_idx {
            None => 0,
            Some(raw) => raw.parse::<usize>().unwrap_or_else(|_| {
                tracing::warn!(
                    "{}: malformed output index in '{}', using output 0",
                    consumer,
                    reference
                );
                0
            }),
        };
        let component = self
            .repository
            .get_component(source)
            .ok_or_else(|| ModelError::InvalidInput {
                component: consumer.to_string(),
                input: reference.to_string(),
            })?;
        component
            .output(idx)
            .ok_or_else(|| ModelError::UninitialisedDataObject {
                component: consumer.to_string(),
                message: format!("'{}' has no output #{}", source, idx),
            })
    }

    fn fetch_data(&mut self, id: ComponentId, name: &str) -> ModelResult<()> {
        let Some(component) = self.repository.get(id) else {
            return Err(ModelError::UnregisteredComponent(name.to_string()));
        };
        let inputs = component.inputs();
        let reference = AdvanceParameter::UseUp
            .index(component.fetches(), 0, inputs.len())
            .and_then(|i| inputs[i].first().cloned());

        let Some(reference) = reference else {
            if component.data_object().is_some() {
                return Ok(());
            }
            return Err(ModelError::UninitialisedDataObject {
                component: name.to_string(),
                message: "no input and no data set".to_string(),
            });
        };

        let data = self.fetch_output(name, &reference)?;
        if let Some(component) = self.repository.get_mut(id) {
            component.store_fetched(data);
        }
        Ok(())
    }
}

impl Default for ModelController {
    fn default() -> Self {
        Self::new(ProcessFactory::global())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
