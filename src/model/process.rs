//! Process abstraction.
//!
//! A process wraps one algorithm. The controller drives it through a fixed
//! lifecycle for every step it takes part in:
//!
//! ```text
//! instantiate (once) → link_parameters → set_nth_input* → update → output(idx)
//! ```
//!
//! Implementations embed a [`ProcessState`] holding the reflected common
//! properties, the type-specific parameters and the run-time bookkeeping
//! (initialised / linked flags, own step counter, modification time).

use crate::model::data::DataObject;
use crate::model::error::{ModelError, ModelResult};
use crate::model::value::{AdvanceParameter, ComponentType, PropertyBag, PropertyValue};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Names of the properties every process carries, in serialisation order.
pub const COMMON_PROPERTIES: &[&str] = &[
    "ParameterHandling",
    "NMInputComponentType",
    "NMOutputComponentType",
    "InputNumDimensions",
    "OutputNumDimensions",
    "InputNumBands",
    "OutputNumBands",
];

/// Reflected properties and run-time bookkeeping shared by all processes.
#[derive(Debug, Clone)]
pub struct ProcessState {
    type_name: String,
    sink: bool,

    pub parameter_handling: AdvanceParameter,
    pub input_component_type: ComponentType,
    pub output_component_type: ComponentType,
    pub input_num_dimensions: u32,
    pub output_num_dimensions: u32,
    pub input_num_bands: u32,
    pub output_num_bands: u32,
    parameters: PropertyBag,

    initialised: bool,
    linked: bool,
    /// Number of updates since the last reset; the `UseUp`/`Cycle` step.
    param_pos: usize,
    /// Index into per-step lists chosen by the last link.
    step_index: usize,
    progress: f32,
    mtime: Option<DateTime<Utc>>,
}

impl ProcessState {
    /// Create state for a process type with its declared parameters.
    pub fn new(type_name: impl Into<String>, parameters: PropertyBag) -> Self {
        Self {
            type_name: type_name.into(),
            sink: false,
            parameter_handling: AdvanceParameter::default(),
            input_component_type: ComponentType::Unknown,
            output_component_type: ComponentType::Unknown,
            input_num_dimensions: 2,
            output_num_dimensions: 2,
            input_num_bands: 1,
            output_num_bands: 1,
            parameters,
            initialised: false,
            linked: false,
            param_pos: 0,
            step_index: 0,
            progress: 0.0,
            mtime: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_sink(&self) -> bool {
        self.sink
    }

    pub fn set_sink(&mut self, sink: bool) {
        self.sink = sink;
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn set_initialised(&mut self, initialised: bool) {
        self.initialised = initialised;
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn param_pos(&self) -> usize {
        self.param_pos
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn set_progress(&mut self, progress: f32) {
        self.progress = progress.clamp(0.0, 1.0);
    }

    pub fn mtime(&self) -> Option<DateTime<Utc>> {
        self.mtime
    }

    pub fn parameters(&self) -> &PropertyBag {
        &self.parameters
    }

    /// Record that the process has been linked into the pipeline for a step.
    pub fn mark_linked(&mut self, step_index: usize) {
        self.step_index = step_index;
        self.linked = true;
    }

    /// Record a successful update: advance the own step, stamp the mtime.
    pub fn mark_updated(&mut self) {
        self.linked = false;
        self.param_pos += 1;
        self.progress = 1.0;
        self.mtime = Some(Utc::now());
    }

    /// Clear per-run bookkeeping; reflected properties are kept.
    pub fn reset(&mut self) {
        self.initialised = false;
        self.linked = false;
        self.param_pos = 0;
        self.step_index = 0;
        self.progress = 0.0;
        self.mtime = None;
    }

    /// Read a common property or a type-specific parameter.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        let value = match name {
            "ParameterHandling" => PropertyValue::AdvanceParameter(self.parameter_handling),
            "NMInputComponentType" => PropertyValue::ComponentType(self.input_component_type),
            "NMOutputComponentType" => PropertyValue::ComponentType(self.output_component_type),
            "InputNumDimensions" => PropertyValue::UInt(self.input_num_dimensions),
            "OutputNumDimensions" => PropertyValue::UInt(self.output_num_dimensions),
            "InputNumBands" => PropertyValue::UInt(self.input_num_bands),
            "OutputNumBands" => PropertyValue::UInt(self.output_num_bands),
            _ => return self.parameters.get(name).cloned(),
        };
        Some(value)
    }

    /// Write a common property or a declared parameter.
    ///
    /// Returns `false` when the value has the wrong shape for a common
    /// property, or when `name` is not declared; undeclared names are still
    /// stored as dynamic parameters so they survive a save.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> bool {
        match name {
            "ParameterHandling" => match value.as_advance_parameter() {
                Some(v) => self.parameter_handling = v,
                None => return false,
            },
            "NMInputComponentType" => match value.as_component_type() {
                Some(v) => self.input_component_type = v,
                None => return false,
            },
            "NMOutputComponentType" => match value.as_component_type() {
                Some(v) => self.output_component_type = v,
                None => return false,
            },
            "InputNumDimensions" | "OutputNumDimensions" | "InputNumBands"
            | "OutputNumBands" => {
                let Some(v) = value.as_i64().and_then(|v| u32::try_from(v).ok()) else {
                    return false;
                };
                match name {
                    "InputNumDimensions" => self.input_num_dimensions = v,
                    "OutputNumDimensions" => self.output_num_dimensions = v,
                    "InputNumBands" => self.input_num_bands = v,
                    _ => self.output_num_bands = v,
                }
            }
            _ => {
                let declared = self.parameters.contains(name);
                self.parameters.set(name, value);
                return declared;
            }
        }
        true
    }

    /// All reflected properties in serialisation order.
    pub fn properties(&self) -> Vec<(String, PropertyValue)> {
        let mut props: Vec<(String, PropertyValue)> = COMMON_PROPERTIES
            .iter()
            .filter_map(|name| self.property(name).map(|v| (name.to_string(), v)))
            .collect();
        props.extend(
            self.parameters
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone())),
        );
        props
    }
}

/// Lookup of a component's current 1-based iteration number by name.
pub trait IterationLookup {
    fn iteration_number(&self, component: &str) -> Option<u32>;
}

/// Step information handed to [`Process::link_parameters`].
pub struct StepContext<'a> {
    pub component: &'a str,
    /// The process's own consumption counter.
    pub step: usize,
    /// The host aggregate's current iteration (0-based).
    pub host_step: usize,
    pub policy: AdvanceParameter,
    lookup: &'a dyn IterationLookup,
}

impl<'a> StepContext<'a> {
    pub fn new(
        component: &'a str,
        step: usize,
        host_step: usize,
        policy: AdvanceParameter,
        lookup: &'a dyn IterationLookup,
    ) -> Self {
        Self {
            component,
            step,
            host_step,
            policy,
            lookup,
        }
    }

    /// Position in a per-step list of `len` entries.
    pub fn index(&self, len: usize) -> Option<usize> {
        self.policy.index(self.step, self.host_step, len)
    }

    /// Resolve a parameter for this step.
    ///
    /// Lists are treated as per-step sequences: a string list yields the
    /// selected string, a list of string lists the selected inner list.
    /// Iteration expressions in strings are expanded. Scalars pass through.
    pub fn resolve(&self, value: &PropertyValue) -> Option<PropertyValue> {
        let resolved = match value {
            PropertyValue::String(s) => PropertyValue::String(self.expand(s)),
            PropertyValue::StringList(list) => {
                let idx = self.index(list.len())?;
                PropertyValue::String(self.expand(&list[idx]))
            }
            PropertyValue::ListStringList(lists) => {
                let idx = self.index(lists.len())?;
                PropertyValue::StringList(lists[idx].iter().map(|s| self.expand(s)).collect())
            }
            PropertyValue::ListListStringList(lists) => {
                let idx = self.index(lists.len())?;
                PropertyValue::ListStringList(
                    lists[idx]
                        .iter()
                        .map(|inner| inner.iter().map(|s| self.expand(s)).collect())
                        .collect(),
                )
            }
            other => other.clone(),
        };
        Some(resolved)
    }

    /// Resolve a named parameter from a process's state.
    pub fn parameter(&self, state: &ProcessState, name: &str) -> Option<PropertyValue> {
        state.property(name).and_then(|v| self.resolve(&v))
    }

    /// Resolve a named parameter that must yield a string.
    pub fn string_parameter(&self, state: &ProcessState, name: &str) -> ModelResult<String> {
        match self.parameter(state, name) {
            Some(PropertyValue::String(s)) => Ok(s),
            Some(other) => Err(ModelError::InvalidParameter {
                component: self.component.to_string(),
                message: format!("'{}' is a {}, expected a string", name, other.type_tag()),
            }),
            None => Err(ModelError::MissingParameter {
                component: self.component.to_string(),
                parameter: name.to_string(),
            }),
        }
    }

    /// Expand iteration expressions such as `$Loop$` or `$Loop-1$`.
    pub fn expand(&self, text: &str) -> String {
        expand_iteration_expressions(text, self.lookup, self.component)
    }
}

fn expression_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$([a-zA-Z]+\d*)([\+-]?)(\d*)\$").ok())
        .as_ref()
}

/// Replace `$Name$`, `$Name+d$` and `$Name-d$` with the named component's
/// current iteration number adjusted by `d`.
///
/// Unknown names are left verbatim. A subtraction that would go below zero
/// leaves the iteration number unchanged and logs a warning.
pub fn expand_iteration_expressions(
    text: &str,
    lookup: &dyn IterationLookup,
    component: &str,
) -> String {
    let Some(pattern) = expression_pattern() else {
        return text.to_string();
    };
    if !text.contains('$') {
        return text.to_string();
    }

    pattern
        .replace_all(text, |caps: &Captures| {
            let Some(iteration) = lookup.iteration_number(&caps[1]) else {
                return caps[0].to_string();
            };
            let delta: i64 = caps[3].parse().unwrap_or(0);
            let mut value = iteration as i64;
            match &caps[2] {
                "+" => value += delta,
                "-" if value - delta >= 0 => value -= delta,
                "-" => {
                    tracing::warn!(
                        "{}: expression '{}' would yield a negative iteration, using {}",
                        component,
                        &caps[0],
                        value
                    );
                }
                _ => {}
            }
            value.to_string()
        })
        .into_owned()
}

/// Execution context passed to [`Process::update`].
pub struct ProcessContext<'a> {
    component: &'a str,
    step: usize,
    host_step: usize,
    abort: &'a AtomicBool,
    progress: &'a mut dyn FnMut(f32),
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        component: &'a str,
        step: usize,
        host_step: usize,
        abort: &'a AtomicBool,
        progress: &'a mut dyn FnMut(f32),
    ) -> Self {
        Self {
            component,
            step,
            host_step,
            abort,
            progress,
        }
    }

    pub fn component(&self) -> &str {
        self.component
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn host_step(&self) -> usize {
        self.host_step
    }

    /// Cooperative abort check for long-running updates.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Report progress in `[0, 1]`.
    pub fn report_progress(&mut self, fraction: f32) {
        (self.progress)(fraction.clamp(0.0, 1.0));
    }
}

/// A unit of work owned by exactly one model component.
pub trait Process: Send {
    fn state(&self) -> &ProcessState;

    fn state_mut(&mut self) -> &mut ProcessState;

    fn type_name(&self) -> &str {
        self.state().type_name()
    }

    /// Build the underlying algorithm object. Called once per run before the
    /// first link.
    fn instantiate(&mut self) -> ModelResult<()> {
        self.state_mut().set_initialised(true);
        Ok(())
    }

    /// Pull this step's parameter values out of the per-step lists.
    fn link_parameters(&mut self, _ctx: &StepContext<'_>) -> ModelResult<()> {
        Ok(())
    }

    fn set_nth_input(&mut self, idx: usize, input: DataObject) -> ModelResult<()>;

    fn output(&self, idx: usize) -> Option<DataObject>;

    fn update(&mut self, ctx: &mut ProcessContext<'_>) -> ModelResult<()>;

    /// Best-effort request to stop a running update.
    fn abort_execution(&mut self) {}

    /// Switch external resources into the mode needed for a run.
    fn open_resources(&mut self) -> ModelResult<()> {
        Ok(())
    }

    /// Release whatever `open_resources` acquired. Called on every exit path.
    fn close_resources(&mut self) {}

    fn reset(&mut self) {
        self.state_mut().reset();
    }

    fn parameter(&self, name: &str) -> Option<PropertyValue> {
        self.state().property(name)
    }

    fn set_parameter(&mut self, name: &str, value: PropertyValue) -> bool {
        self.state_mut().set_property(name, value)
    }
}
