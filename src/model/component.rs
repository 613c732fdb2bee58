//! Model components: the nodes of the model hierarchy.
//!
//! A component is one of
//!
//! - an **aggregate**: an iterable container owning an ordered child chain,
//! - a **process component**: the same iterable type, but owning a process
//!   instead of children,
//! - a **data buffer**: holds one data object, fetched from its input or set
//!   from outside, which survives between iteration steps.
//!
//! Host/child relations are stored as [`ComponentId`]s and maintained by the
//! repository; a component never owns its host.

use crate::model::data::DataObject;
use crate::model::error::{ModelError, ModelResult};
use crate::model::id::ComponentId;
use crate::model::process::Process;
use crate::model::value::PropertyValue;
use std::fmt;

/// Class name of iterable components (aggregates and process components).
pub const SEQUENTIAL_ITER_COMPONENT: &str = "NMSequentialIterComponent";
/// Class name of data buffer components.
pub const DATA_COMPONENT: &str = "NMDataComponent";

/// Names of the properties every component carries, in serialisation order.
pub const COMPONENT_PROPERTIES: &[&str] = &[
    "objectName",
    "Description",
    "UserID",
    "TimeLevel",
    "NumIterations",
    "NumIterationsExpression",
];

/// Split an input reference `name[:outputIndex]` into name and raw index.
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once(':') {
        Some((name, idx)) => (name.trim(), Some(idx.trim())),
        None => (reference.trim(), None),
    }
}

/// Variant-specific part of a component.
pub enum ComponentKind {
    Iterable {
        children: Vec<ComponentId>,
        process: Option<Box<dyn Process>>,
        /// Current 0-based iteration step.
        iteration_step: u32,
    },
    Data {
        data: Option<DataObject>,
        /// Value set from outside; restored by a reset.
        initial: Option<DataObject>,
        /// Number of fetches since the last reset; the `UseUp` step.
        fetches: usize,
    },
}

pub struct ModelComponent {
    name: String,
    user_id: String,
    description: String,
    time_level: i16,
    num_iterations: u32,
    num_iterations_expression: Vec<String>,
    /// One list of `name[:outputIndex]` references per step.
    inputs: Vec<Vec<String>>,
    pub(crate) host: Option<ComponentId>,
    kind: ComponentKind,
}

impl ModelComponent {
    fn with_kind(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            user_id: String::new(),
            description: String::new(),
            time_level: 0,
            num_iterations: 1,
            num_iterations_expression: Vec::new(),
            inputs: Vec::new(),
            host: None,
            kind,
        }
    }

    /// An empty aggregate.
    pub fn aggregate(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ComponentKind::Iterable {
                children: Vec::new(),
                process: None,
                iteration_step: 0,
            },
        )
    }

    /// A component owning `process`.
    pub fn with_process(name: impl Into<String>, process: Box<dyn Process>) -> Self {
        Self::with_kind(
            name,
            ComponentKind::Iterable {
                children: Vec::new(),
                process: Some(process),
                iteration_step: 0,
            },
        )
    }

    /// An empty data buffer.
    pub fn data(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ComponentKind::Data {
                data: None,
                initial: None,
                fetches: 0,
            },
        )
    }

    /// Class name written to model files.
    pub fn class_name(&self) -> &'static str {
        match self.kind {
            ComponentKind::Iterable { .. } => SEQUENTIAL_ITER_COMPONENT,
            ComponentKind::Data { .. } => DATA_COMPONENT,
        }
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    // ── common attributes ──

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only the repository renames registered components.
    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn time_level(&self) -> i16 {
        self.time_level
    }

    /// Negative levels are clamped to 0. Use `Repository::set_time_level`
    /// to keep host and subtree consistent.
    pub fn set_time_level(&mut self, level: i16) {
        self.time_level = level.max(0);
    }

    pub fn num_iterations(&self) -> u32 {
        self.num_iterations
    }

    pub fn set_num_iterations(&mut self, n: u32) -> ModelResult<()> {
        if n == 0 {
            return Err(ModelError::InvalidParameter {
                component: self.name.clone(),
                message: "NumIterations must be at least 1".to_string(),
            });
        }
        self.num_iterations = n;
        Ok(())
    }

    pub fn num_iterations_expression(&self) -> &[String] {
        &self.num_iterations_expression
    }

    pub fn set_num_iterations_expression(&mut self, expressions: Vec<String>) {
        self.num_iterations_expression = expressions;
    }

    pub fn inputs(&self) -> &[Vec<String>] {
        &self.inputs
    }

    pub fn set_inputs(&mut self, inputs: Vec<Vec<String>>) {
        self.inputs = inputs;
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut Vec<Vec<String>> {
        &mut self.inputs
    }

    pub fn host(&self) -> Option<ComponentId> {
        self.host
    }

    // ── iterable components ──

    /// True for iterable components without a process.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, ComponentKind::Iterable { process: None, .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, ComponentKind::Data { .. })
    }

    pub fn has_process(&self) -> bool {
        self.process().is_some()
    }

    pub fn children(&self) -> &[ComponentId] {
        match &self.kind {
            ComponentKind::Iterable { children, .. } => children,
            ComponentKind::Data { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<ComponentId>> {
        match &mut self.kind {
            ComponentKind::Iterable {
                children,
                process: None,
                ..
            } => Some(children),
            _ => None,
        }
    }

    pub fn process(&self) -> Option<&dyn Process> {
        match &self.kind {
            ComponentKind::Iterable { process, .. } => process.as_deref(),
            ComponentKind::Data { .. } => None,
        }
    }

    pub fn process_mut(&mut self) -> Option<&mut (dyn Process + 'static)> {
        match &mut self.kind {
            ComponentKind::Iterable { process, .. } => process.as_deref_mut(),
            ComponentKind::Data { .. } => None,
        }
    }

    /// Attach a process, returning the one it replaces.
    ///
    /// Fails for data buffers and for aggregates that already have children.
    pub fn set_process(&mut self, new: Box<dyn Process>) -> ModelResult<Option<Box<dyn Process>>> {
        match &mut self.kind {
            ComponentKind::Iterable {
                children, process, ..
            } if children.is_empty() => Ok(process.replace(new)),
            ComponentKind::Iterable { .. } => Err(ModelError::InvalidLink(format!(
                "'{}' has sub-components and cannot own a process",
                self.name
            ))),
            ComponentKind::Data { .. } => Err(ModelError::InvalidLink(format!(
                "data component '{}' cannot own a process",
                self.name
            ))),
        }
    }

    /// Move the process out while it runs; see [`restore_process`](Self::restore_process).
    pub(crate) fn take_process(&mut self) -> Option<Box<dyn Process>> {
        match &mut self.kind {
            ComponentKind::Iterable { process, .. } => process.take(),
            ComponentKind::Data { .. } => None,
        }
    }

    pub(crate) fn restore_process(&mut self, restored: Box<dyn Process>) {
        if let ComponentKind::Iterable { process, .. } = &mut self.kind {
            *process = Some(restored);
        }
    }

    pub fn iteration_step(&self) -> u32 {
        match self.kind {
            ComponentKind::Iterable { iteration_step, .. } => iteration_step,
            ComponentKind::Data { .. } => 0,
        }
    }

    /// Current 1-based iteration number as used in parameter expressions.
    pub fn iteration_number(&self) -> u32 {
        self.iteration_step() + 1
    }

    pub(crate) fn set_iteration_step(&mut self, step: u32) {
        if let ComponentKind::Iterable { iteration_step, .. } = &mut self.kind {
            *iteration_step = step;
        }
    }

    // ── data buffers ──

    pub fn data_object(&self) -> Option<&DataObject> {
        match &self.kind {
            ComponentKind::Data { data, .. } => data.as_ref(),
            ComponentKind::Iterable { .. } => None,
        }
    }

    /// Set the buffer's content from outside the model; a reset restores it.
    pub fn set_data_object(&mut self, object: DataObject) -> ModelResult<()> {
        match &mut self.kind {
            ComponentKind::Data { data, initial, .. } => {
                *data = Some(object.clone());
                *initial = Some(object);
                Ok(())
            }
            ComponentKind::Iterable { .. } => Err(ModelError::InvalidParameter {
                component: self.name.clone(),
                message: "only data components hold data objects".to_string(),
            }),
        }
    }

    /// Store a fetched object and advance the fetch counter.
    pub(crate) fn store_fetched(&mut self, object: DataObject) {
        if let ComponentKind::Data { data, fetches, .. } = &mut self.kind {
            *data = Some(object);
            *fetches += 1;
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        match self.kind {
            ComponentKind::Data { fetches, .. } => fetches,
            ComponentKind::Iterable { .. } => 0,
        }
    }

    /// The component's output: a buffer's content or its process's output.
    pub fn output(&self, idx: usize) -> Option<DataObject> {
        match &self.kind {
            ComponentKind::Data { data, .. } => data.clone(),
            ComponentKind::Iterable { process, .. } => process.as_ref()?.output(idx),
        }
    }

    /// Clear run-time state of this component (not its subtree).
    pub fn reset(&mut self) {
        match &mut self.kind {
            ComponentKind::Iterable {
                process,
                iteration_step,
                ..
            } => {
                *iteration_step = 0;
                if let Some(process) = process {
                    process.reset();
                }
            }
            ComponentKind::Data {
                data,
                initial,
                fetches,
            } => {
                *data = initial.clone();
                *fetches = 0;
            }
        }
    }

    // ── reflected properties ──

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        let value = match name {
            "objectName" => PropertyValue::String(self.name.clone()),
            "Description" => PropertyValue::String(self.description.clone()),
            "UserID" => PropertyValue::String(self.user_id.clone()),
            "TimeLevel" => PropertyValue::Short(self.time_level),
            "NumIterations" => PropertyValue::UInt(self.num_iterations),
            "NumIterationsExpression" => {
                PropertyValue::StringList(self.num_iterations_expression.clone())
            }
            "Inputs" if self.is_data() => PropertyValue::ListStringList(self.inputs.clone()),
            _ => return None,
        };
        Some(value)
    }

    /// Set a reflected property; `false` for unknown names or mismatched shapes.
    ///
    /// `objectName` is accepted only before the component is registered.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> bool {
        match (name, value) {
            ("objectName", PropertyValue::String(v)) => self.name = v,
            ("Description", PropertyValue::String(v)) => self.description = v,
            ("UserID", PropertyValue::String(v)) => self.user_id = v,
            ("TimeLevel", v) => match v.as_i64().and_then(|l| i16::try_from(l).ok()) {
                Some(level) => self.set_time_level(level),
                None => return false,
            },
            ("NumIterations", v) => match v.as_i64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => return self.set_num_iterations(n).is_ok(),
                None => return false,
            },
            ("NumIterationsExpression", PropertyValue::StringList(v)) => {
                self.num_iterations_expression = v
            }
            ("NumIterationsExpression", PropertyValue::String(v)) => {
                self.num_iterations_expression = vec![v]
            }
            ("Inputs", PropertyValue::ListStringList(v)) if self.is_data() => self.inputs = v,
            _ => return false,
        }
        true
    }

    /// All reflected properties in serialisation order.
    pub fn properties(&self) -> Vec<(String, PropertyValue)> {
        let mut names: Vec<&str> = COMPONENT_PROPERTIES.to_vec();
        if self.is_data() {
            names.push("Inputs");
        }
        names
            .into_iter()
            .filter_map(|n| self.property(n).map(|v| (n.to_string(), v)))
            .collect()
    }
}

impl fmt::Debug for ModelComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ModelComponent");
        s.field("name", &self.name)
            .field("class", &self.class_name())
            .field("time_level", &self.time_level)
            .field("num_iterations", &self.num_iterations)
            .field("inputs", &self.inputs)
            .field("host", &self.host);
        match &self.kind {
            ComponentKind::Iterable {
                children, process, ..
            } => {
                s.field("children", children)
                    .field("process", &process.as_ref().map(|p| p.type_name().to_string()));
            }
            ComponentKind::Data { data, .. } => {
                s.field("data", data);
            }
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::processes::ScalarSourceProcess;

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("Reader"), ("Reader", None));
        assert_eq!(split_reference("Reader:2"), ("Reader", Some("2")));
        assert_eq!(split_reference("Reader:x"), ("Reader", Some("x")));
    }

    #[test]
    fn test_component_variants() {
        let agg = ModelComponent::aggregate("Loop");
        assert!(agg.is_aggregate());
        assert_eq!(agg.class_name(), SEQUENTIAL_ITER_COMPONENT);

        let proc = ModelComponent::with_process("Src", Box::new(ScalarSourceProcess::new()));
        assert!(!proc.is_aggregate());
        assert!(proc.has_process());
        assert_eq!(proc.class_name(), SEQUENTIAL_ITER_COMPONENT);

        let data = ModelComponent::data("Buf");
        assert!(data.is_data());
        assert_eq!(data.class_name(), DATA_COMPONENT);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut agg = ModelComponent::aggregate("Loop");
        assert!(agg.set_num_iterations(0).is_err());
        assert_eq!(agg.num_iterations(), 1);
        assert!(!agg.set_property("NumIterations", PropertyValue::UInt(0)));
        assert!(agg.set_property("NumIterations", PropertyValue::UInt(4)));
        assert_eq!(agg.num_iterations(), 4);
    }

    #[test]
    fn test_time_level_never_negative() {
        let mut agg = ModelComponent::aggregate("Loop");
        assert!(agg.set_property("TimeLevel", PropertyValue::Short(-2)));
        assert_eq!(agg.time_level(), 0);
        agg.set_time_level(3);
        assert_eq!(agg.property("TimeLevel"), Some(PropertyValue::Short(3)));
    }

    #[test]
    fn test_process_and_children_exclusive() {
        let mut agg = ModelComponent::aggregate("Loop");
        agg.children_mut().unwrap().push(ComponentId(4));
        assert!(agg.set_process(Box::new(ScalarSourceProcess::new())).is_err());

        let mut data = ModelComponent::data("Buf");
        assert!(data.set_process(Box::new(ScalarSourceProcess::new())).is_err());

        let mut proc = ModelComponent::with_process("Src", Box::new(ScalarSourceProcess::new()));
        assert!(proc.children_mut().is_none());
    }

    #[test]
    fn test_data_reset_restores_initial() {
        let mut buf = ModelComponent::data("Buf");
        buf.store_fetched(DataObject::scalar(2.0));
        buf.reset();
        assert!(buf.output(0).is_none());

        buf.set_data_object(DataObject::scalar(1.0)).unwrap();
        buf.store_fetched(DataObject::scalar(2.0));
        assert_eq!(buf.fetches(), 1);
        assert_eq!(buf.output(0).and_then(|d| d.as_scalar()), Some(2.0));
        buf.reset();
        assert_eq!(buf.output(0).and_then(|d| d.as_scalar()), Some(1.0));
        assert_eq!(buf.fetches(), 0);
    }

    #[test]
    fn test_properties_order() {
        let data = ModelComponent::data("Buf");
        let names: Vec<String> = data.properties().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.first().map(String::as_str), Some("objectName"));
        assert_eq!(names.last().map(String::as_str), Some("Inputs"));

        let agg = ModelComponent::aggregate("Loop");
        assert_eq!(agg.properties().len(), COMPONENT_PROPERTIES.len());
    }
}
