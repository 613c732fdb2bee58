//! Test model builders

use lumass_core::model::{DataObject, ModelComponent, Process, PropertyValue, ROOT_NAME};
use lumass_core::{ModelController, ProcessFactory};
use std::sync::Arc;

fn single_step_inputs(inputs: &[&str]) -> Vec<Vec<String>> {
    if inputs.is_empty() {
        Vec::new()
    } else {
        vec![inputs.iter().map(|s| s.to_string()).collect()]
    }
}

/// Builder for controllers holding a small test model
pub struct ModelBuilder {
    controller: ModelController,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            controller: ModelController::new(Arc::new(ProcessFactory::with_builtins())),
        }
    }

    /// Aggregate iterating its children `iterations` times
    pub fn aggregate(mut self, name: &str, host: &str, iterations: u32) -> Self {
        let mut component = ModelComponent::aggregate(name);
        component.set_num_iterations(iterations).unwrap();
        self.controller.add_component(component, Some(host)).unwrap();
        self
    }

    /// Process component reading `inputs` on every step
    pub fn process(
        mut self,
        name: &str,
        host: &str,
        process: impl Process + 'static,
        inputs: &[&str],
    ) -> Self {
        let mut component = ModelComponent::with_process(name, Box::new(process));
        component.set_inputs(single_step_inputs(inputs));
        self.controller.add_component(component, Some(host)).unwrap();
        self
    }

    /// Built-in process component; `parameters` are per-step string lists
    pub fn builtin(
        mut self,
        process_type: &str,
        name: &str,
        host: &str,
        parameters: &[(&str, &[&str])],
        inputs: &[&str],
    ) -> Self {
        self.controller
            .create_process_component(process_type, name, Some(host))
            .unwrap();
        let component = self.controller.get_component_mut(name).unwrap();
        component.set_inputs(single_step_inputs(inputs));
        let process = component.process_mut().unwrap();
        for (param, values) in parameters {
            let values: Vec<String> = values.iter().map(|s| s.to_string()).collect();
            process.set_parameter(param, PropertyValue::StringList(values));
        }
        self
    }

    /// Data buffer, optionally preloaded with a scalar
    pub fn data(mut self, name: &str, host: &str, initial: Option<f64>, inputs: &[&str]) -> Self {
        let mut component = ModelComponent::data(name);
        if let Some(value) = initial {
            component.set_data_object(DataObject::scalar(value)).unwrap();
        }
        component.set_inputs(single_step_inputs(inputs));
        self.controller.add_component(component, Some(host)).unwrap();
        self
    }

    pub fn build(self) -> ModelController {
        self.controller
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for the top-level host
pub const ROOT: &str = ROOT_NAME;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_builder() {
        let controller = ModelBuilder::new()
            .aggregate("Loop", ROOT, 3)
            .data("State", "Loop", Some(0.0), &["Calc"])
            .build();

        assert_eq!(controller.repository().host_of("State").as_deref(), Some("Loop"));
        assert_eq!(controller.get_component("Loop").unwrap().num_iterations(), 3);
        assert_eq!(
            controller.get_component("State").unwrap().inputs(),
            &[vec!["Calc".to_string()]]
        );
    }
}
