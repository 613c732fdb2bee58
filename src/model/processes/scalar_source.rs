//! ScalarSource: emits one number per step.

use crate::model::data::DataObject;
use crate::model::error::{ModelError, ModelResult};
use crate::model::process::{Process, ProcessContext, ProcessState, StepContext};
use crate::model::value::PropertyBag;

pub struct ScalarSourceProcess {
    state: ProcessState,
    /// Value selected by the last link.
    current: Option<f64>,
    output: Option<DataObject>,
}

impl ScalarSourceProcess {
    pub fn new() -> Self {
        Self {
            state: ProcessState::new(
                "NMScalarSource",
                PropertyBag::new().with("Values", Vec::<String>::new()),
            ),
            current: None,
            output: None,
        }
    }
}

impl Default for ScalarSourceProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for ScalarSourceProcess {
    fn state(&self) -> &ProcessState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    fn link_parameters(&mut self, ctx: &StepContext<'_>) -> ModelResult<()> {
        let text = ctx.string_parameter(&self.state, "Values")?;
        let value = text
            .trim()
            .parse::<f64>()
            .map_err(|_| ModelError::InvalidParameter {
                component: ctx.component.to_string(),
                message: format!("'{}' is not a number", text),
            })?;
        self.current = Some(value);
        Ok(())
    }

    fn set_nth_input(&mut self, idx: usize, _input: DataObject) -> ModelResult<()> {
        Err(ModelError::InvalidInput {
            component: self.state.type_name().to_string(),
            input: format!("#{} (sources take no inputs)", idx),
        })
    }

    fn output(&self, idx: usize) -> Option<DataObject> {
        if idx == 0 {
            self.output.clone()
        } else {
            None
        }
    }

    fn update(&mut self, ctx: &mut ProcessContext<'_>) -> ModelResult<()> {
        let value = self
            .current
            .ok_or_else(|| ModelError::UninitialisedProcessObject {
                component: ctx.component().to_string(),
            })?;
        self.output = Some(
            DataObject::scalar(value).with_component_type(self.state.output_component_type),
        );
        ctx.report_progress(1.0);
        Ok(())
    }

    fn reset(&mut self) {
        self.state.reset();
        self.current = None;
        self.output = None;
    }
}
