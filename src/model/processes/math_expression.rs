//! MapAlgebra: evaluates a Rhai expression over the process inputs.
//!
//! Inputs are bound as `b1`, `b2`, ... in input order. When at least one
//! input is a series the expression is evaluated once per element, with
//! scalar inputs broadcast; all series must have the same length.
//!
//! ```rhai
//! b1 * 2.0 + b2
//! ```

use crate::model::data::{DataObject, DataValue};
use crate::model::error::{ModelError, ModelResult};
use crate::model::process::{Process, ProcessContext, ProcessState, StepContext};
use crate::model::value::PropertyBag;
use rhai::{Dynamic, Engine, Scope, AST};

/// Elements evaluated between abort checks.
const ABORT_CHECK_INTERVAL: usize = 256;

pub struct MathExpressionProcess {
    state: ProcessState,
    engine: Engine,
    expression: String,
    compiled: Option<AST>,
    inputs: Vec<Option<DataObject>>,
    output: Option<DataObject>,
}

impl MathExpressionProcess {
    pub fn new() -> Self {
        Self {
            state: ProcessState::new(
                "NMMathExpressionWrapper",
                PropertyBag::new().with("Expression", Vec::<String>::new()),
            ),
            engine: Engine::new(),
            expression: String::new(),
            compiled: None,
            inputs: Vec::new(),
            output: None,
        }
    }

    fn compile(&mut self, component: &str, expression: &str) -> ModelResult<()> {
        if self.compiled.is_some() && self.expression == expression {
            return Ok(());
        }
        match self.engine.compile_expression(expression) {
            Ok(ast) => {
                self.expression = expression.to_string();
                self.compiled = Some(ast);
                tracing::debug!("{}: compiled expression '{}'", component, expression);
                Ok(())
            }
            Err(e) => {
                self.compiled = None;
                Err(ModelError::InvalidParameter {
                    component: component.to_string(),
                    message: format!("Compile error in '{}': {}", expression, e),
                })
            }
        }
    }

    fn evaluate(&self, component: &str, ast: &AST, bindings: Vec<Dynamic>) -> ModelResult<f64> {
        let mut scope = Scope::new();
        for (i, value) in bindings.into_iter().enumerate() {
            scope.push_dynamic(format!("b{}", i + 1), value);
        }
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| ModelError::Execution {
                component: component.to_string(),
                message: format!("Execution error: {}", e),
            })?;
        dynamic_to_f64(&result).ok_or_else(|| ModelError::Execution {
            component: component.to_string(),
            message: format!("Expression must yield a number, got {}", result.type_name()),
        })
    }

    fn connected_inputs(&self, component: &str) -> ModelResult<Vec<&DataObject>> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                input.as_ref().ok_or_else(|| ModelError::UninitialisedDataObject {
                    component: component.to_string(),
                    message: format!("input b{} is not connected", i + 1),
                })
            })
            .collect()
    }
}

impl Default for MathExpressionProcess {
    fn default() -> Self {
        Self::new()
    }
}

fn dynamic_to_f64(value: &Dynamic) -> Option<f64> {
    if let Ok(v) = value.as_float() {
        return Some(v);
    }
    if let Ok(v) = value.as_int() {
        return Some(v as f64);
    }
    value.as_bool().ok().map(|b| if b { 1.0 } else { 0.0 })
}

fn scalar_binding(input: &DataObject) -> Dynamic {
    match input.value() {
        DataValue::Scalar(v) => Dynamic::from_float(*v),
        DataValue::Text(s) => Dynamic::from(s.clone()),
        // only reached for empty series
        DataValue::Series(_) => Dynamic::from_float(f64::NAN),
    }
}

impl Process for MathExpressionProcess {
    fn state(&self) -> &ProcessState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    fn link_parameters(&mut self, ctx: &StepContext<'_>) -> ModelResult<()> {
        // Inputs are rebound after every link; the next step may read fewer.
        self.inputs.clear();
        let expression = ctx.string_parameter(&self.state, "Expression")?;
        self.compile(ctx.component, &expression)
    }

    fn set_nth_input(&mut self, idx: usize, input: DataObject) -> ModelResult<()> {
        if self.inputs.len() <= idx {
            self.inputs.resize(idx + 1, None);
        }
        self.inputs[idx] = Some(input);
        Ok(())
    }

    fn output(&self, idx: usize) -> Option<DataObject> {
        if idx == 0 {
            self.output.clone()
        } else {
            None
        }
    }

    fn update(&mut self, ctx: &mut ProcessContext<'_>) -> ModelResult<()> {
        let component = ctx.component().to_string();
        let ast = self
            .compiled
            .clone()
            .ok_or_else(|| ModelError::UninitialisedProcessObject {
                component: component.clone(),
            })?;
        let inputs = self.connected_inputs(&component)?;

        let mut length: Option<usize> = None;
        for input in &inputs {
            if let Some(series) = input.as_series() {
                match length {
                    Some(len) if len != series.len() => {
                        return Err(ModelError::InvalidInput {
                            component,
                            input: format!(
                                "series length mismatch ({} vs {})",
                                len,
                                series.len()
                            ),
                        });
                    }
                    _ => length = Some(series.len()),
                }
            }
        }

        let result = match length {
            None => {
                let bindings = inputs.iter().map(|i| scalar_binding(i)).collect();
                DataObject::scalar(self.evaluate(&component, &ast, bindings)?)
            }
            Some(len) => {
                let mut values = Vec::with_capacity(len);
                for n in 0..len {
                    if n % ABORT_CHECK_INTERVAL == 0 {
                        if ctx.is_aborted() {
                            return Err(ModelError::Aborted);
                        }
                        ctx.report_progress(n as f32 / len as f32);
                    }
                    let bindings = inputs
                        .iter()
                        .map(|i| match i.as_series() {
                            Some(series) => Dynamic::from_float(series[n]),
                            None => scalar_binding(i),
                        })
                        .collect();
                    values.push(self.evaluate(&component, &ast, bindings)?);
                }
                DataObject::series(values)
            }
        };

        self.output = Some(result.with_component_type(self.state.output_component_type));
        ctx.report_progress(1.0);
        Ok(())
    }

    fn reset(&mut self) {
        self.state.reset();
        self.inputs.clear();
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::process::IterationLookup;
    use crate::model::value::{AdvanceParameter, PropertyValue};
    use std::sync::atomic::AtomicBool;

    struct NoIterations;

    impl IterationLookup for NoIterations {
        fn iteration_number(&self, _component: &str) -> Option<u32> {
            None
        }
    }

    fn linked(expression: &str) -> MathExpressionProcess {
        let mut process = MathExpressionProcess::new();
        process.set_parameter(
            "Expression",
            PropertyValue::StringList(vec![expression.to_string()]),
        );
        let lookup = NoIterations;
        let ctx = StepContext::new("calc", 0, 0, AdvanceParameter::UseUp, &lookup);
        process.link_parameters(&ctx).unwrap();
        process
    }

    fn run(process: &mut MathExpressionProcess) -> ModelResult<()> {
        let abort = AtomicBool::new(false);
        let mut progress = |_p: f32| {};
        let mut ctx = ProcessContext::new("calc", 0, 0, &abort, &mut progress);
        process.update(&mut ctx)
    }

    #[test]
    fn test_scalar_expression() {
        let mut process = linked("b1 * 2.0 + b2");
        process.set_nth_input(0, DataObject::scalar(3.0)).unwrap();
        process.set_nth_input(1, DataObject::scalar(0.5)).unwrap();
        run(&mut process).unwrap();
        assert_eq!(process.output(0).and_then(|o| o.as_scalar()), Some(6.5));
    }

    #[test]
    fn test_integer_result_is_widened() {
        let mut process = linked("2 + 3");
        run(&mut process).unwrap();
        assert_eq!(process.output(0).and_then(|o| o.as_scalar()), Some(5.0));
    }

    #[test]
    fn test_series_broadcast() {
        let mut process = linked("b1 + b2");
        process
            .set_nth_input(0, DataObject::series(vec![1.0, 2.0, 3.0]))
            .unwrap();
        process.set_nth_input(1, DataObject::scalar(10.0)).unwrap();
        run(&mut process).unwrap();
        let output = process.output(0).unwrap();
        assert_eq!(output.as_series(), Some(&[11.0, 12.0, 13.0][..]));
    }

    #[test]
    fn test_series_length_mismatch() {
        let mut process = linked("b1 + b2");
        process.set_nth_input(0, DataObject::series(vec![1.0])).unwrap();
        process
            .set_nth_input(1, DataObject::series(vec![1.0, 2.0]))
            .unwrap();
        assert!(matches!(
            run(&mut process),
            Err(ModelError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_missing_input_gap() {
        let mut process = linked("b2");
        process.set_nth_input(1, DataObject::scalar(1.0)).unwrap();
        assert!(matches!(
            run(&mut process),
            Err(ModelError::UninitialisedDataObject { .. })
        ));
    }

    #[test]
    fn test_relink_drops_previous_inputs() {
        let mut process = linked("b1 + b2");
        process.set_nth_input(0, DataObject::scalar(1.0)).unwrap();
        process.set_nth_input(1, DataObject::scalar(2.0)).unwrap();
        run(&mut process).unwrap();
        assert_eq!(process.output(0).and_then(|o| o.as_scalar()), Some(3.0));

        let lookup = NoIterations;
        let ctx = StepContext::new("calc", 1, 1, AdvanceParameter::UseUp, &lookup);
        process.link_parameters(&ctx).unwrap();
        process.set_nth_input(0, DataObject::scalar(5.0)).unwrap();
        assert!(matches!(
            run(&mut process),
            Err(ModelError::Execution { .. })
        ));
    }

    #[test]
    fn test_compile_error() {
        let mut process = MathExpressionProcess::new();
        process.set_parameter("Expression", PropertyValue::StringList(vec!["b1 +".into()]));
        let lookup = NoIterations;
        let ctx = StepContext::new("calc", 0, 0, AdvanceParameter::UseUp, &lookup);
        assert!(matches!(
            process.link_parameters(&ctx),
            Err(ModelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_aborted_series() {
        let mut process = linked("b1");
        process
            .set_nth_input(0, DataObject::series(vec![0.0; 10]))
            .unwrap();
        let abort = AtomicBool::new(true);
        let mut progress = |_p: f32| {};
        let mut ctx = ProcessContext::new("calc", 0, 0, &abort, &mut progress);
        assert_eq!(process.update(&mut ctx), Err(ModelError::Aborted));
    }
}
