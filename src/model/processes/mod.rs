//! Built-in process implementations.
//!
//! These carry no numeric kernels. They move values through a model so that
//! models can be executed and tested without any plugin installed.

pub mod math_expression;
pub mod scalar_source;
pub mod value_writer;

pub use math_expression::MathExpressionProcess;
pub use scalar_source::ScalarSourceProcess;
pub use value_writer::ValueWriterProcess;

use crate::model::process::Process;
use serde::{Deserialize, Serialize};

/// Process types compiled into the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinProcessType {
    ScalarSource,
    MathExpression,
    ValueWriter,
}

impl BuiltinProcessType {
    /// Class name written to model files.
    pub fn class_name(&self) -> &'static str {
        match self {
            BuiltinProcessType::ScalarSource => "NMScalarSource",
            BuiltinProcessType::MathExpression => "NMMathExpressionWrapper",
            BuiltinProcessType::ValueWriter => "NMValueWriter",
        }
    }

    /// User-facing name.
    pub fn alias(&self) -> &'static str {
        match self {
            BuiltinProcessType::ScalarSource => "ScalarSource",
            BuiltinProcessType::MathExpression => "MapAlgebra",
            BuiltinProcessType::ValueWriter => "ValueWriter",
        }
    }

    pub fn all() -> &'static [BuiltinProcessType] {
        &[
            BuiltinProcessType::ScalarSource,
            BuiltinProcessType::MathExpression,
            BuiltinProcessType::ValueWriter,
        ]
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, BuiltinProcessType::ValueWriter)
    }

    /// Help text shown by `lumass list-processes`.
    pub fn description(&self) -> &'static str {
        match self {
            BuiltinProcessType::ScalarSource =>
                "Emits one number per step.\n\
                 Values are taken from the 'Values' list\n\
                 according to the parameter handling policy.",

            BuiltinProcessType::MathExpression =>
                "Evaluates a Rhai expression over its inputs.\n\
                 Inputs are bound as b1, b2, ...\n\
                 Series inputs are evaluated element-wise.",

            BuiltinProcessType::ValueWriter =>
                "Writes each received value as a line.\n\
                 Appends to 'FileName', or keeps values\n\
                 in memory when no file name is given.",
        }
    }

    pub fn create(&self) -> Box<dyn Process> {
        match self {
            BuiltinProcessType::ScalarSource => Box::new(ScalarSourceProcess::new()),
            BuiltinProcessType::MathExpression => Box::new(MathExpressionProcess::new()),
            BuiltinProcessType::ValueWriter => Box::new(ValueWriterProcess::new()),
        }
    }
}

impl std::fmt::Display for BuiltinProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.alias())
    }
}
