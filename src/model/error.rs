//! Model-specific error types.

use thiserror::Error;

/// Errors raised while building, linking or executing a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    // ── configuration ──
    #[error("{component}: invalid parameter: {message}")]
    InvalidParameter { component: String, message: String },

    #[error("{component}: missing parameter '{parameter}'")]
    MissingParameter { component: String, parameter: String },

    #[error("Unknown process type '{0}'")]
    UnknownProcessType(String),

    #[error("Unknown component type '{0}'")]
    UnknownComponentType(String),

    // ── execution ──
    #[error("{component}: {message}")]
    Execution { component: String, message: String },

    #[error("{component}: input data object is not initialised: {message}")]
    UninitialisedDataObject { component: String, message: String },

    #[error("{component}: process object is not initialised")]
    UninitialisedProcessObject { component: String },

    #[error("Model execution aborted")]
    Aborted,

    // ── resources ──
    #[error("{component}: resource error: {message}")]
    Resource { component: String, message: String },

    // ── graph integrity ──
    #[error("Unregistered model component '{0}'")]
    UnregisteredComponent(String),

    #[error("{component}: invalid input '{input}'")]
    InvalidInput { component: String, input: String },

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Cycle detected between components: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Model controller is already running")]
    AlreadyRunning,
}

impl ModelError {
    /// Name of the component the error originated from, if it carries one.
    pub fn component(&self) -> Option<&str> {
        match self {
            ModelError::InvalidParameter { component, .. }
            | ModelError::MissingParameter { component, .. }
            | ModelError::Execution { component, .. }
            | ModelError::UninitialisedDataObject { component, .. }
            | ModelError::UninitialisedProcessObject { component }
            | ModelError::Resource { component, .. }
            | ModelError::InvalidInput { component, .. } => Some(component),
            ModelError::UnregisteredComponent(name) => Some(name),
            _ => None,
        }
    }

    /// The error text without the leading component name.
    pub fn detail(&self) -> String {
        match self {
            ModelError::InvalidParameter { message, .. } => format!("invalid parameter: {}", message),
            ModelError::MissingParameter { parameter, .. } => {
                format!("missing parameter '{}'", parameter)
            }
            ModelError::Execution { message, .. } | ModelError::Resource { message, .. } => {
                message.clone()
            }
            ModelError::UninitialisedDataObject { message, .. } => {
                format!("input data object is not initialised: {}", message)
            }
            ModelError::UninitialisedProcessObject { .. } => {
                "process object is not initialised".to_string()
            }
            ModelError::InvalidInput { input, .. } => format!("invalid input '{}'", input),
            other => other.to_string(),
        }
    }

    /// Configuration errors can be recovered from by skipping the offending component.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidParameter { .. }
                | ModelError::MissingParameter { .. }
                | ModelError::UnknownProcessType(_)
                | ModelError::UnknownComponentType(_)
        )
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_of_error() {
        let err = ModelError::Execution {
            component: "Writer".to_string(),
            message: "disk full".to_string(),
        };
        assert_eq!(err.component(), Some("Writer"));
        assert_eq!(err.to_string(), "Writer: disk full");
        assert_eq!(ModelError::Aborted.component(), None);
    }

    #[test]
    fn test_detail_drops_component() {
        let err = ModelError::InvalidInput {
            component: "Calc".to_string(),
            input: "Ghost:0".to_string(),
        };
        assert_eq!(err.detail(), "invalid input 'Ghost:0'");
        assert_eq!(err.to_string(), "Calc: invalid input 'Ghost:0'");
    }

    #[test]
    fn test_cycle_display() {
        let err = ModelError::CycleDetected(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "Cycle detected between components: A, B");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(ModelError::UnknownProcessType("X".into()).is_configuration());
        assert!(!ModelError::Aborted.is_configuration());
    }
}
