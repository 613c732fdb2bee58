//! Data objects passed between process outputs and inputs.
//!
//! The numeric kernels that produce real rasters and tables live outside
//! this crate; inside the core a data object is a cheaply clonable handle to
//! a value that processes hand to each other.

use crate::model::value::ComponentType;
use std::fmt;
use std::sync::Arc;

/// Payload carried by a [`DataObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Scalar(f64),
    Series(Vec<f64>),
    Text(String),
}

/// Shared, immutable data handed from one component to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    value: Arc<DataValue>,
    component_type: ComponentType,
}

impl DataObject {
    pub fn new(value: DataValue) -> Self {
        let component_type = match value {
            DataValue::Scalar(_) | DataValue::Series(_) => ComponentType::Double,
            DataValue::Text(_) => ComponentType::Unknown,
        };
        Self {
            value: Arc::new(value),
            component_type,
        }
    }

    pub fn scalar(v: f64) -> Self {
        Self::new(DataValue::Scalar(v))
    }

    pub fn series(values: Vec<f64>) -> Self {
        Self::new(DataValue::Series(values))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(DataValue::Text(s.into()))
    }

    pub fn with_component_type(mut self, component_type: ComponentType) -> Self {
        self.component_type = component_type;
        self
    }

    pub fn value(&self) -> &DataValue {
        &self.value
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match *self.value {
            DataValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match &*self.value {
            DataValue::Series(v) => Some(v),
            _ => None,
        }
    }

    /// Number of elements; scalars and text count as one.
    pub fn len(&self) -> usize {
        match &*self.value {
            DataValue::Series(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.value {
            DataValue::Scalar(v) => write!(f, "{}", v),
            DataValue::Series(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            DataValue::Text(s) => write!(f, "{}", s),
        }
    }
}
