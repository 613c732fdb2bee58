//! The model: a hierarchy of components wrapping processes.
//!
//! Components live in a [`Repository`] under unique names. Aggregates own an
//! ordered child chain and iterate it `NumIterations` times; process
//! components own exactly one [`Process`]; data buffers carry a value across
//! iteration steps. Inputs are declared by name, one list per step.
//!
//! # Architecture
//!
//! ```text
//! root (aggregate, level 0)
//!  ├── Source      [NMScalarSource]
//!  ├── Loop        (aggregate, NumIterations = 3)
//!  │    ├── Calc   [NMMathExpressionWrapper]  inputs: Source, State
//!  │    └── State  (data buffer)              inputs: Calc
//!  └── Writer      [NMValueWriter, sink]      inputs: Loop's Calc
//! ```
//!
//! # Design
//!
//! - **Slot arena**: components are stored in `Vec<Option<_>>` with
//!   `ComponentId` as index; hosts refer to children by id.
//! - **Closed property values**: `PropertyValue` is a sum type, the XML
//!   codec matches on it.
//! - **Narrow process interface**: the controller only instantiates, links,
//!   feeds inputs, updates and reads outputs.

pub mod component;
pub mod component_factory;
pub mod data;
pub mod error;
pub mod id;
pub mod process;
pub mod process_factory;
pub mod processes;
pub mod repository;
pub mod value;

pub use component::{ComponentKind, ModelComponent, DATA_COMPONENT, SEQUENTIAL_ITER_COMPONENT};
pub use component_factory::ComponentFactory;
pub use data::{DataObject, DataValue};
pub use error::{ModelError, ModelResult};
pub use id::ComponentId;
pub use process::{IterationLookup, Process, ProcessContext, ProcessState, StepContext};
pub use process_factory::{ProcessFactory, ProcessWrapperFactory, PLUGIN_ENTRY_SYMBOL};
pub use processes::BuiltinProcessType;
pub use repository::{Repository, ROOT_NAME};
pub use value::{AdvanceParameter, ComponentType, PropertyBag, PropertyValue};
