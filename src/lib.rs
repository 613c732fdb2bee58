//! # lumass-core: model execution core of LUMASS
//!
//! Environmental models are graphs of *model components*. A component either
//! aggregates child components (iterated `NumIterations` times), owns exactly
//! one *process* (an algorithm with typed inputs, outputs and per-step
//! parameters) or buffers a data object between iterations.
//!
//! ## Architecture
//!
//! - **Model**: components, processes, the repository of named components and
//!   the factories creating both (built-in types plus dynamically loaded
//!   process plugins)
//! - **Controller**: plans each aggregate step upstream-first and executes it
//!   on a dedicated thread; callers use a `ControllerBridge`
//! - **Serialiser**: reads and writes `*.lmx` model files
//! - **Communication**: Crossbeam channels between the controller thread and
//!   its callers
//!
//! ## Configuration
//!
//! Host settings (plugin directory, log filter, model file indentation) live
//! in `config.toml` under the platform configuration directory, see
//! [`config::ControllerConfig`].
//!
//! ## Example
//!
//! ```ignore
//! use lumass_core::{ControllerWorker, ModelController, ProcessFactory};
//! use std::time::Duration;
//!
//! let controller = ModelController::new(ProcessFactory::global());
//! let (bridge, handle) = ControllerWorker::spawn(controller)?;
//!
//! bridge.load_model("catchment.lmx", None);
//! bridge.execute_model("root");
//! if let Some(report) = bridge.wait_for_finish(Duration::from_secs(600), |_| {}) {
//!     println!("{:?} after {}", report.outcome, report.elapsed_display());
//! }
//! bridge.shutdown();
//! handle.join().ok();
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod serialiser;

// Re-export commonly used types
pub use config::ControllerConfig;
pub use controller::{
    ControllerBridge, ControllerCommand, ControllerEvent, ControllerState, ControllerWorker,
    ExecutionOutcome, ExecutionReport, ModelController,
};
pub use error::{LumassError, Result};
pub use model::{
    DataObject, ModelComponent, ModelError, ModelResult, Process, ProcessFactory, PropertyValue,
    Repository,
};
pub use serialiser::{ModelSerialiser, NameRegister};
