//! Handler resolution and import orchestration.
//!
//! An upload is resolved to an [`ImportHandler`] by the [`HandlerRegistry`].
//! The [`Orchestrator`] records an execution and runs the handler's task list
//! on a pool of workers: inspect layers, build a schema per layer, load the
//! data with the external converter, publish the layers and register catalog
//! resources. Progress is visible through the [`ExecutionTracker`].

pub mod command;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod inspect;
pub mod metrics;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
pub mod schema;
pub mod tracker;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use context::{ExecutionInput, ExecutionOutput, StepContext};
pub use error::{ImportError, ImportResult};
pub use executor::{DatastoreConnection, ImportExecutor};
pub use handlers::{ImportHandler, VectorPipeline};
pub use inspect::{LayerInspector, OgrInfoInspector};
pub use orchestrator::{Orchestrator, WorkUnit};
pub use publisher::{CatalogPublisher, Publisher};
pub use registry::HandlerRegistry;
pub use schema::{DynamicModel, SchemaBuilder};
pub use tracker::ExecutionTracker;
