//! Repository traits for metadata operations.

pub mod executions;
pub mod resources;
pub mod schemas;

pub use executions::ExecutionRepo;
pub use resources::ResourceRepo;
pub use schemas::SchemaRepo;
