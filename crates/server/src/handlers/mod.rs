//! HTTP request handlers.

pub mod executions;
pub mod health;
pub mod resources;
pub mod uploads;

pub use executions::*;
pub use health::*;
pub use resources::*;
pub use uploads::*;
