//! HTTP API server for geoingest.
//!
//! Accepts multipart uploads and resource copies, hands them to the import
//! pipeline and exposes execution status for polling.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, FallbackUpload, GenericCopier, MetadataCopier, RejectUnsupported};
