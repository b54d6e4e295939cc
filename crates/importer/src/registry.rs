//! Handler registry and resolver.

use crate::error::ImportResult;
use crate::handlers::{
    GeoJsonFileHandler, GpkgFileHandler, ImportHandler, ShapeFileHandler, VectorPipeline,
};
use geoingest_core::{HandlerKind, UploadFiles};
use geoingest_metadata::MetadataStore;
use std::sync::Arc;
use uuid::Uuid;

/// Maps handler keys to handler instances and picks a handler for uploads.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ImportHandler>>,
    metadata: Arc<dyn MetadataStore>,
}

impl HandlerRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            handlers: Vec::new(),
            metadata,
        }
    }

    /// Registry with every built-in variant sharing one pipeline.
    pub fn with_defaults(metadata: Arc<dyn MetadataStore>, pipeline: Arc<VectorPipeline>) -> Self {
        let mut registry = Self::new(metadata);
        registry.register(Arc::new(GpkgFileHandler::new(pipeline.clone())));
        registry.register(Arc::new(GeoJsonFileHandler::new(pipeline.clone())));
        registry.register(Arc::new(ShapeFileHandler::new(pipeline)));
        registry
    }

    /// Add a handler. A later registration for the same kind replaces the
    /// earlier one in place, keeping resolution order.
    pub fn register(&mut self, handler: Arc<dyn ImportHandler>) {
        match self.handlers.iter_mut().find(|h| h.kind() == handler.kind()) {
            Some(existing) => *existing = handler,
            None => self.handlers.push(handler),
        }
    }

    pub fn kinds(&self) -> Vec<HandlerKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }

    /// First handler, in registration order, that accepts `files`.
    /// `None` means the upload should take the fallback path.
    pub fn resolve(&self, files: &UploadFiles) -> Option<Arc<dyn ImportHandler>> {
        let handler = self.handlers.iter().find(|h| h.is_valid(files)).cloned();
        match &handler {
            Some(h) => tracing::debug!(handler = %h.kind(), "resolved upload handler"),
            None => tracing::debug!(files = files.len(), "no handler accepts upload"),
        }
        handler
    }

    pub fn get(&self, kind: HandlerKind) -> Option<Arc<dyn ImportHandler>> {
        self.handlers.iter().find(|h| h.kind() == kind).cloned()
    }

    /// Handler recorded for a resource when it was imported, if any.
    pub async fn handler_for_resource(
        &self,
        resource_id: Uuid,
    ) -> ImportResult<Option<Arc<dyn ImportHandler>>> {
        let Some(info) = self.metadata.get_handler_info(resource_id).await? else {
            return Ok(None);
        };
        match info.handler_key.parse::<HandlerKind>() {
            Ok(kind) => Ok(self.get(kind)),
            Err(e) => {
                tracing::warn!(
                    resource_id = %resource_id,
                    handler_key = %info.handler_key,
                    error = %e,
                    "stored handler reference does not resolve"
                );
                Ok(None)
            }
        }
    }
}
