//! Catalog resource repository.

use crate::error::MetadataResult;
use crate::models::{ResourceHandlerInfoRow, ResourceRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for catalog resources and their handler references.
#[async_trait]
pub trait ResourceRepo: Send + Sync {
    /// Insert a resource unless one already exists for `(execution_id, name)`.
    /// Returns the persisted row, which is the existing one on conflict.
    async fn create_resource(&self, resource: &ResourceRow) -> MetadataResult<ResourceRow>;

    async fn get_resource(&self, resource_id: Uuid) -> MetadataResult<Option<ResourceRow>>;

    async fn get_resources_for_execution(&self, exec_id: Uuid) -> MetadataResult<Vec<ResourceRow>>;

    /// Store the handler reference for a resource, replacing any previous one.
    async fn set_handler_info(
        &self,
        resource_id: Uuid,
        handler_key: &str,
        created_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    async fn get_handler_info(
        &self,
        resource_id: Uuid,
    ) -> MetadataResult<Option<ResourceHandlerInfoRow>>;
}
