//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ExecutionRepo, ResourceRepo, SchemaRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ExecutionRepo + SchemaRepo + ResourceRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if missing.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Single connection: pipeline workers and request handlers share one
        // writer, which keeps SQLite from returning "database is locked".
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout.as_secs(),
            "SQLite metadata store ready (query timeout is advisory)"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn warn_if_slow(&self, operation: &str, started: std::time::Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl ExecutionRepo for SqliteStore {
        async fn create_execution(&self, execution: &ExecutionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO executions (
                    exec_id, action, status, step, stage, handler,
                    input_json, output_json, log, created_at, last_updated
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(execution.exec_id)
            .bind(&execution.action)
            .bind(&execution.status)
            .bind(&execution.step)
            .bind(&execution.stage)
            .bind(&execution.handler)
            .bind(&execution.input_json)
            .bind(&execution.output_json)
            .bind(&execution.log)
            .bind(execution.created_at)
            .bind(execution.last_updated)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    MetadataError::AlreadyExists(format!(
                        "execution {} already exists",
                        execution.exec_id
                    ))
                }
                other => MetadataError::Database(other),
            })?;
            Ok(())
        }

        async fn get_execution(&self, exec_id: Uuid) -> MetadataResult<Option<ExecutionRow>> {
            let row =
                sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE exec_id = ?")
                    .bind(exec_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_executions(&self, limit: u32) -> MetadataResult<Vec<ExecutionRow>> {
            let rows = sqlx::query_as::<_, ExecutionRow>(
                "SELECT * FROM executions ORDER BY created_at DESC, exec_id LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_execution(
            &self,
            exec_id: Uuid,
            update: &ExecutionUpdate,
        ) -> MetadataResult<()> {
            let started = std::time::Instant::now();
            let result = sqlx::query(
                r#"
                UPDATE executions
                SET status = ?, step = ?, stage = ?, last_updated = ?, log = log || ?
                WHERE exec_id = ? AND status NOT IN ('success', 'failed')
                "#,
            )
            .bind(&update.status)
            .bind(&update.step)
            .bind(&update.stage)
            .bind(update.last_updated)
            .bind(format!("{}\n", update.log_line))
            .bind(exec_id)
            .execute(&self.pool)
            .await?;
            self.warn_if_slow("update_execution", started);

            if result.rows_affected() == 0 {
                return match self.get_execution(exec_id).await? {
                    Some(row) => Err(MetadataError::InvalidStateTransition {
                        from: row.status,
                        to: update.status.clone(),
                    }),
                    None => Err(MetadataError::NotFound(format!(
                        "execution {exec_id} not found"
                    ))),
                };
            }
            Ok(())
        }

        async fn set_execution_output(
            &self,
            exec_id: Uuid,
            output_json: &str,
            last_updated: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE executions SET output_json = ?, last_updated = ? WHERE exec_id = ?",
            )
            .bind(output_json)
            .bind(last_updated)
            .bind(exec_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "execution {exec_id} not found"
                )));
            }
            Ok(())
        }

        async fn get_unfinished_executions(&self) -> MetadataResult<Vec<ExecutionRow>> {
            let rows = sqlx::query_as::<_, ExecutionRow>(
                "SELECT * FROM executions WHERE status IN ('created', 'running') ORDER BY created_at",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl SchemaRepo for SqliteStore {
        async fn get_or_create_schema(
            &self,
            schema: &SchemaRow,
            fields: &[FieldRow],
        ) -> MetadataResult<(SchemaRow, bool)> {
            let started = std::time::Instant::now();
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO model_schemas (schema_id, name, db_name, managed, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(name, db_name) DO NOTHING
                "#,
            )
            .bind(schema.schema_id)
            .bind(&schema.name)
            .bind(&schema.db_name)
            .bind(schema.managed)
            .bind(schema.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            if inserted {
                for field in fields {
                    sqlx::query(
                        r#"
                        INSERT INTO model_fields (
                            schema_id, position, name, class_name, nullable, max_length
                        ) VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(schema.schema_id)
                    .bind(field.position)
                    .bind(&field.name)
                    .bind(&field.class_name)
                    .bind(field.nullable)
                    .bind(field.max_length)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                            MetadataError::Constraint(format!(
                                "duplicate field '{}' in schema '{}'",
                                field.name, schema.name
                            ))
                        }
                        other => MetadataError::Database(other),
                    })?;
                }
            }

            let row = sqlx::query_as::<_, SchemaRow>(
                "SELECT * FROM model_schemas WHERE name = ? AND db_name = ?",
            )
            .bind(&schema.name)
            .bind(&schema.db_name)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            self.warn_if_slow("get_or_create_schema", started);
            Ok((row, inserted))
        }

        async fn get_schema(&self, schema_id: Uuid) -> MetadataResult<Option<SchemaRow>> {
            let row =
                sqlx::query_as::<_, SchemaRow>("SELECT * FROM model_schemas WHERE schema_id = ?")
                    .bind(schema_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_schema_by_name(
            &self,
            name: &str,
            db_name: &str,
        ) -> MetadataResult<Option<SchemaRow>> {
            let row = sqlx::query_as::<_, SchemaRow>(
                "SELECT * FROM model_schemas WHERE name = ? AND db_name = ?",
            )
            .bind(name)
            .bind(db_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_schema_fields(&self, schema_id: Uuid) -> MetadataResult<Vec<FieldRow>> {
            let rows = sqlx::query_as::<_, FieldRow>(
                "SELECT * FROM model_fields WHERE schema_id = ? ORDER BY position",
            )
            .bind(schema_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_schemas(&self) -> MetadataResult<Vec<SchemaRow>> {
            let rows = sqlx::query_as::<_, SchemaRow>(
                "SELECT * FROM model_schemas ORDER BY db_name, name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl ResourceRepo for SqliteStore {
        async fn create_resource(&self, resource: &ResourceRow) -> MetadataResult<ResourceRow> {
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO resources (
                    resource_id, execution_id, name, title, table_name,
                    geometry_column, geometry_type, files_json, source_resource_id, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(execution_id, name) DO NOTHING
                "#,
            )
            .bind(resource.resource_id)
            .bind(resource.execution_id)
            .bind(&resource.name)
            .bind(&resource.title)
            .bind(&resource.table_name)
            .bind(&resource.geometry_column)
            .bind(&resource.geometry_type)
            .bind(&resource.files_json)
            .bind(resource.source_resource_id)
            .bind(resource.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            let row = if inserted {
                sqlx::query_as::<_, ResourceRow>("SELECT * FROM resources WHERE resource_id = ?")
                    .bind(resource.resource_id)
                    .fetch_one(&mut *tx)
                    .await?
            } else {
                sqlx::query_as::<_, ResourceRow>(
                    "SELECT * FROM resources WHERE execution_id = ? AND name = ?",
                )
                .bind(resource.execution_id)
                .bind(&resource.name)
                .fetch_one(&mut *tx)
                .await?
            };

            tx.commit().await?;
            Ok(row)
        }

        async fn get_resource(&self, resource_id: Uuid) -> MetadataResult<Option<ResourceRow>> {
            let row =
                sqlx::query_as::<_, ResourceRow>("SELECT * FROM resources WHERE resource_id = ?")
                    .bind(resource_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_resources_for_execution(
            &self,
            exec_id: Uuid,
        ) -> MetadataResult<Vec<ResourceRow>> {
            let rows = sqlx::query_as::<_, ResourceRow>(
                "SELECT * FROM resources WHERE execution_id = ? ORDER BY created_at, name",
            )
            .bind(exec_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn set_handler_info(
            &self,
            resource_id: Uuid,
            handler_key: &str,
            created_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO resource_handler_info (resource_id, handler_key, created_at)
                VALUES (?, ?, ?)
                ON CONFLICT(resource_id) DO UPDATE SET
                    handler_key = excluded.handler_key,
                    created_at = excluded.created_at
                "#,
            )
            .bind(resource_id)
            .bind(handler_key)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    MetadataError::NotFound(format!("resource {resource_id} not found"))
                }
                other => MetadataError::Database(other),
            })?;
            Ok(())
        }

        async fn get_handler_info(
            &self,
            resource_id: Uuid,
        ) -> MetadataResult<Option<ResourceHandlerInfoRow>> {
            let row = sqlx::query_as::<_, ResourceHandlerInfoRow>(
                "SELECT * FROM resource_handler_info WHERE resource_id = ?",
            )
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Execution requests
CREATE TABLE IF NOT EXISTS executions (
    exec_id BLOB PRIMARY KEY,
    action TEXT NOT NULL,
    status TEXT NOT NULL,
    step TEXT NOT NULL,
    stage TEXT NOT NULL,
    handler TEXT,
    input_json TEXT NOT NULL,
    output_json TEXT,
    log TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
CREATE INDEX IF NOT EXISTS idx_executions_created ON executions(created_at);

-- Dynamic schema definitions
CREATE TABLE IF NOT EXISTS model_schemas (
    schema_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    db_name TEXT NOT NULL,
    managed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (name, db_name)
);

CREATE TABLE IF NOT EXISTS model_fields (
    schema_id BLOB NOT NULL REFERENCES model_schemas(schema_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    class_name TEXT NOT NULL,
    nullable INTEGER NOT NULL DEFAULT 1,
    max_length INTEGER,
    PRIMARY KEY (schema_id, position),
    UNIQUE (schema_id, name)
);

-- Catalog resources
CREATE TABLE IF NOT EXISTS resources (
    resource_id BLOB PRIMARY KEY,
    execution_id BLOB,
    name TEXT NOT NULL,
    title TEXT NOT NULL,
    table_name TEXT NOT NULL,
    geometry_column TEXT,
    geometry_type TEXT,
    files_json TEXT,
    source_resource_id BLOB,
    created_at TEXT NOT NULL,
    UNIQUE (execution_id, name)
);
CREATE INDEX IF NOT EXISTS idx_resources_execution ON resources(execution_id);

CREATE TABLE IF NOT EXISTS resource_handler_info (
    resource_id BLOB PRIMARY KEY REFERENCES resources(resource_id) ON DELETE CASCADE,
    handler_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;
