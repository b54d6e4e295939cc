//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{ExecutionRepo, ResourceRepo, SchemaRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use geoingest_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL metadata store"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot carry more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepo for PostgresStore {
    async fn create_execution(&self, execution: &ExecutionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                exec_id, action, status, step, stage, handler,
                input_json, output_json, log, created_at, last_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
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
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE exec_id = $1")
            .bind(exec_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_executions(&self, limit: u32) -> MetadataResult<Vec<ExecutionRow>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions ORDER BY created_at DESC, exec_id LIMIT $1",
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
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, step = $2, stage = $3, last_updated = $4, log = log || $5
            WHERE exec_id = $6 AND status NOT IN ('success', 'failed')
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
            "UPDATE executions SET output_json = $1, last_updated = $2 WHERE exec_id = $3",
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
impl SchemaRepo for PostgresStore {
    async fn get_or_create_schema(
        &self,
        schema: &SchemaRow,
        fields: &[FieldRow],
    ) -> MetadataResult<(SchemaRow, bool)> {
        let mut tx = self.pool.begin().await?;

        // A concurrent creator holding the same key blocks this insert until
        // it commits; the insert then affects no rows and the SELECT below
        // sees the committed definition.
        let inserted = sqlx::query(
            r#"
            INSERT INTO model_schemas (schema_id, name, db_name, managed, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name, db_name) DO NOTHING
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
                    ) VALUES ($1, $2, $3, $4, $5, $6)
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
            "SELECT * FROM model_schemas WHERE name = $1 AND db_name = $2",
        )
        .bind(&schema.name)
        .bind(&schema.db_name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((row, inserted))
    }

    async fn get_schema(&self, schema_id: Uuid) -> MetadataResult<Option<SchemaRow>> {
        let row = sqlx::query_as::<_, SchemaRow>("SELECT * FROM model_schemas WHERE schema_id = $1")
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
            "SELECT * FROM model_schemas WHERE name = $1 AND db_name = $2",
        )
        .bind(name)
        .bind(db_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_schema_fields(&self, schema_id: Uuid) -> MetadataResult<Vec<FieldRow>> {
        let rows = sqlx::query_as::<_, FieldRow>(
            "SELECT * FROM model_fields WHERE schema_id = $1 ORDER BY position",
        )
        .bind(schema_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_schemas(&self) -> MetadataResult<Vec<SchemaRow>> {
        let rows =
            sqlx::query_as::<_, SchemaRow>("SELECT * FROM model_schemas ORDER BY db_name, name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ResourceRepo for PostgresStore {
    async fn create_resource(&self, resource: &ResourceRow) -> MetadataResult<ResourceRow> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO resources (
                resource_id, execution_id, name, title, table_name,
                geometry_column, geometry_type, files_json, source_resource_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (execution_id, name) DO NOTHING
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
            sqlx::query_as::<_, ResourceRow>("SELECT * FROM resources WHERE resource_id = $1")
                .bind(resource.resource_id)
                .fetch_one(&mut *tx)
                .await?
        } else {
            sqlx::query_as::<_, ResourceRow>(
                "SELECT * FROM resources WHERE execution_id = $1 AND name = $2",
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
        let row = sqlx::query_as::<_, ResourceRow>("SELECT * FROM resources WHERE resource_id = $1")
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_resources_for_execution(&self, exec_id: Uuid) -> MetadataResult<Vec<ResourceRow>> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            "SELECT * FROM resources WHERE execution_id = $1 ORDER BY created_at, name",
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
            VALUES ($1, $2, $3)
            ON CONFLICT (resource_id) DO UPDATE SET
                handler_key = EXCLUDED.handler_key,
                created_at = EXCLUDED.created_at
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
            "SELECT * FROM resource_handler_info WHERE resource_id = $1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
