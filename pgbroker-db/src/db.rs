//! Database Connection Module
//!
//! PostgreSQL implementation of [`SqlExecutor`]: a deadpool-postgres pool on
//! the administrative URL, plus single unpooled connections for tenant-scoped
//! work.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pgbroker_core::{
    BrokerError, BrokerResult, Identifier, InstanceId, Row, ScopedConnection, SqlExecutor,
};
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, warn};

use crate::admin::AdminUrl;
use crate::config::BrokerConfig;

// ============================================================================
// CONNECTION POOL
// ============================================================================

/// Create the administrative connection pool from configuration.
pub fn create_pool(config: &BrokerConfig) -> BrokerResult<Pool> {
    let manager = Manager::from_config(
        config.admin_url.config().clone(),
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(config.connect_timeout))
        .create_timeout(Some(config.connect_timeout))
        .build()
        .map_err(|e| BrokerError::connection(format!("Failed to create pool: {}", e)))
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

fn statement_error(statement: &str, err: tokio_postgres::Error) -> BrokerError {
    error!(statement = %pgbroker_core::redact(statement), "Database error: {:?}", err);
    let reason = match err.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => err.to_string(),
    };
    BrokerError::statement_failure(pgbroker_core::redact(statement), reason)
}

fn pool_error(err: deadpool_postgres::PoolError) -> BrokerError {
    error!("Connection pool error: {:?}", err);
    match err {
        deadpool_postgres::PoolError::Timeout(_) => {
            BrokerError::connection("Database connection pool exhausted")
        }
        deadpool_postgres::PoolError::Closed => {
            BrokerError::connection("Database connection pool is closed")
        }
        _ => BrokerError::connection("Failed to acquire database connection"),
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Render every column of `row` as a string. NULL and unsupported types
/// become the empty string.
fn map_row(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_string(), render_column(row, idx, column.type_())))
        .collect()
}

fn render_column(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> String {
    let rendered = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string())
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string())
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string())
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string())
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)
            .ok()
            .flatten()
            .map(|v| v.to_string())
    } else {
        row.try_get::<_, Option<String>>(idx).ok().flatten()
    };
    rendered.unwrap_or_default()
}

fn bind<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

// ============================================================================
// ADMINISTRATIVE EXECUTOR
// ============================================================================

/// Executor bound to the administrative pool.
#[derive(Clone)]
pub struct PgExecutor {
    pool: Pool,
    admin_url: AdminUrl,
    connect_timeout: std::time::Duration,
}

impl PgExecutor {
    pub fn new(pool: Pool, config: &BrokerConfig) -> Self {
        Self {
            pool,
            admin_url: config.admin_url.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    /// Create a pool and executor from configuration.
    pub fn from_config(config: &BrokerConfig) -> BrokerResult<Self> {
        Ok(Self::new(create_pool(config)?, config))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> BrokerResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn try_execute(&self, statement: &str) -> BrokerResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(statement)
            .await
            .map_err(|e| statement_error(statement, e))
    }

    async fn query_one(&self, statement: &str) -> BrokerResult<Row> {
        self.parameterized_query_one(statement, &[]).await
    }

    async fn parameterized_update(&self, statement: &str, params: &[&str]) -> BrokerResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(statement, &bind(params))
            .await
            .map_err(|e| statement_error(statement, e))
    }

    async fn parameterized_query_one(
        &self,
        statement: &str,
        params: &[&str],
    ) -> BrokerResult<Row> {
        let rows = self.parameterized_query(statement, params).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn parameterized_query(
        &self,
        statement: &str,
        params: &[&str],
    ) -> BrokerResult<Vec<Row>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(statement, &bind(params))
            .await
            .map_err(|e| statement_error(statement, e))?;
        Ok(rows.iter().map(map_row).collect())
    }

    async fn open_scoped(&self, database: &InstanceId) -> BrokerResult<Box<dyn ScopedConnection>> {
        let mut config = self.admin_url.scoped_config(database)?;
        config.connect_timeout(self.connect_timeout);

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            error!(database = %database, "Scoped connection failed: {:?}", e);
            BrokerError::connection(format!(
                "Failed to connect to database {}: {}",
                database.as_str(),
                e
            ))
        })?;

        let db_name = database.to_string();
        let task_db = db_name.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(database = %task_db, error = %e, "Scoped connection closed with error");
            }
        });

        debug!(database = %db_name, "Opened scoped connection");
        Ok(Box::new(PgScopedConnection {
            database: db_name,
            client: Some(client),
            driver: Some(driver),
        }))
    }
}

// ============================================================================
// TENANT-SCOPED CONNECTION
// ============================================================================

/// Unpooled connection attached to a tenant database.
///
/// Dropping it aborts the connection task, so the socket is released even
/// when `close` is never reached.
pub struct PgScopedConnection {
    database: String,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

#[async_trait]
impl ScopedConnection for PgScopedConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn try_execute(&self, statement: &str) -> BrokerResult<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BrokerError::connection("Scoped connection already closed"))?;
        client
            .batch_execute(statement)
            .await
            .map_err(|e| statement_error(statement, e))
    }

    async fn close(mut self: Box<Self>) {
        // Dropping the client ends the session; the driver task then finishes.
        drop(self.client.take());
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(database = %self.database, error = %e, "Scoped connection task failed");
            }
        }
        debug!(database = %self.database, "Closed scoped connection");
    }
}

impl Drop for PgScopedConnection {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
