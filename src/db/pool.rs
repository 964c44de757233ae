//! Adapter between bb8 and the sqlx PostgreSQL / MySQL drivers.
use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use derive_builder::Builder;
use sqlx::Connection;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection};
use sqlx::postgres::{PgArguments, PgConnection, Postgres};
use sqlx::query::Query;

use super::WriteTarget;
use super::schema::{self, ColumnTypes, SqlType};
use super::statement::{Dialect, InsertStatement, catalog_name};
use super::values::{FieldValue, coerce};
use crate::config::{
    CONNECT_TIMEOUT, DB_MAX_CONN, DatabaseSettings, Driver, MAX_CONNECTION_LIFETIME, PING_TIMEOUT,
};

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager<PgConnection>>),
    MySql(bb8::Pool<ConnectionManager<MySqlConnection>>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Shared write target: a bounded set of pooled connections used by every worker
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

/// Connection counts reported by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

#[derive(Builder)]
pub struct PoolArgs {
    settings: DatabaseSettings,
    #[builder(default = "DB_MAX_CONN")]
    max_pool_size: u32,
    #[builder(default = "1")]
    min_idle: u32,
}

fn run_error(e: bb8::RunError<sqlx::Error>) -> sqlx::Error {
    match e {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
    }
}

async fn build_bb8<C>(
    connect_options: C::Options,
    min_idle: u32,
    max_pool_size: u32,
) -> Result<bb8::Pool<ConnectionManager<C>>>
where
    C: Connection + 'static,
{
    bb8::Builder::new()
        .min_idle(min_idle)
        .max_size(max_pool_size)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .connection_timeout(CONNECT_TIMEOUT)
        .build(ConnectionManager::new(connect_options))
        .await
        .context("Failed to create connection pool")
}

/// Connect to the database. Fails if the initial connections cannot be established.
pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs {
        settings,
        max_pool_size,
        min_idle,
    } = args;

    tracing::info!(
        url = %settings.display_url(),
        max_pool_size,
        "connecting to database"
    );

    let inner = match settings.driver {
        Driver::Postgres => PoolInner::Postgres(
            build_bb8::<PgConnection>(settings.pg_connect_options(), min_idle, max_pool_size)
                .await?,
        ),
        Driver::MySql => PoolInner::MySql(
            build_bb8::<MySqlConnection>(
                settings.mysql_connect_options(),
                min_idle,
                max_pool_size,
            )
            .await?,
        ),
    };

    Ok(Pool { inner })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    /// Borrow the SQLite pool backing a test pool
    #[cfg(test)]
    pub fn sqlite(&self) -> &sqlx::SqlitePool {
        match &self.inner {
            PoolInner::Sqlite(pool) => pool,
            _ => panic!("not a SQLite pool"),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match &self.inner {
            PoolInner::Postgres(_) => Dialect::Postgres,
            PoolInner::MySql(_) => Dialect::MySql,
            #[cfg(test)]
            PoolInner::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub fn stats(&self) -> PoolStats {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let state = pool.state();
                PoolStats {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            }
            PoolInner::MySql(pool) => {
                let state = pool.state();
                PoolStats {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => PoolStats {
                connections: pool.size(),
                idle_connections: pool.num_idle() as u32,
            },
        }
    }

    /// Execute a statement without parameters (DDL like CREATE TABLE)
    pub async fn execute_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query(sql).execute(&mut *conn).await?;
            }
            PoolInner::MySql(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query(sql).execute(&mut *conn).await?;
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Idempotently create the destination table
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        let ddl = schema::bootstrap_ddl(self.dialect(), table);
        tracing::info!(table, "ensuring destination table exists");
        self.execute_query(&ddl)
            .await
            .with_context(|| format!("Failed to create table '{}'", table))
    }

    /// Fetch `(column_name, data_type)` for a table from `information_schema`
    async fn fetch_column_rows(&self, table: &str) -> Result<Vec<(String, String)>, sqlx::Error> {
        let table_name = table.rsplit('.').next().unwrap_or(table);
        let table_name = catalog_name(self.dialect(), table_name);

        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query_as::<_, (String, String)>(
                    r#"
                    SELECT column_name::text, data_type::text
                    FROM information_schema.columns
                    WHERE table_name = $1
                    AND table_schema = current_schema()
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(table_name)
                .fetch_all(&mut *conn)
                .await
            }
            PoolInner::MySql(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query_as::<_, (String, String)>(
                    r#"
                    SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR)
                    FROM information_schema.columns
                    WHERE table_name = ?
                    AND table_schema = DATABASE()
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(table_name)
                .fetch_all(&mut *conn)
                .await
            }
            // SQLite is loosely typed; every value is bound as text
            #[cfg(test)]
            PoolInner::Sqlite(_) => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl WriteTarget for Pool {
    fn dialect(&self) -> Dialect {
        Pool::dialect(self)
    }

    async fn column_types(&self, table: &str) -> Result<ColumnTypes> {
        let rows = self
            .fetch_column_rows(table)
            .await
            .with_context(|| format!("Failed to query column types of '{}'", table))?;
        Ok(schema::column_types_from_rows(rows))
    }

    async fn execute(&self, statement: &InsertStatement, params: &[String]) -> Result<()> {
        ensure!(
            params.len() == statement.arity(),
            "Expected {} values for {} columns, got {}",
            statement.arity(),
            statement.arity(),
            params.len()
        );

        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut query = sqlx::query(&statement.sql);
                for (value, col_type) in params.iter().zip(&statement.column_types) {
                    query = bind_postgres(query, coerce(value, col_type)?);
                }
                let mut conn = pool.get().await.map_err(run_error)?;
                query
                    .execute(&mut *conn)
                    .await
                    .context("Failed to execute INSERT")?;
            }
            PoolInner::MySql(pool) => {
                let mut query = sqlx::query(&statement.sql);
                for (value, col_type) in params.iter().zip(&statement.column_types) {
                    query = bind_mysql(query, coerce(value, col_type)?);
                }
                let mut conn = pool.get().await.map_err(run_error)?;
                query
                    .execute(&mut *conn)
                    .await
                    .context("Failed to execute INSERT")?;
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let mut query = sqlx::query(&statement.sql);
                for value in params {
                    query = query.bind(value.as_str());
                }
                query
                    .execute(pool)
                    .await
                    .context("Failed to execute INSERT")?;
            }
        }

        Ok(())
    }
}

fn bind_postgres<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: FieldValue<'q>,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        FieldValue::Null(col_type) => match col_type {
            SqlType::Boolean => query.bind(None::<bool>),
            SqlType::SmallInt => query.bind(None::<i16>),
            SqlType::Integer => query.bind(None::<i32>),
            SqlType::BigInt => query.bind(None::<i64>),
            SqlType::Real => query.bind(None::<f32>),
            SqlType::DoublePrecision | SqlType::Numeric => query.bind(None::<f64>),
            SqlType::Uuid => query.bind(None::<uuid::Uuid>),
            SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
            // Everything else is bound as text, CAST in the statement handles the rest
            _ => query.bind(None::<String>),
        },
        FieldValue::Bool(v) => query.bind(v),
        FieldValue::SmallInt(v) => query.bind(v),
        FieldValue::Integer(v) => query.bind(v),
        FieldValue::BigInt(v) => query.bind(v),
        FieldValue::Real(v) => query.bind(v),
        FieldValue::Double(v) => query.bind(v),
        FieldValue::Timestamp(v) => query.bind(v),
        FieldValue::Uuid(v) => query.bind(v),
        FieldValue::Text(v) => query.bind(v),
    }
}

fn bind_mysql<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: FieldValue<'q>,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        FieldValue::Null(col_type) => match col_type {
            SqlType::Boolean => query.bind(None::<bool>),
            SqlType::SmallInt => query.bind(None::<i16>),
            SqlType::Integer => query.bind(None::<i32>),
            SqlType::BigInt => query.bind(None::<i64>),
            SqlType::Real => query.bind(None::<f32>),
            SqlType::DoublePrecision | SqlType::Numeric => query.bind(None::<f64>),
            SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
            _ => query.bind(None::<String>),
        },
        FieldValue::Bool(v) => query.bind(v),
        FieldValue::SmallInt(v) => query.bind(v),
        FieldValue::Integer(v) => query.bind(v),
        FieldValue::BigInt(v) => query.bind(v),
        FieldValue::Real(v) => query.bind(v),
        FieldValue::Double(v) => query.bind(v),
        FieldValue::Timestamp(v) => query.bind(v),
        // MySQL has no native UUID type
        FieldValue::Uuid(v) => query.bind(v.to_string()),
        FieldValue::Text(v) => query.bind(v),
    }
}

/// bb8 connection manager for any sqlx connection type
pub struct ConnectionManager<C: Connection> {
    connect_options: C::Options,
}

impl<C: Connection> ConnectionManager<C> {
    /// Create a new `ConnectionManager` with the specified connect options.
    pub fn new(connect_options: C::Options) -> Self {
        Self { connect_options }
    }
}

impl<C> bb8::ManageConnection for ConnectionManager<C>
where
    C: Connection + 'static,
{
    type Connection = C;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        tokio::time::timeout(CONNECT_TIMEOUT, C::connect_with(&self.connect_options))
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, conn.ping())
            .await
            // Convert tokio timeouts into sqlx pool timeouts. bb8 will retry a different connection on ping failure.
            .map_err(|_| sqlx::Error::PoolTimedOut)
            // Make sure that we also look at the actual ping result
            .and_then(|result| result)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx connections provide no non-async way to check for closed/broken connections.
        false
    }
}
