//! Database layer - connection pooling, statement building, and value coercion

pub mod pool;
pub mod schema;
pub mod statement;
pub mod values;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
pub use pool::Pool;
pub use schema::ColumnTypes;
pub use statement::{Dialect, InsertStatement};

/// Destination that workers execute parameterized INSERTs against.
///
/// Implementations must be safe for concurrent use by every worker.
#[async_trait]
pub trait WriteTarget: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Destination column types of `table`, keyed by lowercased column name
    async fn column_types(&self, table: &str) -> Result<ColumnTypes>;

    /// Execute `statement` once with `params` bound positionally
    async fn execute(&self, statement: &InsertStatement, params: &[String]) -> Result<()>;
}
