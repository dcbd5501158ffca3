//! The destination table, as seen by the loader.

use async_trait::async_trait;

use crate::common::*;

/// Somewhere we can create a table and append rows to it.
///
/// [`crate::postgres::PostgresSink`] is the real implementation. Tests use an
/// in-memory version.
#[async_trait]
pub trait TableSink: Send {
    /// Drop the table if it exists, and create it empty using `schema`.
    async fn replace_table(&mut self, schema: &TableSchema) -> Result<()>;

    /// Apply `changes` to the existing table, which will then match `schema`.
    /// Stored values are converted to the new column types. Callers only ask
    /// for changes where [`ColumnChange::converts_stored_values`] is true.
    async fn widen_columns(
        &mut self,
        schema: &TableSchema,
        changes: &[ColumnChange],
    ) -> Result<()>;

    /// Append `batch` to the table, which must already exist with `schema`.
    /// Returns the number of rows written.
    ///
    /// Each call is its own unit of work. Nothing ties separate calls
    /// together.
    async fn append(&mut self, schema: &TableSchema, batch: &Batch) -> Result<u64>;
}
