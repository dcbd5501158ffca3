//! SQL for creating and loading our destination table.

use std::fmt;

use super::{Ident, PgName};
use crate::common::*;

/// A PostgreSQL `CREATE TABLE` declaration for a [`TableSchema`].
#[derive(Clone, Debug)]
pub(crate) struct PgCreateTable<'a> {
    /// The name of the table.
    pub(crate) name: &'a PgName,
    /// The table's schema.
    pub(crate) schema: &'a TableSchema,
}

impl fmt::Display for PgCreateTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CREATE TABLE {} (", self.name.quoted())?;
        for (idx, col) in self.schema.columns.iter().enumerate() {
            write!(f, "    {} {}", Ident(&col.name), col.ty)?;
            if !col.is_nullable {
                write!(f, " NOT NULL")?;
            }
            if idx + 1 == self.schema.columns.len() {
                writeln!(f)?;
            } else {
                writeln!(f, ",")?;
            }
        }
        write!(f, ")")?;
        Ok(())
    }
}

/// Generate `COPY ... FROM STDIN` SQL for loading binary data into `name`.
pub(crate) fn copy_in_sql(name: &PgName, schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|c| Ident(&c.name).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN (FORMAT binary)",
        name.quoted(),
        columns,
    )
}

/// Generate `ALTER TABLE` SQL which applies `changes` to `name`, converting
/// any stored values.
pub(crate) fn alter_columns_sql(name: &PgName, changes: &[ColumnChange]) -> String {
    let alterations = changes
        .iter()
        .map(|change| {
            let col = Ident(&change.name);
            if change.had_values {
                format!("ALTER COLUMN {} TYPE {} USING {}::{}", col, change.to, col, change.to)
            } else {
                format!("ALTER COLUMN {} TYPE {} USING NULL::{}", col, change.to, change.to)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("ALTER TABLE {} {}", name.quoted(), alterations)
}
