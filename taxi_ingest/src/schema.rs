//! Destination table schemas, inferred from the first chunk of a dataset.

use std::{collections::HashMap, fmt};

use csv::StringRecord;

use chrono::NaiveDateTime;
use tokio_postgres::types::Type;

use crate::common::*;
use crate::from_csv_cell::FromCsvCell;

/// The name of the column holding each row's position in the dataset.
pub const INDEX_COLUMN: &str = "index";

/// The column types we can load.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    /// 64-bit integers.
    BigInt,
    /// 64-bit floats.
    DoublePrecision,
    /// `true` or `false`.
    Boolean,
    /// Anything at all.
    Text,
    /// Date and time, without a time zone.
    Timestamp,
}

impl ColumnType {
    /// The PostgreSQL binary `COPY` type for this column type.
    pub fn pg_type(self) -> Type {
        match self {
            ColumnType::BigInt => Type::INT8,
            ColumnType::DoublePrecision => Type::FLOAT8,
            ColumnType::Boolean => Type::BOOL,
            ColumnType::Text => Type::TEXT,
            ColumnType::Timestamp => Type::TIMESTAMP,
        }
    }

    /// Infer the narrowest type which can hold every non-empty cell in
    /// `cells`. Returns `None` if every cell is empty.
    fn infer<'a, I>(cells: I) -> Option<ColumnType>
    where
        I: Iterator<Item = &'a str> + Clone,
    {
        let mut non_empty = cells.filter(|c| !c.is_empty()).peekable();
        non_empty.peek()?;
        Some(if non_empty.clone().all(|c| i64::from_csv_cell(c).is_ok()) {
            ColumnType::BigInt
        } else if non_empty.clone().all(|c| f64::from_csv_cell(c).is_ok()) {
            ColumnType::DoublePrecision
        } else if non_empty.all(|c| bool::from_csv_cell(c).is_ok()) {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        })
    }

    /// The narrowest type which can hold values of both `self` and `other`.
    ///
    /// This agrees with [`ColumnType::infer`]: inferring over two sets of
    /// cells and joining the results gives the same type as inferring over
    /// both sets at once.
    pub fn join(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, DoublePrecision) | (DoublePrecision, BigInt) => DoublePrecision,
            _ => Text,
        }
    }

    /// Convert a CSV cell to a value of this type. Empty cells are `NULL`.
    ///
    /// Timestamps are parsed leniently: anything we can't parse becomes
    /// `NULL`. Every other type returns an error if `cell` doesn't fit.
    pub fn parse_cell(self, cell: &str) -> Result<Value> {
        if cell.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            ColumnType::BigInt => i64::from_csv_cell(cell).map(Value::BigInt),
            ColumnType::DoublePrecision => f64::from_csv_cell(cell).map(Value::Double),
            ColumnType::Boolean => bool::from_csv_cell(cell).map(Value::Boolean),
            ColumnType::Text => Ok(Value::Text(cell.to_owned())),
            ColumnType::Timestamp => match NaiveDateTime::from_csv_cell(cell) {
                Ok(timestamp) => Ok(Value::Timestamp(timestamp)),
                Err(err) => {
                    trace!("replacing bad timestamp with NULL: {}", err);
                    Ok(Value::Null)
                }
            },
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// A column in our destination table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    /// The column name, exactly as it appears in the CSV header.
    pub name: String,
    /// The column type.
    pub ty: ColumnType,
    /// Can this column contain `NULL`?
    pub is_nullable: bool,
}

/// The columns of our destination table. The first column is always
/// [`INDEX_COLUMN`], followed by the dataset's columns in header order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    /// Our columns, in order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Infer a schema from the first chunk of a dataset. Every column named
    /// in `timestamp_columns` must be present, and becomes a `Timestamp`.
    /// Columns with no values in `chunk` become `Text`.
    pub fn infer(chunk: &Chunk, timestamp_columns: &[String]) -> Result<Self> {
        Ok(InferredSchema::from_first_chunk(chunk, timestamp_columns)?.schema)
    }

    /// The PostgreSQL types of our columns, in order.
    pub fn pg_types(&self) -> Vec<Type> {
        self.columns.iter().map(|c| c.ty.pg_type()).collect()
    }
}

/// Give each header a unique name, renaming repeats to `name.1`, `name.2`
/// and so on.
fn unique_column_names(headers: &StringRecord) -> Vec<String> {
    let mut counts = HashMap::<String, usize>::new();
    let mut names = Vec::with_capacity(headers.len());
    for header in headers {
        let mut name = header.to_owned();
        let mut count = counts.get(&name).copied().unwrap_or(0);
        while count > 0 {
            counts.insert(name.clone(), count + 1);
            name = format!("{}.{}", name, count);
            count = counts.get(&name).copied().unwrap_or(0);
        }
        counts.insert(name.clone(), count + 1);
        names.push(name);
    }
    names
}

/// A change to the type of one destination column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnChange {
    /// The position of the column in our [`TableSchema`].
    pub column: usize,
    /// The column name.
    pub name: String,
    /// The column's old type.
    pub from: ColumnType,
    /// The column's new type.
    pub to: ColumnType,
    /// Did the column hold any non-`NULL` values before this change?
    pub had_values: bool,
}

impl ColumnChange {
    /// Can rows which are already stored be converted to the new type,
    /// giving exactly the values we would have stored had we known the new
    /// type from the start?
    ///
    /// Integers convert exactly to the nearest double, just like parsing
    /// their text does. But we can't recover the original text of a number
    /// or a boolean once it has been parsed.
    pub fn converts_stored_values(&self) -> bool {
        !self.had_values
            || (self.from == ColumnType::BigInt && self.to == ColumnType::DoublePrecision)
    }
}

/// A [`TableSchema`], plus what we've seen of each column so far.
///
/// Column types start out as whatever the first chunk needs, and only ever
/// get wider as later chunks arrive. Widening never depends on where the
/// chunk boundaries fall, so the final schema is the same for any chunk
/// size.
#[derive(Clone, Debug)]
pub struct InferredSchema {
    schema: TableSchema,
    /// Which columns have held a non-empty cell.
    has_values: Vec<bool>,
    /// Which columns are timestamps, and therefore never change type.
    is_timestamp: Vec<bool>,
}

impl InferredSchema {
    /// Infer a schema from the first chunk of a dataset. Every column named
    /// in `timestamp_columns` must be present.
    pub fn from_first_chunk(chunk: &Chunk, timestamp_columns: &[String]) -> Result<Self> {
        let names = unique_column_names(&chunk.headers);
        for ts_col in timestamp_columns {
            if !names.iter().any(|name| name == ts_col) {
                return Err(format_err!("dataset has no column {:?}", ts_col));
            }
        }
        if names.iter().any(|name| name == INDEX_COLUMN) {
            return Err(format_err!(
                "dataset column {:?} clashes with our row index",
                INDEX_COLUMN,
            ));
        }

        let mut columns = vec![Column {
            name: INDEX_COLUMN.to_owned(),
            ty: ColumnType::BigInt,
            is_nullable: false,
        }];
        let mut has_values = vec![true];
        let mut is_timestamp = vec![false];
        for (idx, name) in names.into_iter().enumerate() {
            let timestamp = timestamp_columns.iter().any(|ts_col| *ts_col == name);
            let ty = if timestamp {
                Some(ColumnType::Timestamp)
            } else {
                ColumnType::infer(chunk.rows.iter().map(|row| &row[idx]))
            };
            trace!("inferred {:?} as {:?}", name, ty);
            columns.push(Column {
                name,
                ty: ty.unwrap_or(ColumnType::Text),
                is_nullable: true,
            });
            has_values.push(ty.is_some());
            is_timestamp.push(timestamp);
        }
        Ok(InferredSchema {
            schema: TableSchema { columns },
            has_values,
            is_timestamp,
        })
    }

    /// Our current schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Widen our column types so that they can hold every cell in `chunk`,
    /// and return the columns we changed.
    pub fn widen_to_fit(&mut self, chunk: &Chunk) -> Result<Vec<ColumnChange>> {
        let data_columns = self.schema.columns.len() - 1;
        if chunk.headers.len() != data_columns {
            return Err(format_err!(
                "chunk has {} columns, but table has {}",
                chunk.headers.len(),
                data_columns,
            ));
        }

        let mut changes = vec![];
        for idx in 0..data_columns {
            let column = idx + 1;
            if self.is_timestamp[column] {
                continue;
            }
            let seen = match ColumnType::infer(chunk.rows.iter().map(|row| &row[idx])) {
                Some(seen) => seen,
                None => continue,
            };
            let had_values = self.has_values[column];
            let col = &mut self.schema.columns[column];
            let widened = if had_values { col.ty.join(seen) } else { seen };
            self.has_values[column] = true;
            if widened != col.ty {
                debug!("widening {:?} from {} to {}", col.name, col.ty, widened);
                changes.push(ColumnChange {
                    column,
                    name: col.name.clone(),
                    from: col.ty,
                    to: widened,
                    had_values,
                });
                col.ty = widened;
            }
        }
        Ok(changes)
    }
}
