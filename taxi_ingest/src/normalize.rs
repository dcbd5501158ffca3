//! Converting raw CSV chunks into typed rows.

use crate::common::*;

/// A typed row, with one [`Value`] per [`TableSchema`] column.
pub type Row = Vec<Value>;

/// A chunk of typed rows, ready to append to the destination table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    /// Our rows, in dataset order.
    pub rows: Vec<Row>,
}

impl Batch {
    /// How many rows are in this batch?
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Is this batch empty?
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Convert `chunk` to typed rows using `schema`.
///
/// Each row gets its dataset position as its `index` value. Timestamp
/// columns which can't be parsed become `NULL`, but any other cell that
/// doesn't fit its column type is an error. Callers should widen `schema`
/// to fit `chunk` first, using [`InferredSchema::widen_to_fit`].
pub fn normalize_chunk(chunk: Chunk, schema: &TableSchema) -> Result<Batch> {
    let data_columns = &schema.columns[1..];
    if chunk.headers.len() != data_columns.len() {
        return Err(format_err!(
            "chunk has {} columns, but table has {}",
            chunk.headers.len(),
            data_columns.len(),
        ));
    }

    let mut rows = Vec::with_capacity(chunk.rows.len());
    for (offset, record) in chunk.rows.into_iter().enumerate() {
        let index = chunk.start_index + offset as u64;
        let mut row = Vec::with_capacity(schema.columns.len());
        row.push(Value::BigInt(
            i64::try_from(index).context("row index too large")?,
        ));
        for (cell, col) in record.iter().zip(data_columns) {
            let value = col.ty.parse_cell(cell).with_context(|| {
                format!("row {}, column {:?} is not a valid {}", index, col.name, col.ty)
            })?;
            row.push(value);
        }
        rows.push(row);
    }
    Ok(Batch { rows })
}
