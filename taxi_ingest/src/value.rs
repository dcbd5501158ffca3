//! Typed cell values, ready to be sent to PostgreSQL.

use std::error;

use bytes::BytesMut;
use chrono::NaiveDateTime;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A single typed cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// An SQL `NULL`.
    Null,
    /// A `BIGINT`.
    BigInt(i64),
    /// A `DOUBLE PRECISION`.
    Double(f64),
    /// A `BOOLEAN`.
    Boolean(bool),
    /// A `TEXT` value.
    Text(String),
    /// A `TIMESTAMP` without a time zone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Is this value `NULL`?
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn error::Error + Sync + Send>> {
        // Use the checked versions here, so that a value which doesn't match
        // its column type becomes an error instead of corrupt COPY data.
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::BigInt(v) => v.to_sql_checked(ty, out),
            Value::Double(v) => v.to_sql_checked(ty, out),
            Value::Boolean(v) => v.to_sql_checked(ty, out),
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <bool as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <NaiveDateTime as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

#[test]
fn values_serialize_for_their_own_types() {
    let mut out = BytesMut::new();
    let examples = &[
        (Value::BigInt(42), Type::INT8),
        (Value::Double(2.5), Type::FLOAT8),
        (Value::Boolean(true), Type::BOOL),
        (Value::Text("N".to_owned()), Type::TEXT),
    ];
    for (value, ty) in examples {
        assert!(matches!(value.to_sql_checked(ty, &mut out), Ok(IsNull::No)));
    }
    assert!(matches!(
        Value::Null.to_sql_checked(&Type::INT8, &mut out),
        Ok(IsNull::Yes)
    ));
}

#[test]
fn values_refuse_mismatched_types() {
    let mut out = BytesMut::new();
    assert!(Value::Text("abc".to_owned())
        .to_sql_checked(&Type::INT8, &mut out)
        .is_err());
}
