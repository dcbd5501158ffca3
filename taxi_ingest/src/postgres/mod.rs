//! Writing to a PostgreSQL destination table.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use tokio_postgres::{binary_copy::BinaryCopyInWriter, Client, Config};

use crate::common::*;
use crate::tls::rustls_client_config;

mod table;

use self::table::{alter_columns_sql, copy_in_sql, PgCreateTable};

/// Connect to the database, using SSL if possible.
#[instrument(level = "debug")]
pub async fn connect(url: &UrlWithHiddenPassword) -> Result<Client> {
    // Build a basic config from our URL args.
    let config = Config::from_str(url.with_password().as_str())
        .context("could not configure PostgreSQL connection")?;

    // Set up RusTLS.
    let tls_config = rustls_client_config()?;
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // Actually create our PostgreSQL client and connect.
    let (client, connection) = config
        .connect(tls)
        .await
        .with_context(|| format!("could not connect to PostgreSQL at {}", url))?;

    // The docs say we need to run this connection object in the background.
    tokio::spawn(
        async move {
            if let Err(err) = connection.await {
                error!("error on PostgreSQL connection: {}", err);
            }
        }
        .instrument(debug_span!("postgres::connect worker")),
    );

    Ok(client)
}

/// A PostgreSQL identifier. This will be printed with quotes as necessary to
/// prevent clashes with keywords.
pub(crate) struct Ident<'a>(pub(crate) &'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

/// A PostgreSQL table name, including a possible PostgreSQL schema (in the
/// PostgreSQL sense of a namespace, not a [`TableSchema`]).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PgName {
    /// A PostgreSQL namespace, like `"public"`.
    schema: Option<String>,
    /// Our underlying name.
    name: String,
}

impl PgName {
    /// Format this name as an unquoted string.
    pub fn unquoted(&self) -> String {
        if let Some(schema) = &self.schema {
            format!("{}.{}", schema, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Properly quote a name for use in SQL. Returns a value that implements
    /// `Display`.
    pub(crate) fn quoted(&self) -> PgNameQuoted<'_> {
        PgNameQuoted(self)
    }
}

impl FromStr for PgName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (Some(schema.to_owned()), name.to_owned()),
            None => (None, s.to_owned()),
        };
        if name.is_empty() || schema.as_deref() == Some("") {
            return Err(format_err!("cannot parse PostgreSQL table name {:?}", s));
        }
        Ok(PgName { schema, name })
    }
}

/// A wrapper for `PgName` that implements `Display`.
pub(crate) struct PgNameQuoted<'a>(&'a PgName);

impl fmt::Display for PgNameQuoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.0.schema {
            write!(f, "{}.{}", Ident(schema), Ident(&self.0.name))
        } else {
            write!(f, "{}", Ident(&self.0.name))
        }
    }
}

/// A [`TableSink`] which writes to a PostgreSQL table.
pub struct PostgresSink {
    client: Client,
    table_name: PgName,
}

impl PostgresSink {
    /// Connect to the database at `url`, and prepare to write to
    /// `table_name`. This does not touch the table.
    pub async fn connect(url: &UrlWithHiddenPassword, table_name: &str) -> Result<Self> {
        let table_name = table_name.parse::<PgName>()?;
        let client = connect(url).await?;
        Ok(PostgresSink { client, table_name })
    }

    /// The table we write to.
    pub fn table_name(&self) -> &PgName {
        &self.table_name
    }
}

#[async_trait]
impl TableSink for PostgresSink {
    #[instrument(level = "debug", skip_all, fields(table = %self.table_name.unquoted()))]
    async fn replace_table(&mut self, schema: &TableSchema) -> Result<()> {
        let drop_sql = format!("DROP TABLE IF EXISTS {}", self.table_name.quoted());
        let create_sql = PgCreateTable {
            name: &self.table_name,
            schema,
        }
        .to_string();

        // Drop and create together, so nobody sees the table missing.
        let transaction = self.client.transaction().await?;
        debug!("deleting destination table if exists");
        transaction.execute(&drop_sql[..], &[]).await.with_context(|| {
            format!("error deleting existing {}", self.table_name.unquoted())
        })?;
        debug!("creating destination table: {}", create_sql);
        transaction
            .execute(&create_sql[..], &[])
            .await
            .with_context(|| format!("error creating table {}", self.table_name.unquoted()))?;
        transaction.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(table = %self.table_name.unquoted()))]
    async fn widen_columns(
        &mut self,
        _schema: &TableSchema,
        changes: &[ColumnChange],
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let alter_sql = alter_columns_sql(&self.table_name, changes);
        debug!("widening columns: {}", alter_sql);
        self.client
            .execute(&alter_sql[..], &[])
            .await
            .with_context(|| format!("error altering table {}", self.table_name.unquoted()))?;
        Ok(())
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(table = %self.table_name.unquoted(), rows = batch.len())
    )]
    async fn append(&mut self, schema: &TableSchema, batch: &Batch) -> Result<u64> {
        let copy_sql = copy_in_sql(&self.table_name, schema);
        trace!("copying with: {}", copy_sql);
        let sink = self
            .client
            .copy_in(&copy_sql[..])
            .await
            .with_context(|| format!("error starting copy into {}", self.table_name.unquoted()))?;
        let types = schema.pg_types();
        let writer = BinaryCopyInWriter::new(sink, &types);
        futures::pin_mut!(writer);
        for row in &batch.rows {
            writer.as_mut().write_raw(row.iter()).await.with_context(|| {
                format!("error copying data into {}", self.table_name.unquoted())
            })?;
        }
        let written = writer.finish().await.with_context(|| {
            format!("error finishing copy into {}", self.table_name.unquoted())
        })?;
        Ok(written)
    }
}

#[test]
fn postgres_name_is_quoted_correctly() {
    assert_eq!(
        format!("{}", PgName::from_str("example").unwrap().quoted()),
        "\"example\""
    );
    assert_eq!(
        format!("{}", PgName::from_str("public.example").unwrap().quoted()),
        "\"public\".\"example\""
    );
    assert_eq!(
        format!("{}", PgName::from_str("lat-\"lon").unwrap().quoted()),
        "\"lat-\"\"lon\""
    );
}

#[test]
fn postgres_name_rejects_empty_parts() {
    for bad in &["", ".table", "schema."] {
        assert!(PgName::from_str(bad).is_err(), "{:?}", bad);
    }
}
