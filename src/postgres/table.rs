use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_postgres::Row;

use super::executor::Executor;
use crate::codec::Encoding;
use crate::document::document_id;
use crate::error::StoreError;
use crate::store::{DocumentStore, TableName};

struct TableSql {
    select_one: String,
    select_all: String,
    upsert: String,
}

impl TableSql {
    fn new(table: TableName) -> Self {
        let name = table.as_str();
        Self {
            select_one: format!("SELECT json FROM {name} WHERE id = $1"),
            select_all: format!("SELECT json FROM {name}"),
            upsert: format!(
                "INSERT INTO {name} (id, json) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET json = EXCLUDED.json"
            ),
        }
    }
}

/// One bot collection stored in Postgres.
///
/// Cheap to clone; clones share the storage's pool.
#[derive(Clone)]
pub struct PgTable {
    table: TableName,
    encoding: Encoding,
    executor: Arc<Executor>,
    sql: Arc<TableSql>,
}

impl fmt::Debug for PgTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTable")
            .field("table", &self.table)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl PgTable {
    pub(crate) fn new(table: TableName, encoding: Encoding, executor: Arc<Executor>) -> Self {
        Self {
            table,
            encoding,
            executor,
            sql: Arc::new(TableSql::new(table)),
        }
    }

    #[must_use]
    pub fn table(&self) -> TableName {
        self.table
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn decode(&self, row: &Row, statement: &str) -> Result<Value, StoreError> {
        let stored = self
            .encoding
            .read_column(row, 0)
            .map_err(|e| StoreError::query(statement, e))?;
        self.encoding.decode(stored)
    }

    /// [`DocumentStore::get`], deserialized into `T`.
    ///
    /// # Errors
    /// As `get`, plus `StoreError::Codec` if the document does not fit `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<T, StoreError> {
        let value = self.get(id).await?;
        serde_json::from_value(value).map_err(|source| StoreError::Codec {
            context: format!("reading '{id}' from {}", self.table),
            source,
        })
    }

    /// [`DocumentStore::save`] for any serializable record with an `id` field.
    ///
    /// # Errors
    /// As `save`, plus `StoreError::Codec` if `record` does not serialize.
    pub async fn save_as<T: Serialize + Sync>(&self, record: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Codec {
            context: format!("serializing a record for {}", self.table),
            source,
        })?;
        self.save(&value).await
    }
}

#[async_trait]
impl DocumentStore for PgTable {
    async fn get(&self, id: &str) -> Result<Value, StoreError> {
        let rows = self.executor.query(&self.sql.select_one, &[&id]).await?;
        let row = rows.first().ok_or_else(|| StoreError::NotFound {
            table: self.table.as_str(),
            id: id.to_string(),
        })?;
        self.decode(row, &self.sql.select_one)
    }

    async fn save(&self, document: &Value) -> Result<(), StoreError> {
        let id = document_id(document)?;
        let stored = self.encoding.encode(document)?;
        self.executor
            .execute(&self.sql.upsert, &[&id, &stored])
            .await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Value>, StoreError> {
        let rows = self.executor.query(&self.sql.select_all, &[]).await?;
        rows.iter()
            .map(|row| self.decode(row, &self.sql.select_all))
            .collect()
    }
}
