use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// The three collections a bot persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Teams,
    Users,
    Channels,
}

impl TableName {
    pub const ALL: [TableName; 3] = [TableName::Teams, TableName::Users, TableName::Channels];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TableName::Teams => "botkit_teams",
            TableName::Users => "botkit_users",
            TableName::Channels => "botkit_channels",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyed JSON-document access to one collection.
///
/// Documents are JSON objects carrying a string `id`; the whole object is the
/// stored payload.
#[async_trait]
pub trait DocumentStore {
    /// Fetch the document stored under `id`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if no document has this id.
    async fn get(&self, id: &str) -> Result<Value, StoreError>;

    /// Insert `document`, or replace the stored payload if its id already exists.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidDocument` if the document has no usable id.
    async fn save(&self, document: &Value) -> Result<(), StoreError>;

    /// Every stored document, in no particular order.
    async fn all(&self) -> Result<Vec<Value>, StoreError>;
}
