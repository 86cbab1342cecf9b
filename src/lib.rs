//! Keyed JSON-document storage for chat bots, backed by PostgreSQL.
//!
//! A [`Storage`] bootstraps its database and the `botkit_teams`,
//! `botkit_users` and `botkit_channels` tables on first use, then serves
//! `get` / `save` / `all` on each of them through one shared connection pool.
//! Payloads are stored either as `JSONB` or as plain text, chosen by
//! [`Encoding`].

pub mod callback;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod postgres;
pub mod prelude;
pub mod storage;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use callback::{CallbackExt, with_callback};
pub use codec::{Encoding, StoredJson};
pub use config::{StorageConfig, StorageOptions};
pub use error::{ErrorKind, StoreError};
pub use postgres::{BootstrapState, PgTable, PoolStatus};
pub use storage::Storage;
pub use store::{DocumentStore, TableName};
