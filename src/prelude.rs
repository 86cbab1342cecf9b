//! Convenient imports for common storage usage.
//!
//! Bring the core types into scope with:
//! ```rust
//! use botkit_storage_postgres::prelude::*;
//! ```

pub use crate::callback::{CallbackExt, with_callback};
pub use crate::codec::Encoding;
pub use crate::config::{StorageConfig, StorageOptions};
pub use crate::document::MAX_ID_LEN;
pub use crate::error::{ErrorKind, StoreError};
pub use crate::postgres::{BootstrapState, PgTable, PoolStatus};
pub use crate::storage::Storage;
pub use crate::store::{DocumentStore, TableName};
