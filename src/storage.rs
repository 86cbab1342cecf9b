use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::callback::with_callback;
use crate::codec::Encoding;
use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::postgres::bootstrap::Bootstrapper;
use crate::postgres::{BootstrapState, Executor, PgTable, PoolStatus};
use crate::store::TableName;

/// Team, user, and channel storage sharing one connection pool.
///
/// Creating a `Storage` starts the schema bootstrap in the background; every
/// table operation waits for it to finish. Call [`Storage::close`] to release
/// the pool.
///
/// ```rust,no_run
/// use botkit_storage_postgres::prelude::*;
/// use serde_json::json;
///
/// # async fn demo() -> Result<(), StoreError> {
/// let config = StorageOptions::default().resolve()?;
/// let storage = Storage::new(config)?;
///
/// storage.teams().save(&json!({"id": "T1", "name": "Acme"})).await?;
/// let team = storage.teams().get("T1").await?;
/// assert_eq!(team["name"], "Acme");
///
/// storage.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Storage {
    executor: Arc<Executor>,
    phase: watch::Receiver<BootstrapState>,
    encoding: Encoding,
    target: String,
    teams: PgTable,
    users: PgTable,
    channels: PgTable,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("target", &self.target)
            .field("encoding", &self.encoding)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Start bootstrapping `config` and return immediately.
    ///
    /// # Errors
    /// Returns `StoreError::Config` when called outside a Tokio runtime.
    pub fn new(config: StorageConfig) -> Result<Self, StoreError> {
        let runtime = Handle::try_current().map_err(|e| {
            StoreError::Config(format!("storage must be created inside a Tokio runtime: {e}"))
        })?;
        let (phase_tx, phase) = watch::channel(BootstrapState::Uninitialized);
        let encoding = config.encoding;
        let target = config.target();
        let executor = Arc::new(Executor::start(
            Bootstrapper::new(config, phase_tx),
            &runtime,
        ));

        let table = |name| PgTable::new(name, encoding, Arc::clone(&executor));
        let (teams, users, channels) = (
            table(TableName::Teams),
            table(TableName::Users),
            table(TableName::Channels),
        );

        Ok(Self {
            executor,
            phase,
            encoding,
            target,
            teams,
            users,
            channels,
        })
    }

    /// [`Storage::new`], then wait until the bootstrap has finished.
    ///
    /// # Errors
    /// Returns `StoreError::Initialization` if the bootstrap failed.
    pub async fn connect(config: StorageConfig) -> Result<Self, StoreError> {
        let storage = Self::new(config)?;
        storage.ready().await?;
        Ok(storage)
    }

    /// Wait for the bootstrap outcome.
    ///
    /// # Errors
    /// Returns `StoreError::Initialization` if it failed, `StoreError::Closed` after close.
    pub async fn ready(&self) -> Result<(), StoreError> {
        self.executor.pool().await.map(|_| ())
    }

    /// Current bootstrap phase.
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.phase.borrow()
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn teams(&self) -> &PgTable {
        &self.teams
    }

    #[must_use]
    pub fn users(&self) -> &PgTable {
        &self.users
    }

    #[must_use]
    pub fn channels(&self) -> &PgTable {
        &self.channels
    }

    #[must_use]
    pub fn table(&self, name: TableName) -> &PgTable {
        match name {
            TableName::Teams => &self.teams,
            TableName::Users => &self.users,
            TableName::Channels => &self.channels,
        }
    }

    /// Pool occupancy once ready; `None` while bootstrapping, after a failure
    /// or after close.
    #[must_use]
    pub fn status(&self) -> Option<PoolStatus> {
        self.executor.status()
    }

    /// Release the pool after any pending bootstrap finishes.
    ///
    /// # Errors
    /// Returns `StoreError::Closed` on a second call, or the bootstrap's
    /// `Initialization` error if it never produced a pool.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.executor.close().await
    }

    /// Callback form of [`Storage::close`].
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn close_with<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        with_callback(async move { executor.close().await }, callback)
    }
}
