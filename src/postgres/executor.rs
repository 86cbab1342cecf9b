use bb8::Pool;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use super::bootstrap::{BootstrapFailure, BootstrapState, Bootstrapper};
use super::manager::PgManager;
use crate::error::StoreError;

enum PoolState {
    Pending(JoinHandle<Result<Pool<PgManager>, BootstrapFailure>>),
    Ready(Pool<PgManager>),
    Failed(BootstrapFailure),
    Closed,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, checked out or idle.
    pub connections: u32,
    pub idle: u32,
}

/// Runs single statements on pooled connections once the bootstrap is done.
///
/// Every operation waits for the bootstrap outcome first. A failed bootstrap
/// fails every operation with the same `Initialization` error; it is never retried.
pub struct Executor {
    state: Mutex<PoolState>,
    // Published copy of the ready pool, readable while `state` is held by a waiter.
    ready: watch::Sender<Option<Pool<PgManager>>>,
}

impl Executor {
    pub(crate) fn start(bootstrapper: Bootstrapper, runtime: &Handle) -> Self {
        let pending = runtime.spawn(bootstrapper.run());
        Self {
            state: Mutex::new(PoolState::Pending(pending)),
            ready: watch::Sender::new(None),
        }
    }

    async fn settle<'a>(&self, state: &'a mut PoolState) -> Result<&'a Pool<PgManager>, StoreError> {
        if let PoolState::Pending(handle) = state {
            *state = match handle.await {
                Ok(Ok(pool)) => {
                    self.ready.send_replace(Some(pool.clone()));
                    PoolState::Ready(pool)
                }
                Ok(Err(failure)) => PoolState::Failed(failure),
                Err(join) => PoolState::Failed(BootstrapFailure {
                    phase: BootstrapState::Failed,
                    message: format!("bootstrap task did not complete: {join}"),
                }),
            };
        }
        match &*state {
            PoolState::Ready(pool) => Ok(pool),
            PoolState::Failed(failure) => Err(failure.to_error()),
            PoolState::Closed => Err(StoreError::Closed),
            PoolState::Pending(_) => Err(StoreError::Initialization {
                phase: BootstrapState::Uninitialized,
                message: "bootstrap has not finished".to_string(),
            }),
        }
    }

    /// Wait for the bootstrap and return a handle to the shared pool.
    ///
    /// # Errors
    /// Returns `StoreError::Initialization` if the bootstrap failed, or
    /// `StoreError::Closed` after [`Executor::close`].
    pub async fn pool(&self) -> Result<Pool<PgManager>, StoreError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state).await.cloned()
    }

    /// Check out a connection, run one query on it, and return the connection.
    ///
    /// # Errors
    /// Returns `StoreError::Checkout` or `StoreError::Query`, both naming
    /// `statement`, if no connection could be obtained or the database rejected it.
    pub async fn query(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, StoreError> {
        let pool = self.pool().await?;
        // Dropping `conn` hands it back to the pool on every path out of here.
        let conn = pool
            .get()
            .await
            .map_err(|e| StoreError::checkout(statement, e))?;
        conn.query(statement, params)
            .await
            .map_err(|e| StoreError::query(statement, e))
    }

    /// Check out a connection, execute one statement on it, and return the connection.
    ///
    /// # Errors
    /// Same as [`Executor::query`].
    pub async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, StoreError> {
        let pool = self.pool().await?;
        let conn = pool
            .get()
            .await
            .map_err(|e| StoreError::checkout(statement, e))?;
        conn.execute(statement, params)
            .await
            .map_err(|e| StoreError::query(statement, e))
    }

    /// Occupancy of the pool, or `None` unless it is ready. Never waits.
    #[must_use]
    pub fn status(&self) -> Option<PoolStatus> {
        self.ready.borrow().as_ref().map(|pool| {
            let snapshot = pool.state();
            PoolStatus {
                connections: snapshot.connections,
                idle: snapshot.idle_connections,
            }
        })
    }

    /// Wait for the bootstrap, then release the pool.
    ///
    /// Connections still checked out go away as their operations finish.
    ///
    /// # Errors
    /// Returns `StoreError::Closed` if already closed, or the bootstrap's
    /// `Initialization` error if there never was a pool.
    pub async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state).await?;
        self.ready.send_replace(None);
        drop(std::mem::replace(&mut *state, PoolState::Closed));
        tracing::info!("pool closed");
        Ok(())
    }
}
