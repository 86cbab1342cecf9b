use std::future::Future;
use std::time::Duration;

use bb8::{ErrorSink, ManageConnection, Pool};
use tokio_postgres::{Client, NoTls};

use crate::config::StorageConfig;

// bb8 requires a finite checkout deadline; this stands in for "wait as long as it takes".
const UNBOUNDED_CHECKOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// bb8 manager for Postgres clients bound to the storage database.
pub struct PgManager {
    pub(crate) config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    /// Build a pool from this manager, sized and timed by `settings`.
    ///
    /// # Errors
    /// Returns the driver error if the pool cannot establish its initial connections.
    pub async fn build_pool(
        self,
        settings: &StorageConfig,
    ) -> Result<Pool<PgManager>, tokio_postgres::Error> {
        Pool::builder()
            .max_size(settings.max_clients)
            .idle_timeout(settings.idle_timeout)
            .connection_timeout(settings.checkout_timeout.unwrap_or(UNBOUNDED_CHECKOUT))
            .retry_connection(false)
            .error_sink(Box::new(LogErrorSink))
            .build(self)
            .await
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            tracing::trace!(
                hosts = ?cfg.get_hosts(),
                db = ?cfg.get_dbname(),
                "opening pooled connection"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(error) = connection.await {
                    tracing::error!(%error, "idle client error");
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// Receives errors the pool hits outside of any caller's checkout, such as a
/// failed background reconnect. They are logged and otherwise dropped.
#[derive(Debug, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink<tokio_postgres::Error> for LogErrorSink {
    fn sink(&self, error: tokio_postgres::Error) {
        tracing::error!(%error, "pool background error");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<tokio_postgres::Error>> {
        Box::new(*self)
    }
}
