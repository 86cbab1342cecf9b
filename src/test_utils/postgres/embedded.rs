use postgresql_embedded::PostgreSQL;

use super::super::SHARED_RUNTIME;
use crate::codec::Encoding;
use crate::config::{StorageConfig, StorageOptions};
use crate::error::StoreError;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    /// Credentials and address of the server, with no database chosen.
    pub options: StorageOptions,
}

impl EmbeddedPostgres {
    /// Options for a storage database on this server.
    ///
    /// The database does not need to exist; the storage bootstrap creates it.
    #[must_use]
    pub fn options_for(&self, database: &str, encoding: Encoding) -> StorageOptions {
        StorageOptions {
            database: Some(database.to_string()),
            use_jsonb: Some(encoding == Encoding::NativeJson),
            ..self.options.clone()
        }
    }

    /// Resolved config for a storage database on this server, ignoring the
    /// process environment.
    ///
    /// # Errors
    /// Returns `StoreError::Config` if `database` is not a plain identifier.
    pub fn config_for(&self, database: &str, encoding: Encoding) -> Result<StorageConfig, StoreError> {
        self.options_for(database, encoding).resolve_with(|_| None)
    }
}

/// Start an embedded `PostgreSQL` server for testing.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started.
pub fn setup_postgres_embedded() -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    SHARED_RUNTIME.block_on(async {
        let mut postgresql = PostgreSQL::default();

        // Setup PostgreSQL binaries (bundled, so no download conflicts)
        postgresql.setup().await?;
        postgresql.start().await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let options = StorageOptions {
            user: Some(settings.username.clone()),
            password: Some(settings.password.clone()),
            host: Some(settings.host.clone()),
            port: Some(port),
            ..StorageOptions::default()
        };

        println!("PostgreSQL started on port {port}");

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            options,
        })
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    SHARED_RUNTIME.block_on(async move {
        let _ = postgresql.stop().await;
    });
}
