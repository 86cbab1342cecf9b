use std::fmt;

use bb8::Pool;
use tokio::sync::watch;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

use super::manager::PgManager;
use crate::codec::Encoding;
use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::store::TableName;

/// Progress of the one-time schema bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    Uninitialized,
    ConnectingAdmin,
    CreatingDatabase,
    ConnectingTarget,
    CreatingSchema,
    Ready,
    Failed,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::ConnectingAdmin => "connecting to the admin database",
            BootstrapState::CreatingDatabase => "creating database",
            BootstrapState::ConnectingTarget => "connecting to the target database",
            BootstrapState::CreatingSchema => "creating schema",
            BootstrapState::Ready => "ready",
            BootstrapState::Failed => "failed",
        })
    }
}

const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_database WHERE datname = $1";

const JSON_COLUMN_TYPE: &str = "SELECT data_type::text FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1::text AND column_name = 'json'";

/// Errors a concurrent bootstrap of the same database can raise for objects
/// that exist by the time the statement finishes.
const DUPLICATE_CODES: [SqlState; 4] = [
    SqlState::DUPLICATE_DATABASE,
    SqlState::DUPLICATE_TABLE,
    SqlState::DUPLICATE_OBJECT,
    SqlState::UNIQUE_VIOLATION,
];

fn is_duplicate(err: &tokio_postgres::Error) -> bool {
    err.code().is_some_and(|code| DUPLICATE_CODES.contains(code))
}

/// DDL that makes `table` exist with the column type `encoding` needs.
#[must_use]
pub fn schema_statements(table: TableName, encoding: Encoding) -> Vec<String> {
    let name = table.as_str();
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {name} (id char(50) NOT NULL PRIMARY KEY, json {} NOT NULL)",
        encoding.column_type()
    )];
    if encoding == Encoding::NativeJson {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {name}_json_idx ON {name} USING GIN (json jsonb_path_ops)"
        ));
    }
    statements
}

/// Where and why a bootstrap stopped. Kept so every later operation can
/// report the same failure.
#[derive(Debug, Clone)]
pub(crate) struct BootstrapFailure {
    pub(crate) phase: BootstrapState,
    pub(crate) message: String,
}

impl BootstrapFailure {
    pub(crate) fn to_error(&self) -> StoreError {
        StoreError::Initialization {
            phase: self.phase,
            message: self.message.clone(),
        }
    }
}

/// Creates the database, tables and index, then hands back a pool bound to them.
pub(crate) struct Bootstrapper {
    config: StorageConfig,
    phase: watch::Sender<BootstrapState>,
}

impl Bootstrapper {
    pub(crate) fn new(config: StorageConfig, phase: watch::Sender<BootstrapState>) -> Self {
        Self { config, phase }
    }

    pub(crate) async fn run(self) -> Result<Pool<PgManager>, BootstrapFailure> {
        match self.steps().await {
            Ok(pool) => {
                self.enter(BootstrapState::Ready);
                tracing::info!(addr = %self.config.target(), "connected");
                Ok(pool)
            }
            Err(err) => {
                let phase = *self.phase.borrow();
                self.enter(BootstrapState::Failed);
                let message = match err {
                    StoreError::Initialization { message, .. } => message,
                    other => other.to_string(),
                };
                tracing::error!(%phase, %message, "error running setup");
                Err(BootstrapFailure { phase, message })
            }
        }
    }

    async fn steps(&self) -> Result<Pool<PgManager>, StoreError> {
        self.enter(BootstrapState::ConnectingAdmin);
        let admin = self.connect(&self.config.admin_pg_config()).await?;

        self.enter(BootstrapState::CreatingDatabase);
        ensure_database(&admin, &self.config.database).await?;
        drop(admin);

        self.enter(BootstrapState::ConnectingTarget);
        let client = self.connect(&self.config.pg_config()).await?;

        self.enter(BootstrapState::CreatingSchema);
        for table in TableName::ALL {
            ensure_table(&client, table, self.config.encoding).await?;
        }
        drop(client);

        PgManager::new(self.config.pg_config())
            .build_pool(&self.config)
            .await
            .map_err(|e| self.fail(format!("postgres pool error: {e}")))
    }

    fn enter(&self, phase: BootstrapState) {
        tracing::debug!(%phase, database = %self.config.database, "bootstrap");
        self.phase.send_replace(phase);
    }

    fn fail(&self, message: String) -> StoreError {
        StoreError::Initialization {
            phase: *self.phase.borrow(),
            message,
        }
    }

    async fn connect(&self, config: &tokio_postgres::Config) -> Result<Client, StoreError> {
        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            self.fail(format!(
                "could not connect to {}:{}/{}: {e}",
                self.config.host,
                self.config.port,
                config.get_dbname().unwrap_or_default()
            ))
        })?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::warn!(%error, "bootstrap connection closed with error");
            }
        });
        Ok(client)
    }
}

async fn database_exists(client: &Client, name: &str) -> Result<bool, StoreError> {
    let rows = client
        .query(DATABASE_EXISTS, &[&name])
        .await
        .map_err(|e| StoreError::query(DATABASE_EXISTS, e))?;
    Ok(!rows.is_empty())
}

async fn ensure_database(client: &Client, name: &str) -> Result<(), StoreError> {
    if database_exists(client, name).await? {
        return Ok(());
    }

    tracing::info!(database = name, "creating db");
    // Identifier was validated during config resolution.
    let create = format!("CREATE DATABASE \"{name}\"");
    match client.batch_execute(&create).await {
        Ok(()) => Ok(()),
        Err(err) if is_duplicate(&err) => {
            if database_exists(client, name).await? {
                tracing::debug!(database = name, "database was created concurrently");
                Ok(())
            } else {
                Err(StoreError::query(&create, err))
            }
        }
        Err(err) => Err(StoreError::query(&create, err)),
    }
}

async fn ensure_table(
    client: &Client,
    table: TableName,
    encoding: Encoding,
) -> Result<(), StoreError> {
    for statement in schema_statements(table, encoding) {
        if let Err(err) = client.batch_execute(&statement).await {
            if !is_duplicate(&err) {
                return Err(StoreError::query(&statement, err));
            }
            tracing::debug!(table = %table, "schema object was created concurrently");
        }
    }
    verify_json_column(client, table, encoding).await
}

/// A table created earlier with the other encoding would silently mis-decode.
async fn verify_json_column(
    client: &Client,
    table: TableName,
    encoding: Encoding,
) -> Result<(), StoreError> {
    let rows = client
        .query(JSON_COLUMN_TYPE, &[&table.as_str()])
        .await
        .map_err(|e| StoreError::query(JSON_COLUMN_TYPE, e))?;
    let found = match rows.first() {
        Some(row) => row
            .try_get::<_, String>(0)
            .map_err(|e| StoreError::query(JSON_COLUMN_TYPE, e))?,
        None => "no json column".to_string(),
    };
    if found == encoding.catalog_type() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch {
            table: table.as_str(),
            expected: encoding.catalog_type(),
            found,
        })
    }
}
