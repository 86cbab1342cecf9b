use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::codec::Encoding;
use crate::error::StoreError;

const ENV_PREFIX: &str = "BOTKIT_STORAGE_POSTGRES_";

const DEFAULT_USER: &str = "botkit";
const DEFAULT_PASSWORD: &str = "botkit";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "botkit";
// Sessions on template1 make concurrent CREATE DATABASE calls fail, so the
// maintenance database is the default place to issue them from.
const DEFAULT_ADMIN_DATABASE: &str = "postgres";
const DEFAULT_MAX_CLIENTS: u32 = 10;
const DEFAULT_IDLE_TIMEOUT_MILLIS: u64 = 30_000;

lazy_static! {
    // The database name is spliced into CREATE DATABASE, so only plain identifiers pass.
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
}

/// Storage options as supplied by the hosting bot.
///
/// Every field is optional. Anything left unset falls back to the matching
/// `BOTKIT_STORAGE_POSTGRES_*` environment variable and then to a default:
/// ```rust
/// use botkit_storage_postgres::prelude::*;
///
/// let options: StorageOptions = serde_json::from_str(
///     r#"{"host": "db.internal", "maxClients": 4, "useJsonB": true}"#,
/// ).unwrap();
/// let config = options.resolve_with(|_| None).unwrap();
/// assert_eq!(config.port, 5432);
/// assert_eq!(config.max_clients, 4);
/// assert_eq!(config.encoding, Encoding::NativeJson);
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    #[serde(alias = "max")]
    pub max_clients: Option<u32>,
    pub idle_timeout_millis: Option<u64>,
    #[serde(rename = "useJsonB", alias = "useJsonb")]
    pub use_jsonb: Option<bool>,
    pub checkout_timeout_millis: Option<u64>,
    /// Existing database the bootstrap connects to while creating `database`.
    pub admin_database: Option<String>,
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("max_clients", &self.max_clients)
            .field("idle_timeout_millis", &self.idle_timeout_millis)
            .field("use_jsonb", &self.use_jsonb)
            .field("checkout_timeout_millis", &self.checkout_timeout_millis)
            .field("admin_database", &self.admin_database)
            .finish()
    }
}

impl StorageOptions {
    /// Resolve against the process environment.
    ///
    /// # Errors
    /// See [`StorageOptions::resolve_with`].
    pub fn resolve(self) -> Result<StorageConfig, StoreError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup; `env` receives the full
    /// variable name, e.g. `BOTKIT_STORAGE_POSTGRES_PORT`.
    ///
    /// # Errors
    /// Returns `StoreError::Config` if an environment value does not parse, the
    /// database name is not a plain identifier, or `maxClients` is zero.
    pub fn resolve_with<F>(self, env: F) -> Result<StorageConfig, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(&format!("{ENV_PREFIX}{name}"));

        let user = self
            .user
            .or_else(|| lookup("USER"))
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        let password = self
            .password
            .or_else(|| lookup("PASSWORD"))
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());
        let host = self
            .host
            .or_else(|| lookup("HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let database = self
            .database
            .or_else(|| lookup("DATABASE"))
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let admin_database = self
            .admin_database
            .or_else(|| lookup("ADMIN_DATABASE"))
            .unwrap_or_else(|| DEFAULT_ADMIN_DATABASE.to_string());
        let port = pick(self.port, &lookup, "PORT", DEFAULT_PORT)?;
        let max_clients = pick(self.max_clients, &lookup, "MAX_CLIENTS", DEFAULT_MAX_CLIENTS)?;
        let idle_timeout_millis = pick(
            self.idle_timeout_millis,
            &lookup,
            "IDLE_TIMEOUT_MILLIS",
            DEFAULT_IDLE_TIMEOUT_MILLIS,
        )?;
        let use_jsonb = match self.use_jsonb {
            Some(flag) => flag,
            None => lookup("USE_JSONB")
                .map(|raw| parse_flag("USE_JSONB", &raw))
                .transpose()?
                .unwrap_or(false),
        };

        if !IDENTIFIER.is_match(&database) {
            return Err(StoreError::Config(format!(
                "database name '{database}' must be a plain identifier (letters, digits, underscore)"
            )));
        }
        if admin_database.is_empty() || admin_database == database {
            return Err(StoreError::Config(format!(
                "admin database '{admin_database}' must name an existing database other than '{database}'"
            )));
        }
        if host.is_empty() {
            return Err(StoreError::Config("host is required".to_string()));
        }
        if user.is_empty() {
            return Err(StoreError::Config("user is required".to_string()));
        }
        if max_clients == 0 {
            return Err(StoreError::Config(
                "maxClients must be at least 1".to_string(),
            ));
        }

        Ok(StorageConfig {
            user,
            password,
            host,
            port,
            database,
            admin_database,
            max_clients,
            idle_timeout: (idle_timeout_millis > 0)
                .then(|| Duration::from_millis(idle_timeout_millis)),
            checkout_timeout: self.checkout_timeout_millis.map(Duration::from_millis),
            encoding: Encoding::from_use_jsonb(use_jsonb),
        })
    }
}

fn pick<T, F>(explicit: Option<T>, lookup: &F, name: &str, default: T) -> Result<T, StoreError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit {
        return Ok(value);
    }
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            StoreError::Config(format!(
                "{ENV_PREFIX}{name} must be a non-negative integer, got '{raw}'"
            ))
        }),
        None => Ok(default),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, StoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Config(format!(
            "{ENV_PREFIX}{name} must be true or false, got '{raw}'"
        ))),
    }
}

/// Fully resolved connection and pool settings.
#[derive(Clone)]
pub struct StorageConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub admin_database: String,
    /// Pool connection ceiling.
    pub max_clients: u32,
    /// Idle connections are recycled after this long; `None` keeps them.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on waiting for a pooled connection; `None` waits indefinitely.
    pub checkout_timeout: Option<Duration>,
    pub encoding: Encoding,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("admin_database", &self.admin_database)
            .field("max_clients", &self.max_clients)
            .field("idle_timeout", &self.idle_timeout)
            .field("checkout_timeout", &self.checkout_timeout)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl StorageConfig {
    /// Connection settings for the target database.
    #[must_use]
    pub fn pg_config(&self) -> tokio_postgres::Config {
        self.pg_config_for(&self.database)
    }

    /// Connection settings for the admin database.
    #[must_use]
    pub fn admin_pg_config(&self) -> tokio_postgres::Config {
        self.pg_config_for(&self.admin_database)
    }

    fn pg_config_for(&self, dbname: &str) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.user(&self.user)
            .password(&self.password)
            .host(&self.host)
            .port(self.port)
            .dbname(dbname)
            .application_name("botkit-storage-postgres");
        cfg
    }

    /// `host:port/database`, for log lines.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = StorageOptions::default().resolve_with(|_| None).unwrap();
        assert_eq!(cfg.user, "botkit");
        assert_eq!(cfg.password, "botkit");
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.database, "botkit");
        assert_eq!(cfg.admin_database, "postgres");
        assert_eq!(cfg.max_clients, 10);
        assert_eq!(cfg.idle_timeout, Some(Duration::from_millis(30_000)));
        assert_eq!(cfg.checkout_timeout, None);
        assert_eq!(cfg.encoding, Encoding::TextJson);
        assert_eq!(cfg.target(), "localhost:5432/botkit");
    }

    #[test]
    fn environment_fills_gaps_but_explicit_options_win() {
        let env = env_of(&[
            ("HOST", "env-host"),
            ("PORT", "6543"),
            ("DATABASE", "from_env"),
            ("MAX_CLIENTS", "3"),
            ("USE_JSONB", "true"),
        ]);
        let options = StorageOptions {
            host: Some("explicit-host".into()),
            ..StorageOptions::default()
        };
        let cfg = options.resolve_with(env).unwrap();
        assert_eq!(cfg.host, "explicit-host");
        assert_eq!(cfg.port, 6543);
        assert_eq!(cfg.database, "from_env");
        assert_eq!(cfg.max_clients, 3);
        assert_eq!(cfg.encoding, Encoding::NativeJson);
    }

    #[test]
    fn false_strings_do_not_enable_jsonb() {
        for raw in ["false", "0", "no", ""] {
            let cfg = StorageOptions::default()
                .resolve_with(env_of(&[("USE_JSONB", raw)]))
                .unwrap();
            assert_eq!(cfg.encoding, Encoding::TextJson, "{raw:?}");
        }
        let err = StorageOptions::default()
            .resolve_with(env_of(&[("USE_JSONB", "maybe")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = StorageOptions::default()
            .resolve_with(env_of(&[("PORT", "fifty")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("BOTKIT_STORAGE_POSTGRES_PORT"));
    }

    #[test]
    fn database_name_must_be_an_identifier() {
        for bad in ["", "bot kit", "bot\"kit", "1botkit", "bot;DROP"] {
            let options = StorageOptions {
                database: Some(bad.into()),
                ..StorageOptions::default()
            };
            assert!(options.resolve_with(|_| None).is_err(), "{bad:?}");
        }
        let options = StorageOptions {
            database: Some("Botkit_Test_2".into()),
            ..StorageOptions::default()
        };
        assert!(options.resolve_with(|_| None).is_ok());
    }

    #[test]
    fn admin_database_must_differ_from_target() {
        let options = StorageOptions {
            database: Some("postgres".into()),
            ..StorageOptions::default()
        };
        assert!(options.resolve_with(|_| None).is_err());

        let options = StorageOptions {
            database: Some("postgres".into()),
            admin_database: Some("template1".into()),
            ..StorageOptions::default()
        };
        let cfg = options.resolve_with(|_| None).unwrap();
        assert_eq!(cfg.admin_pg_config().get_dbname(), Some("template1"));
        assert_eq!(cfg.pg_config().get_dbname(), Some("postgres"));
    }

    #[test]
    fn zero_idle_timeout_disables_recycling_and_zero_clients_is_rejected() {
        let options = StorageOptions {
            idle_timeout_millis: Some(0),
            ..StorageOptions::default()
        };
        assert_eq!(options.resolve_with(|_| None).unwrap().idle_timeout, None);

        let options = StorageOptions {
            max_clients: Some(0),
            ..StorageOptions::default()
        };
        assert!(options.resolve_with(|_| None).is_err());
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: StorageOptions = serde_json::from_str(
            r#"{"user":"u","password":"p","max":2,"idleTimeoutMillis":500,"useJsonB":true}"#,
        )
        .unwrap();
        assert_eq!(options.max_clients, Some(2));
        assert_eq!(options.idle_timeout_millis, Some(500));
        assert_eq!(options.use_jsonb, Some(true));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let cfg = StorageOptions {
            password: Some("hunter2".into()),
            ..StorageOptions::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
        let resolved = cfg.resolve_with(|_| None).unwrap();
        assert!(!format!("{resolved:?}").contains("hunter2"));
    }
}
