use std::fmt;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::ConnectOptions;

/// Name of one regional database cluster, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone(String);

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Zone {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Everything needed to open a single connection to a cluster.
///
/// The administrative descriptor of a zone connects to the cluster's
/// maintenance database and has no tenant override; a tenant descriptor
/// reuses the same credentials and connects to one tenant database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub ssl_mode: SslMode,
    pub maintenance_database: String,
    pub tenant_database: Option<String>,
}

pub const DEFAULT_MAINTENANCE_DATABASE: &str = "postgres";

/// TLS policy for cluster connections, mirroring libpq's `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(format!("unsupported sslmode '{other}' (expected disable, prefer or require)")),
        }
    }
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        }
    }
}

impl ConnectionDescriptor {
    /// Same cluster and credentials, targeting `database`.
    pub fn with_database(&self, database: &str) -> Self {
        Self {
            tenant_database: Some(database.to_owned()),
            ..self.clone()
        }
    }

    /// The same cluster and credentials with the tenant override removed.
    pub fn administrative(&self) -> Self {
        Self {
            tenant_database: None,
            ..self.clone()
        }
    }

    pub fn is_administrative(&self) -> bool {
        self.tenant_database.is_none()
    }

    /// The database a connection opens: the tenant database when set,
    /// otherwise the maintenance database.
    pub fn database(&self) -> &str {
        self.tenant_database.as_deref().unwrap_or(self.maintenance_database.as_str())
    }

    /// sqlx options for this target. Statement logging is disabled so
    /// rendered DDL (which carries passwords) never reaches the log.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(self.database())
            .ssl_mode(self.ssl_mode.into())
            .application_name("tenant-provisioner")
            .disable_statement_logging()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.username, self.host, self.port, self.database())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("maintenance_database", &self.maintenance_database)
            .field("tenant_database", &self.tenant_database)
            .finish()
    }
}
