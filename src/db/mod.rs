pub mod statements;
pub mod templates;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{ConnectOptions, Connection, Executor};
use tokio::time::timeout;

use crate::models::ConnectionDescriptor;

/// Why a single connect/execute round trip failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlFailure {
    /// The statement never ran: unreachable cluster, bad credentials,
    /// missing target database, or connect timeout.
    Connect(String),
    /// The cluster rejected the statement or it timed out.
    Execute { code: Option<String>, message: String },
}

impl SqlFailure {
    fn from_execute(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => Self::Execute {
                code: db_err.code().map(|c| c.into_owned()),
                message: db_err.message().to_owned(),
            },
            other => Self::Execute {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

/// Opens one connection to `target`, runs `sql`, and closes the connection.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    async fn run(&self, target: &ConnectionDescriptor, sql: &str) -> Result<(), SqlFailure>;
}

/// Unpooled PostgreSQL runner. Every call opens and closes its own
/// connection, so a failed statement never leaves a session behind.
#[derive(Debug, Clone)]
pub struct PgRunner {
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PgRunner {
    pub fn new(connect_timeout: Duration, statement_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            statement_timeout,
        }
    }
}

#[async_trait]
impl SqlRunner for PgRunner {
    async fn run(&self, target: &ConnectionDescriptor, sql: &str) -> Result<(), SqlFailure> {
        let options = target.connect_options();
        let mut conn = match timeout(self.connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(SqlFailure::Connect(e.to_string())),
            Err(_) => {
                return Err(SqlFailure::Connect(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                )))
            }
        };

        // Simple query protocol: DDL such as CREATE DATABASE cannot be prepared.
        let executed = timeout(self.statement_timeout, Executor::execute(&mut conn, sqlx::raw_sql(sql))).await;
        let result = match executed {
            Ok(result) => result.map(|_| ()).map_err(SqlFailure::from_execute),
            Err(_) => {
                // The session is mid-protocol; dropping it closes the socket.
                drop(conn);
                return Err(SqlFailure::Execute {
                    code: None,
                    message: format!("timed out after {}s", self.statement_timeout.as_secs()),
                });
            }
        };

        match timeout(self.connect_timeout, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("closing connection to {target} failed: {e}"),
            Err(_) => tracing::debug!("closing connection to {target} timed out"),
        }
        result
    }
}
