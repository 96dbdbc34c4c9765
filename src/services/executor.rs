use std::sync::Arc;

use tracing::debug;

use crate::db::templates::Template;
use crate::db::{SqlFailure, SqlRunner};
use crate::error::ProvisionError;
use crate::models::{ConnectionDescriptor, ValueSet};

/// Renders one template and runs it over a fresh connection. Holds no
/// state beyond the runner.
pub struct StatementExecutor<R> {
    runner: Arc<R>,
}

impl<R> Clone for StatementExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: SqlRunner> StatementExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Rendering happens before connecting, so a template/value mismatch
    /// costs no connection.
    pub async fn execute(
        &self,
        target: &ConnectionDescriptor,
        template: &Template,
        values: &ValueSet,
    ) -> Result<(), ProvisionError> {
        let sql = template.render(values)?;
        debug!(statement = template.name(), %target, "executing statement");

        self.runner.run(target, &sql).await.map_err(|failure| match failure {
            SqlFailure::Connect(message) => ProvisionError::Connection {
                target: target.to_string(),
                message,
            },
            SqlFailure::Execute { code, message } => ProvisionError::Statement {
                statement: template.name().to_owned(),
                code,
                message,
            },
        })
    }
}
