use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::db::statements::BASELINE_ROLES;
use crate::db::templates::TemplateRegistry;
use crate::db::{PgRunner, SqlRunner};
use crate::error::ProvisionError;
use crate::models::values::{DATABASE, ROLE};
use crate::models::{ConnectionDescriptor, ValueSet, Zone};
use crate::services::executor::StatementExecutor;
use crate::services::metrics;
use crate::services::router::RegionRouter;
use crate::services::saga::{CompensationReport, SagaCoordinator, TeardownReport};

/// Outcome of one bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Statements that ran to completion.
    pub applied: Vec<String>,
    pub already_present: Vec<String>,
}

/// Entry point for callers. Cheap to clone; all shared state is read-only.
pub struct ProvisioningService<R = PgRunner> {
    registry: Arc<TemplateRegistry>,
    router: Arc<RegionRouter>,
    saga: SagaCoordinator<R>,
}

impl<R> Clone for ProvisioningService<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            saga: self.saga.clone(),
        }
    }
}

impl ProvisioningService<PgRunner> {
    /// Built-in PostgreSQL statements, zones from `config`, unpooled runner.
    pub fn from_config(config: &Config) -> Result<Self, ProvisionError> {
        Ok(Self::new(
            Arc::new(TemplateRegistry::postgres()?),
            Arc::new(RegionRouter::new(config)),
            PgRunner::new(config.connect_timeout, config.statement_timeout),
        ))
    }
}

impl<R: SqlRunner> ProvisioningService<R> {
    pub fn new(registry: Arc<TemplateRegistry>, router: Arc<RegionRouter>, runner: R) -> Self {
        Self::with_runner(registry, router, Arc::new(runner))
    }

    pub fn with_runner(registry: Arc<TemplateRegistry>, router: Arc<RegionRouter>, runner: Arc<R>) -> Self {
        Self {
            registry,
            router,
            saga: SagaCoordinator::new(StatementExecutor::new(runner)),
        }
    }

    pub fn router(&self) -> &RegionRouter {
        &self.router
    }

    /// Create the tenant role and database, then hand the database's public
    /// schema to the role. Either everything exists afterwards or the call
    /// failed and every completed step was undone.
    #[instrument(skip(self, zone, password), fields(zone = %zone))]
    pub async fn create_user_and_db(
        &self,
        zone: &Zone,
        role: &str,
        password: &str,
        database: &str,
    ) -> Result<(), ProvisionError> {
        let result = self.create(zone, role, password, database).await;
        metrics::record_operation("create", zone_label(zone, &result), result.is_ok());
        result
    }

    async fn create(&self, zone: &Zone, role: &str, password: &str, database: &str) -> Result<(), ProvisionError> {
        let values = ValueSet::for_tenant(role, password, database)?;
        let admin = self.router.resolve(zone)?;
        check_cluster_names(&admin, role, database)?;
        let tenant = self.router.resolve_tenant(zone, database)?;
        let forward = self.registry.forward();
        let backward = self.registry.backward();

        info!(role, database, "provisioning tenant");
        if let Err(failure) = self.saga.run_forward(&admin, forward, backward, &values).await {
            self.record_compensation(zone, &failure.compensation);
            error!(
                role,
                database,
                step = failure.failed_step,
                compensation_failures = failure.compensation.failures.len(),
                "provisioning failed: {}",
                failure.error
            );
            return Err(failure.error);
        }

        for step in self.registry.post_create() {
            if let Err(e) = self.saga.executor().execute(&tenant, step, &values).await {
                // Undo every forward step so no misowned database is left.
                warn!(role, database, step = step.name(), "post-creation step failed, rolling back: {e}");
                let compensation = self.saga.compensate(&admin, backward, backward.len(), &values).await;
                self.record_compensation(zone, &compensation);
                return Err(e);
            }
        }

        info!(role, database, "tenant provisioned");
        Ok(())
    }

    /// Drop the tenant database and role. Objects that no longer exist are
    /// reported in the result rather than failing the call.
    #[instrument(skip(self, zone), fields(zone = %zone))]
    pub async fn drop_user_and_db(
        &self,
        zone: &Zone,
        role: &str,
        database: &str,
    ) -> Result<TeardownReport, ProvisionError> {
        let result = self.teardown(zone, role, database).await;
        metrics::record_operation("drop", zone_label(zone, &result), result.is_ok());
        result
    }

    async fn teardown(&self, zone: &Zone, role: &str, database: &str) -> Result<TeardownReport, ProvisionError> {
        let values = ValueSet::for_teardown(role, database)?;
        let admin = self.router.resolve(zone)?;
        check_cluster_names(&admin, role, database)?;

        info!(role, database, "tearing down tenant");
        let report = self
            .saga
            .run_backward(&admin, self.registry.backward(), &values)
            .await?;

        if report.already_absent() {
            warn!(role, database, "tenant resources were already absent");
        } else {
            info!(role, database, "tenant torn down");
        }
        Ok(report)
    }

    /// Create the baseline roles on the zone's cluster. Safe to repeat:
    /// roles that already exist are skipped with a warning.
    #[instrument(skip(self, zone), fields(zone = %zone))]
    pub async fn bootstrap_baseline_roles(&self, zone: &Zone) -> Result<BootstrapReport, ProvisionError> {
        let result = self.bootstrap(zone).await;
        metrics::record_operation("bootstrap", zone_label(zone, &result), result.is_ok());
        result
    }

    async fn bootstrap(&self, zone: &Zone) -> Result<BootstrapReport, ProvisionError> {
        let admin = self.router.resolve(zone)?;
        let values = ValueSet::empty();
        let mut report = BootstrapReport::default();

        for step in self.registry.bootstrap() {
            match self.saga.executor().execute(&admin, step, &values).await {
                Ok(()) => report.applied.push(step.name().to_owned()),
                Err(e) if e.is_already_exists() => {
                    warn!(step = step.name(), "baseline role already present: {e}");
                    report.already_present.push(step.name().to_owned());
                }
                Err(e) => {
                    error!(step = step.name(), "bootstrap failed: {e}");
                    return Err(e);
                }
            }
        }

        info!(
            applied = report.applied.len(),
            already_present = report.already_present.len(),
            "baseline roles bootstrapped"
        );
        Ok(report)
    }

    fn record_compensation(&self, zone: &Zone, report: &CompensationReport) {
        for _ in report.undone.iter().chain(&report.already_absent) {
            metrics::record_compensation(zone.as_str(), true);
        }
        for (_, e) in &report.failures {
            metrics::record_compensation(zone.as_str(), false);
            warn!(zone = %zone, "compensation left residue behind: {e}");
        }
    }
}

/// Names that pass shape validation but belong to the cluster itself: the
/// zone's admin role, the baseline roles and the maintenance database.
fn check_cluster_names(admin: &ConnectionDescriptor, role: &str, database: &str) -> Result<(), ProvisionError> {
    if role == admin.username || BASELINE_ROLES.contains(&role) {
        return Err(ProvisionError::validation(ROLE, format!("{role:?} is reserved on this cluster")));
    }
    if database == admin.maintenance_database {
        return Err(ProvisionError::validation(
            DATABASE,
            format!("{database:?} is the cluster's maintenance database"),
        ));
    }
    Ok(())
}

/// Unresolved zones share one label so caller input cannot add series.
fn zone_label<'a, T>(zone: &'a Zone, result: &Result<T, ProvisionError>) -> &'a str {
    match result {
        Err(ProvisionError::UnknownZone { .. }) => metrics::UNKNOWN_ZONE,
        _ => zone.as_str(),
    }
}
