//! Forward execution with compensation, and explicit teardown.
//!
//! The two backward policies are deliberately separate routines:
//! compensation after a failed forward step is best-effort and keeps going
//! past errors, while explicit teardown stops at the first real error.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::db::templates::Template;
use crate::db::SqlRunner;
use crate::error::ProvisionError;
use crate::models::{ConnectionDescriptor, ValueSet};
use crate::services::executor::StatementExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Idle,
    Running(usize),
    Committed,
    Compensating(usize),
    CompensatedWithErrors,
    Failed,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running(i) => write!(f, "running({i})"),
            Self::Committed => f.write_str("committed"),
            Self::Compensating(j) => write!(f, "compensating({j})"),
            Self::CompensatedWithErrors => f.write_str("compensated_with_errors"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

fn advance(from: SagaState, to: SagaState) -> SagaState {
    debug!(%from, %to, "saga transition");
    to
}

/// What the compensation loop did, index by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Indices undone, in execution order (highest first).
    pub undone: Vec<usize>,
    /// Indices whose target was already gone.
    pub already_absent: Vec<usize>,
    pub failures: Vec<(usize, ProvisionError)>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn terminal_state(&self) -> SagaState {
        if self.is_clean() {
            SagaState::Failed
        } else {
            SagaState::CompensatedWithErrors
        }
    }
}

/// A forward run that did not commit. `error` is the original cause,
/// untouched by whatever happened during compensation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaFailure {
    pub error: ProvisionError,
    pub failed_step: usize,
    pub compensation: CompensationReport,
}

impl From<SagaFailure> for ProvisionError {
    fn from(failure: SagaFailure) -> Self {
        failure.error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Removed,
    AlreadyAbsent,
}

/// Teardown steps in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub steps: Vec<(String, StepOutcome)>,
}

impl TeardownReport {
    /// Steps ran and found nothing to remove.
    pub fn already_absent(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|(_, outcome)| *outcome == StepOutcome::AlreadyAbsent)
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|(_, outcome)| *outcome == StepOutcome::Removed)
            .map(|(name, _)| name.as_str())
    }
}

pub struct SagaCoordinator<R> {
    executor: StatementExecutor<R>,
}

impl<R> Clone for SagaCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<R: SqlRunner> SagaCoordinator<R> {
    pub fn new(executor: StatementExecutor<R>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &StatementExecutor<R> {
        &self.executor
    }

    /// Run `steps` in order. If step `i` fails, `compensations[i-1..=0]` run
    /// in reverse and the failure of step `i` is returned.
    pub async fn run_forward(
        &self,
        target: &ConnectionDescriptor,
        steps: &[Template],
        compensations: &[Template],
        values: &ValueSet,
    ) -> Result<(), SagaFailure> {
        if steps.len() != compensations.len() {
            return Err(SagaFailure {
                error: ProvisionError::StepCountMismatch {
                    forward: steps.len(),
                    backward: compensations.len(),
                },
                failed_step: 0,
                compensation: CompensationReport::default(),
            });
        }

        let mut state = SagaState::Idle;
        for (i, step) in steps.iter().enumerate() {
            state = advance(state, SagaState::Running(i));
            if let Err(error) = self.executor.execute(target, step, values).await {
                warn!(step = step.name(), index = i, %target, "forward step failed: {error}");
                let compensation = self.compensate(target, compensations, i, values).await;
                advance(state, compensation.terminal_state());
                return Err(SagaFailure {
                    error,
                    failed_step: i,
                    compensation,
                });
            }
        }
        advance(state, SagaState::Committed);
        Ok(())
    }

    /// Undo `compensations[0..upto]` from the highest index down. Every index
    /// is attempted; failures are logged and collected, never returned.
    pub async fn compensate(
        &self,
        target: &ConnectionDescriptor,
        compensations: &[Template],
        upto: usize,
        values: &ValueSet,
    ) -> CompensationReport {
        let mut report = CompensationReport::default();
        let upto = upto.min(compensations.len());

        for j in (0..upto).rev() {
            debug!(state = %SagaState::Compensating(j), "saga transition");
            let step = &compensations[j];
            match self.executor.execute(target, step, values).await {
                Ok(()) => report.undone.push(j),
                Err(e) if e.is_already_absent() => {
                    info!(step = step.name(), index = j, "nothing to compensate: {e}");
                    report.already_absent.push(j);
                }
                Err(e) => {
                    error!(step = step.name(), index = j, %target, "compensation failed, continuing: {e}");
                    report.failures.push((j, e));
                }
            }
        }
        report
    }

    /// Explicit teardown: run `compensations` from the last index down,
    /// stopping at the first failure. Objects that are already gone are
    /// recorded and skipped.
    pub async fn run_backward(
        &self,
        target: &ConnectionDescriptor,
        compensations: &[Template],
        values: &ValueSet,
    ) -> Result<TeardownReport, ProvisionError> {
        let mut report = TeardownReport::default();

        for (j, step) in compensations.iter().enumerate().rev() {
            match self.executor.execute(target, step, values).await {
                Ok(()) => report.steps.push((step.name().to_owned(), StepOutcome::Removed)),
                Err(e) if e.is_already_absent() => {
                    warn!(step = step.name(), index = j, "already absent: {e}");
                    report.steps.push((step.name().to_owned(), StepOutcome::AlreadyAbsent));
                }
                Err(e) => {
                    error!(step = step.name(), index = j, %target, "teardown stopped: {e}");
                    return Err(e);
                }
            }
        }
        Ok(report)
    }
}
