// Library exports for the provision binary and integration tests
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use error::{ErrorKind, ProvisionError};
pub use models::Zone;
pub use services::provisioning::{BootstrapReport, ProvisioningService};
pub use services::saga::{StepOutcome, TeardownReport};
