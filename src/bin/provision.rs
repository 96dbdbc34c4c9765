//! Operator entry point for tenant database provisioning.
//!
//! Usage:
//!   provision zones
//!   provision bootstrap --zone eu-west
//!   provision create --zone eu-west --role tenant_123 --database db_123 [--password PW]
//!   provision drop --zone eu-west --role tenant_123 --database db_123
//!
//! Zones and cluster credentials come from PROVISION_* environment variables
//! (a .env file is honoured).

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::distributions::{Alphanumeric, DistString};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenant_provisioner::config::Config;
use tenant_provisioner::services::metrics;
use tenant_provisioner::{ProvisioningService, StepOutcome, Zone};

#[derive(Parser)]
#[command(name = "provision", about = "Provision and tear down tenant databases")]
struct Args {
    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured zones
    Zones,
    /// Create the baseline roles on a zone's cluster (safe to repeat)
    Bootstrap {
        #[arg(long)]
        zone: String,
    },
    /// Create a tenant role and database
    Create {
        #[arg(long)]
        zone: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        database: String,
        /// Generated when omitted
        #[arg(long, env = "PROVISION_TENANT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Drop a tenant database and role
    Drop {
        #[arg(long)]
        zone: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        database: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let service = ProvisioningService::from_config(&config).context("building provisioning service")?;

    match args.command {
        Command::Zones => {
            for zone in service.router().zones() {
                println!("{zone}");
            }
        }
        Command::Bootstrap { zone } => {
            let report = service.bootstrap_baseline_roles(&Zone::new(zone)).await?;
            tracing::info!(
                "Bootstrap complete: {} applied, {} already present",
                report.applied.len(),
                report.already_present.len()
            );
        }
        Command::Create {
            zone,
            role,
            database,
            password,
        } => {
            let generated = password.is_none();
            let password = password.unwrap_or_else(|| Alphanumeric.sample_string(&mut rand::thread_rng(), 32));

            service
                .create_user_and_db(&Zone::new(zone), &role, &password, &database)
                .await?;
            tracing::info!("Provisioned role {role} with database {database}");
            if generated {
                println!("{password}");
            }
        }
        Command::Drop { zone, role, database } => {
            let report = service.drop_user_and_db(&Zone::new(zone), &role, &database).await?;
            for (step, outcome) in &report.steps {
                match outcome {
                    StepOutcome::Removed => tracing::info!("{step}: removed"),
                    StepOutcome::AlreadyAbsent => tracing::warn!("{step}: already absent"),
                }
            }
        }
    }

    if args.metrics {
        print!("{}", metrics::gather_text());
    }
    Ok(())
}
