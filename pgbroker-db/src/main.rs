//! pgbroker operator binary
//!
//! Runs one lifecycle operation against the configured server and prints the
//! result as JSON on stdout. Configuration comes from the environment; see
//! [`BrokerConfig::from_env`].

use clap::{Parser, Subcommand};
use pgbroker_core::{BindingIdentity, BrokerError, FailurePolicy};
use pgbroker_db::{init_tracing, Broker, BrokerConfig, TelemetryError};
use secrecy::ExposeSecret;
use serde_json::json;
use thiserror::Error;

/// Provision tenant databases and roles on a shared PostgreSQL server
#[derive(Parser, Debug)]
#[command(name = "pgbroker")]
#[command(version, about, long_about = None)]
struct Cli {
    /// How bindings map to database roles: shared or per-binding
    #[arg(long, global = true, env = "PGBROKER_BINDING_IDENTITY")]
    binding_identity: Option<BindingIdentity>,

    /// What sequences do when a DDL step fails: best-effort or fail-fast
    #[arg(long, global = true, env = "PGBROKER_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a tenant database, its role, and the metadata row
    Create {
        instance_id: String,
        #[arg(long, default_value = "")]
        service_id: String,
        #[arg(long, default_value = "")]
        plan_id: String,
        #[arg(long, default_value = "")]
        organization_guid: String,
        #[arg(long, default_value = "")]
        space_guid: String,
    },

    /// Drop a tenant database and its metadata row
    Delete { instance_id: String },

    /// Drop a role if it exists
    DeleteRole { role_id: String },

    /// Print a connection URI for an application binding
    Bind {
        instance_id: String,
        binding_id: String,
    },

    /// Disable login for a binding role
    Unbind {
        instance_id: String,
        binding_id: String,
    },

    /// Show one stored instance
    Show { instance_id: String },

    /// List every stored instance
    List,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut config = BrokerConfig::from_env()?;
    if let Some(identity) = cli.binding_identity {
        config = config.with_binding_identity(identity);
    }
    if let Some(policy) = cli.failure_policy {
        config = config.with_failure_policy(policy);
    }

    let broker = Broker::connect(&config).await?;

    let output = match cli.command {
        Command::Create {
            instance_id,
            service_id,
            plan_id,
            organization_guid,
            space_guid,
        } => {
            let instance = broker
                .create_instance(
                    &instance_id,
                    &service_id,
                    &plan_id,
                    &organization_guid,
                    &space_guid,
                )
                .await?;
            serde_json::to_value(instance)?
        }
        Command::Delete { instance_id } => {
            broker.delete_instance(&instance_id).await?;
            json!({ "deleted": instance_id })
        }
        Command::DeleteRole { role_id } => {
            broker.delete_role(&role_id).await?;
            json!({ "dropped_role": role_id })
        }
        Command::Bind {
            instance_id,
            binding_id,
        } => {
            let uri = broker.bind(&instance_id, &binding_id).await?;
            json!({
                "instance_id": instance_id,
                "binding_id": binding_id,
                "uri": uri.expose_secret(),
            })
        }
        Command::Unbind {
            instance_id,
            binding_id,
        } => {
            broker.unbind(&instance_id, &binding_id).await?;
            json!({ "unbound": binding_id })
        }
        Command::Show { instance_id } => {
            serde_json::to_value(broker.get_instance(&instance_id).await?)?
        }
        Command::List => serde_json::to_value(broker.list_instances().await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
