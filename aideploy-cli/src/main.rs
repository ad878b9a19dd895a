//! `aideploy`: CLI front-end over `aideploy_core`'s provision/teardown
//! reconciler.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Reconciler for a fixed-topology CloudStack deployment.
#[derive(Parser, Debug)]
#[command(name = "aideploy", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge the account toward a desired spec.
    Provision(commands::provision::ProvisionArgs),
    /// Tear down a previously provisioned deployment.
    Teardown(commands::teardown::TeardownArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aideploy_core=info,aideploy_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Provision(args) => commands::provision::run(args).await,
        Command::Teardown(args) => commands::teardown::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
