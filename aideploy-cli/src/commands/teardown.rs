use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use aideploy_core::reconcile;
use aideploy_core::spec::ProjectIdentity;
use aideploy_core::ProcessAdapter;

#[derive(ClapArgs, Debug)]
pub struct TeardownArgs {
    /// The deployment's network name, as printed by `provision`'s
    /// `network_name` output field.
    #[arg(long)]
    network_name: String,

    /// Restrict teardown to a single zone. Without this, every zone whose
    /// network matches `network_name` is torn down.
    #[arg(long)]
    zone: Option<String>,
}

pub async fn run(args: TeardownArgs) -> Result<()> {
    let cmk = ProcessAdapter::new();
    let identity = ProjectIdentity::from_network_name(&args.network_name);
    reconcile::teardown(&cmk, &identity, args.zone.as_deref())
        .await
        .context("teardown failed")
}
