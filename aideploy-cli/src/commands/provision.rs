use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use aideploy_core::reconcile;
use aideploy_core::spec::ProjectIdentity;
use aideploy_core::ProcessAdapter;

#[derive(ClapArgs, Debug)]
pub struct ProvisionArgs {
    /// Repository name, the first component of every derived resource name.
    #[arg(long)]
    repo_name: String,

    /// Caller-supplied unique ID, the second component of every derived name.
    #[arg(long)]
    unique_id: String,

    /// Optional environment name, appended to every derived name.
    #[arg(long)]
    env_name: Option<String>,

    /// Path to the desired-spec JSON file.
    #[arg(long)]
    config: PathBuf,

    /// Path to the SSH public key file registered as the deployment's keypair.
    #[arg(long)]
    public_key: PathBuf,

    /// Where to write the resulting JSON wiring map. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

pub async fn run(args: ProvisionArgs) -> Result<()> {
    let spec = aideploy_core::config::load_spec(&args.config)
        .with_context(|| format!("loading spec from {}", args.config.display()))?;
    let public_key = aideploy_core::config::load_public_key(&args.public_key)
        .with_context(|| format!("loading public key from {}", args.public_key.display()))?;

    let identity = ProjectIdentity {
        repo_name: args.repo_name,
        unique_id: args.unique_id,
        env_name: args.env_name,
    };

    let cmk = ProcessAdapter::new();
    let out = reconcile::provision(&cmk, &spec, &identity, &public_key)
        .await
        .context("provision failed")?;

    let json = serde_json::to_string_pretty(&out).context("serializing provision output")?;
    match args.output {
        Some(path) => fs::write(&path, json)
            .with_context(|| format!("writing output to {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
