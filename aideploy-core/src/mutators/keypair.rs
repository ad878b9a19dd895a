use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::Result;
use crate::state;

/// Registers `name` with `public_key` if it isn't already registered.
pub async fn ensure_keypair(cmk: &dyn CmkAdapter, name: &str, public_key: &str) -> Result<()> {
    if state::find_keypair(cmk, name).await {
        info!(keypair = %name, "keypair already registered");
        return Ok(());
    }
    cmk.call(&args([
        "register",
        "sshkeypair",
        &format!("name={name}"),
        &format!("publickey={public_key}"),
    ]))
    .await?;
    info!(keypair = %name, "keypair registered");
    Ok(())
}
