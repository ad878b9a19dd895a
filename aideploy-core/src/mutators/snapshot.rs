use serde_json::Value;
use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::Result;

const SNAPSHOT_SCHEDULE: &str = "00:03";
const SNAPSHOT_MAX: u32 = 3;
const SNAPSHOT_TIMEZONE: &str = "America/Sao_Paulo";

/// Creates a daily snapshot policy for `volume_id` if one doesn't already
/// exist. `all_zone_ids` is resolved live per run, never hard-coded.
pub async fn ensure_snapshot_policy(
    cmk: &dyn CmkAdapter,
    volume_id: &str,
    all_zone_ids: &[String],
    deploy_tag: &str,
    desc: &str,
) -> Result<()> {
    let existing = cmk
        .call_quiet(&args(["list", "snapshotpolicies", &format!("volumeid={volume_id}")]))
        .await;
    let has_policy = existing
        .as_ref()
        .and_then(|v| v.get("snapshotpolicy"))
        .and_then(Value::as_array)
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    if has_policy {
        info!(volume = %desc, "snapshot policy already exists");
        return Ok(());
    }

    cmk.call(&args([
        "create",
        "snapshotpolicy",
        &format!("volumeid={volume_id}"),
        "intervaltype=daily",
        &format!("schedule={SNAPSHOT_SCHEDULE}"),
        &format!("maxsnaps={SNAPSHOT_MAX}"),
        &format!("timezone={SNAPSHOT_TIMEZONE}"),
        &format!("zoneids={}", all_zone_ids.join(",")),
        "tags[0].key=locaweb-ai-deploy-id",
        &format!("tags[0].value={deploy_tag}"),
    ]))
    .await?;
    info!(volume = %desc, "snapshot policy created");
    Ok(())
}
