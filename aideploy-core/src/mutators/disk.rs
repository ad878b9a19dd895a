use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::{Error, Result};
use crate::state::{self, VolumeInfo};

const GIB: u64 = 1024 * 1024 * 1024;

/// Resizes a volume in place if `desired_gb` is larger than its current
/// size. Grow-only: a smaller `desired_gb` is a hard failure, never a
/// silent no-op, so a spec edit can't accidentally destroy data.
pub async fn resize_volume(
    cmk: &dyn CmkAdapter,
    vol: &VolumeInfo,
    desired_gb: u32,
    desc: &str,
) -> Result<()> {
    let desired_bytes = desired_gb as u64 * GIB;
    if desired_bytes > vol.size_bytes {
        cmk.call(&args([
            "resize",
            "volume",
            &format!("id={}", vol.id),
            &format!("size={desired_gb}"),
        ]))
        .await?;
        info!(
            volume = %desc,
            from_gb = vol.size_bytes / GIB,
            to_gb = desired_gb,
            "resized"
        );
    } else if desired_bytes < vol.size_bytes {
        return Err(Error::ShrinkRejected {
            desc: desc.to_string(),
            current_gb: vol.size_bytes / GIB,
            desired_gb: desired_gb as u64,
        });
    }
    Ok(())
}

/// Creates, tags, and attaches a data disk, or resizes + ensures attachment
/// if it already exists. Tags are applied only at creation time.
#[allow(clippy::too_many_arguments)]
pub async fn create_or_resize_disk(
    cmk: &dyn CmkAdapter,
    disk_name: &str,
    disk_offering_id: &str,
    zone_id: &str,
    size_gb: u32,
    vm_id: &str,
    deploy_tag: &str,
    desc: &str,
) -> Result<String> {
    if let Some(vol) = state::find_volume(cmk, disk_name).await {
        info!(volume = %desc, id = %vol.id, "disk already exists");
        resize_volume(cmk, &vol, size_gb, desc).await?;
        if vol.virtual_machine_id.is_none() {
            cmk.call(&args(["attach", "volume", &format!("id={}", vol.id), &format!("virtualmachineid={vm_id}")]))
                .await?;
            info!(volume = %desc, "attached");
        }
        return Ok(vol.id);
    }

    let data = cmk
        .call(&args([
            "create",
            "volume",
            &format!("name={disk_name}"),
            &format!("diskofferingid={disk_offering_id}"),
            &format!("zoneid={zone_id}"),
            &format!("size={size_gb}"),
        ]))
        .await?;
    let vol_id = data["volume"]["id"]
        .as_str()
        .ok_or_else(|| Error::Fatal(format!("create volume {disk_name}: no volume.id in response")))?
        .to_string();
    info!(volume = %desc, id = %vol_id, "created");

    cmk.call(&args([
        "create",
        "tags",
        &format!("resourceids={vol_id}"),
        "resourcetype=Volume",
        "tags[0].key=locaweb-ai-deploy-id",
        &format!("tags[0].value={deploy_tag}"),
    ]))
    .await?;
    info!(volume = %desc, tag = %deploy_tag, "tagged");

    cmk.call(&args([
        "attach",
        "volume",
        &format!("id={vol_id}"),
        &format!("virtualmachineid={vm_id}"),
    ]))
    .await?;
    info!(volume = %desc, "attached");

    Ok(vol_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Value>>);

    #[async_trait]
    impl CmkAdapter for Scripted {
        async fn call(&self, _args: &[String]) -> Result<Value> {
            Ok(self.0.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn resize_volume_rejects_shrink() {
        let adapter = Scripted(Mutex::new(vec![]));
        let vol = VolumeInfo {
            id: "v-1".into(),
            virtual_machine_id: Some("vm-1".into()),
            size_bytes: 35 * GIB,
            state: "Ready".into(),
        };
        let err = resize_volume(&adapter, &vol, 20, "blob disk").await.unwrap_err();
        assert!(matches!(err, Error::ShrinkRejected { .. }));
    }

    #[tokio::test]
    async fn resize_volume_noop_when_equal() {
        let adapter = Scripted(Mutex::new(vec![]));
        let vol = VolumeInfo {
            id: "v-1".into(),
            virtual_machine_id: Some("vm-1".into()),
            size_bytes: 30 * GIB,
            state: "Ready".into(),
        };
        resize_volume(&adapter, &vol, 30, "blob disk").await.unwrap();
    }

    #[tokio::test]
    async fn create_or_resize_disk_tags_only_on_creation() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"volume": []}),
            serde_json::json!({"volume": {"id": "v-1"}}),
            serde_json::json!({}), // tags
            serde_json::json!({}), // attach
        ]));
        let id = create_or_resize_disk(
            &adapter, "my-app-1-blob", "do-1", "z-1", 30, "vm-1", "my-app-1", "Blob disk",
        )
        .await
        .unwrap();
        assert_eq!(id, "v-1");
    }
}
