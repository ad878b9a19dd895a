use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::{Error, Result};
use crate::state::{self, parse_ip, PublicIp};

/// Ensures a VM has exactly one non-source-NAT IP with static NAT to it.
///
/// Never reassigns an already-correct pairing: CloudStack forbids a VM from
/// holding two static-NAT IPs at once, so reordering IPs during scale would
/// deadlock (the new IP can't attach until the old one detaches, but
/// detaching first violates the pairing invariant transiently). Filling
/// gaps in the unassigned pool — rather than re-sorting VM-to-IP order —
/// sidesteps that entirely.
pub async fn ensure_ip_for_vm(
    cmk: &dyn CmkAdapter,
    network_id: &str,
    vm_id: &str,
    label: &str,
) -> Result<PublicIp> {
    if let Some(ip) = state::find_public_ip_for_vm(cmk, network_id, vm_id).await {
        info!(role = %label, ip = %ip.ip_address, "reusing ip");
        return Ok(ip);
    }

    let unassigned = state::find_public_ips(cmk, network_id)
        .await
        .into_iter()
        .find(|ip| ip.virtual_machine_id.is_none());

    let ip = match unassigned {
        Some(ip) => ip,
        None => {
            let data = cmk
                .call(&args(["associate", "ipaddress", &format!("networkid={network_id}")]))
                .await?;
            let raw = data.get("ipaddress").ok_or_else(|| {
                Error::Fatal("associate ipaddress: no ipaddress in response".into())
            })?;
            parse_ip(raw)
        }
    };

    cmk.call(&args([
        "enable",
        "staticnat",
        &format!("ipaddressid={}", ip.id),
        &format!("virtualmachineid={vm_id}"),
    ]))
    .await?;
    info!(role = %label, ip = %ip.ip_address, "assigned ip");

    Ok(PublicIp {
        is_static_nat: true,
        virtual_machine_id: Some(vm_id.to_string()),
        ..ip
    })
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
    async fn reuses_existing_pairing() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "publicipaddress": [{"id": "ip-1", "ipaddress": "1.2.3.4",
                                  "issourcenat": false, "isstaticnat": true,
                                  "virtualmachineid": "vm-1"}]
        })]));
        let ip = ensure_ip_for_vm(&adapter, "net-1", "vm-1", "Web").await.unwrap();
        assert_eq!(ip.ip_address, "1.2.3.4");
    }

    #[tokio::test]
    async fn fills_from_unassigned_pool_before_associating_new() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"publicipaddress": []}), // find_public_ip_for_vm
            serde_json::json!({"publicipaddress": [
                {"id": "ip-2", "ipaddress": "1.2.3.5", "issourcenat": false, "isstaticnat": false}
            ]}), // find_public_ips (unassigned)
            serde_json::json!({}), // enable staticnat
        ]));
        let ip = ensure_ip_for_vm(&adapter, "net-1", "vm-2", "Worker 1").await.unwrap();
        assert_eq!(ip.id, "ip-2");
        assert_eq!(ip.virtual_machine_id.as_deref(), Some("vm-2"));
    }

    #[tokio::test]
    async fn associates_new_ip_when_pool_empty() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"publicipaddress": []}), // find_public_ip_for_vm
            serde_json::json!({"publicipaddress": []}), // find_public_ips (empty pool)
            serde_json::json!({"ipaddress": {"id": "ip-3", "ipaddress": "1.2.3.6"}}), // associate
            serde_json::json!({}), // enable staticnat
        ]));
        let ip = ensure_ip_for_vm(&adapter, "net-1", "vm-3", "DB").await.unwrap();
        assert_eq!(ip.id, "ip-3");
    }
}
