use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::adapter::{args, CmkAdapter};
use crate::error::{Error, Result};
use crate::state;

const STOP_POLL_ATTEMPTS: u32 = 30;
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Deploys a VM if absent; if present with a different service offering,
/// scales it in place; otherwise does nothing. Userdata is applied only at
/// deploy time — it is never re-applied to an existing VM.
pub async fn deploy_or_scale_vm(
    cmk: &dyn CmkAdapter,
    name: &str,
    offering_id: &str,
    template_id: &str,
    zone_id: &str,
    network_id: &str,
    keypair_name: &str,
    userdata: Option<&str>,
) -> Result<String> {
    if let Some(vm) = state::find_vm(cmk, name).await {
        match vm.service_offering_id {
            Some(current) if current != offering_id => {
                info!(vm = %name, id = %vm.id, "offering changed, scaling");
                scale_vm(cmk, &vm.id, name, offering_id).await?;
            }
            _ => {
                info!(vm = %name, id = %vm.id, "vm already exists");
            }
        }
        return Ok(vm.id);
    }

    let mut deploy_args = args([
        "deploy",
        "virtualmachine",
        &format!("serviceofferingid={offering_id}"),
        &format!("templateid={template_id}"),
        &format!("zoneid={zone_id}"),
        &format!("networkids={network_id}"),
        &format!("keypair={keypair_name}"),
        &format!("name={name}"),
        &format!("displayname={name}"),
    ]);
    if let Some(script) = userdata {
        deploy_args.push(format!("userdata={}", BASE64.encode(script)));
    }

    let data = cmk.call(&deploy_args).await?;
    let id = data["virtualmachine"]["id"]
        .as_str()
        .ok_or_else(|| Error::Fatal(format!("deploy {name}: no virtualmachine.id in response")))?
        .to_string();
    info!(vm = %name, id = %id, "vm created");
    Ok(id)
}

/// Tries a live scale first; on failure, stops the VM, polls for `Stopped`,
/// scales while stopped, then restarts it.
pub async fn scale_vm(
    cmk: &dyn CmkAdapter,
    vm_id: &str,
    name: &str,
    new_offering_id: &str,
) -> Result<()> {
    let live = cmk
        .call(&args([
            "scale",
            "virtualmachine",
            &format!("id={vm_id}"),
            &format!("serviceofferingid={new_offering_id}"),
        ]))
        .await;
    if live.is_ok() {
        info!(vm = %name, "scaled live");
        return Ok(());
    }
    warn!(vm = %name, "live scale failed, falling back to offline scale");

    cmk.call(&args(["stop", "virtualmachine", &format!("id={vm_id}")]))
        .await?;

    for _ in 0..STOP_POLL_ATTEMPTS {
        if let Some(vm) = state::find_vm(cmk, name).await {
            if vm.state == "Stopped" {
                break;
            }
        }
        sleep(STOP_POLL_INTERVAL).await;
    }

    cmk.call(&args([
        "scale",
        "virtualmachine",
        &format!("id={vm_id}"),
        &format!("serviceofferingid={new_offering_id}"),
    ]))
    .await?;
    cmk.call(&args(["start", "virtualmachine", &format!("id={vm_id}")]))
        .await?;
    info!(vm = %name, "scaled offline (stopped, scaled, started)");
    Ok(())
}

/// Disables NAT, deletes firewall rules, releases the IP, then destroys the
/// VM with `expunge=true`. Used to remove workers beyond the desired count.
pub async fn remove_excess_worker(
    cmk: &dyn CmkAdapter,
    name: &str,
    vm_id: &str,
    network_id: &str,
) -> Result<()> {
    if let Some(ip) = state::find_public_ip_for_vm(cmk, network_id, vm_id).await {
        if ip.is_static_nat {
            cmk.call(&args(["disable", "staticnat", &format!("ipaddressid={}", ip.id)]))
                .await?;
        }
        for rule in state::find_firewall_rules(cmk, &ip.id).await {
            cmk.call(&args(["delete", "firewallrule", &format!("id={}", rule.id)]))
                .await?;
        }
        cmk.call(&args(["disassociate", "ipaddress", &format!("id={}", ip.id)]))
            .await?;
        info!(vm = %name, ip = %ip.ip_address, "released ip");
    }
    cmk.call(&args([
        "destroy",
        "virtualmachine",
        &format!("id={vm_id}"),
        "expunge=true",
    ]))
    .await?;
    info!(vm = %name, "destroyed");
    Ok(())
}

/// Reads a VM's primary NIC IP address.
pub async fn vm_internal_ip(cmk: &dyn CmkAdapter, vm_id: &str) -> Result<String> {
    let data = cmk
        .call(&args([
            "list",
            "virtualmachines",
            &format!("id={vm_id}"),
            "filter=id,nic",
        ]))
        .await?;
    data["virtualmachine"][0]["nic"][0]["ipaddress"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Fatal(format!("vm {vm_id}: no internal ip in response")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Value>>);

    #[async_trait]
    impl CmkAdapter for Scripted {
        async fn call(&self, _args: &[String]) -> Result<Value> {
            Ok(self.0.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn deploys_when_absent() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"virtualmachine": []}),
            serde_json::json!({"virtualmachine": {"id": "vm-1"}}),
        ]));
        let id = deploy_or_scale_vm(
            &adapter, "my-app-1-web", "off-1", "tpl-1", "z-1", "net-1", "my-app-1-key", None,
        )
        .await
        .unwrap();
        assert_eq!(id, "vm-1");
    }

    #[tokio::test]
    async fn reuses_when_offering_matches() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "virtualmachine": [{"id": "vm-1", "name": "my-app-1-web", "state": "Running",
                                 "serviceofferingid": "off-1"}]
        })]));
        let id = deploy_or_scale_vm(
            &adapter, "my-app-1-web", "off-1", "tpl-1", "z-1", "net-1", "my-app-1-key", None,
        )
        .await
        .unwrap();
        assert_eq!(id, "vm-1");
    }

    #[tokio::test]
    async fn vm_internal_ip_reads_primary_nic() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "virtualmachine": [{"id": "vm-1", "nic": [{"ipaddress": "10.0.0.5"}]}]
        })]));
        assert_eq!(vm_internal_ip(&adapter, "vm-1").await.unwrap(), "10.0.0.5");
    }
}
