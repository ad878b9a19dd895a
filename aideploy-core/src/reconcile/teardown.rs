use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::adapter::{args, CmkAdapter};
use crate::catalog;
use crate::error::Result;
use crate::spec::ProjectIdentity;

const DETACH_GRACE: Duration = Duration::from_secs(2);
const EXPUNGE_GRACE: Duration = Duration::from_secs(5);

fn list<'a>(data: &'a Value, key: &str) -> Vec<&'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

struct MatchedNetwork {
    id: String,
    zone_id: Option<String>,
}

async fn find_matching_networks(
    cmk: &dyn CmkAdapter,
    network_name: &str,
    zone_id: Option<&str>,
) -> Vec<MatchedNetwork> {
    let data = cmk
        .call_quiet(&args(["list", "networks", "filter=id,name,zoneid"]))
        .await;
    let Some(data) = data else {
        return Vec::new();
    };
    list(&data, "network")
        .into_iter()
        .filter(|n| str_field(n, "name").as_deref() == Some(network_name))
        .filter(|n| match zone_id {
            Some(z) => str_field(n, "zoneid").as_deref() == Some(z),
            None => true,
        })
        .map(|n| MatchedNetwork {
            id: str_field(n, "id").unwrap_or_default(),
            zone_id: str_field(n, "zoneid"),
        })
        .collect()
}

/// Every step here is best-effort: a single resource failing is logged and
/// does not halt the teardown, because the goal is convergence toward
/// absence, not an all-or-nothing transaction.
async fn teardown_network(cmk: &dyn CmkAdapter, deploy_tag: &str, net: &MatchedNetwork) {
    info!(network_id = %net.id, zone_id = ?net.zone_id, "tearing down network");

    // 1. Snapshot policies for tagged volumes.
    let volumes_data = cmk
        .call_quiet(&args([
            "list",
            "volumes",
            "type=DATADISK",
            "tags[0].key=locaweb-ai-deploy-id",
            &format!("tags[0].value={deploy_tag}"),
            "filter=id,name",
        ]))
        .await;
    let volumes: Vec<(String, String)> = volumes_data
        .as_ref()
        .map(|d| {
            list(d, "volume")
                .into_iter()
                .map(|v| {
                    (
                        str_field(v, "id").unwrap_or_default(),
                        str_field(v, "name").unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    for (vol_id, vol_name) in &volumes {
        let policies = cmk
            .call_quiet(&args(["list", "snapshotpolicies", &format!("volumeid={vol_id}")]))
            .await;
        for p in policies
            .as_ref()
            .map(|d| list(d, "snapshotpolicy"))
            .unwrap_or_default()
        {
            if let Some(pid) = str_field(p, "id") {
                if cmk
                    .call_quiet(&args(["delete", "snapshotpolicy", &format!("id={pid}")]))
                    .await
                    .is_none()
                {
                    warn!(volume = %vol_name, "failed to delete snapshot policy, continuing");
                }
            }
        }
    }

    // 2. Detach and delete tagged data volumes.
    for (vol_id, vol_name) in &volumes {
        if cmk
            .call_quiet(&args(["detach", "volume", &format!("id={vol_id}")]))
            .await
            .is_none()
        {
            warn!(volume = %vol_name, "failed to detach volume, continuing");
        }
        sleep(DETACH_GRACE).await;
        if cmk
            .call_quiet(&args(["delete", "volume", &format!("id={vol_id}")]))
            .await
            .is_none()
        {
            warn!(volume = %vol_name, "failed to delete volume, continuing");
        }
    }

    // 3-5. Disable static NAT, delete firewall rules, release IPs.
    let ip_data = cmk
        .call_quiet(&args([
            "list",
            "publicipaddresses",
            &format!("associatednetworkid={}", net.id),
            "filter=id,ipaddress,issourcenat,isstaticnat",
        ]))
        .await;
    let ips: Vec<(String, String, bool)> = ip_data
        .as_ref()
        .map(|d| {
            list(d, "publicipaddress")
                .into_iter()
                .filter(|ip| !ip.get("issourcenat").and_then(Value::as_bool).unwrap_or(false))
                .map(|ip| {
                    (
                        str_field(ip, "id").unwrap_or_default(),
                        str_field(ip, "ipaddress").unwrap_or_default(),
                        ip.get("isstaticnat").and_then(Value::as_bool).unwrap_or(false),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    for (ip_id, addr, is_static_nat) in &ips {
        if *is_static_nat
            && cmk
                .call_quiet(&args(["disable", "staticnat", &format!("ipaddressid={ip_id}")]))
                .await
                .is_none()
        {
            warn!(ip = %addr, "failed to disable static nat, continuing");
        }
    }
    for (ip_id, addr, _) in &ips {
        let rules = cmk
            .call_quiet(&args([
                "list",
                "firewallrules",
                &format!("ipaddressid={ip_id}"),
                "filter=id,startport,endport",
            ]))
            .await;
        for r in rules.as_ref().map(|d| list(d, "firewallrule")).unwrap_or_default() {
            if let Some(rid) = str_field(r, "id") {
                if cmk
                    .call_quiet(&args(["delete", "firewallrule", &format!("id={rid}")]))
                    .await
                    .is_none()
                {
                    warn!(ip = %addr, "failed to delete firewall rule, continuing");
                }
            }
        }
    }
    for (ip_id, addr, _) in &ips {
        if cmk
            .call_quiet(&args(["disassociate", "ipaddress", &format!("id={ip_id}")]))
            .await
            .is_none()
        {
            warn!(ip = %addr, "failed to release ip, continuing");
        }
    }

    // 6. Destroy VMs.
    let vm_data = cmk
        .call_quiet(&args([
            "list",
            "virtualmachines",
            &format!("networkid={}", net.id),
            "filter=id,name,state",
        ]))
        .await;
    let vms: Vec<(String, String)> = vm_data
        .as_ref()
        .map(|d| {
            list(d, "virtualmachine")
                .into_iter()
                .map(|vm| {
                    (
                        str_field(vm, "id").unwrap_or_default(),
                        str_field(vm, "name").unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    for (vm_id, vm_name) in &vms {
        if cmk
            .call_quiet(&args([
                "destroy",
                "virtualmachine",
                &format!("id={vm_id}"),
                "expunge=true",
            ]))
            .await
            .is_none()
        {
            warn!(vm = %vm_name, "failed to destroy vm, continuing");
        }
    }

    // 7. Delete network (after VMs fully expunge).
    sleep(EXPUNGE_GRACE).await;
    if cmk
        .call_quiet(&args(["delete", "network", &format!("id={}", net.id)]))
        .await
        .is_none()
    {
        warn!(network_id = %net.id, "failed to delete network, continuing");
    }

    info!(network_id = %net.id, "network teardown complete");
}

/// Walks the owned resources in reverse of creation order. Best-effort at
/// every step — a single resource failing to delete does not halt the
/// teardown, since the goal is convergence toward absence.
///
/// When `zone_filter` is `Some`, only networks in that zone are torn down;
/// an unresolvable zone is a fatal precondition failure before any
/// destructive work begins. When `None`, every zone matching the network
/// name is torn down, since a network name is only guaranteed unique within
/// a zone on a multi-zone account. The keypair is zone-independent and is
/// deleted once at the end regardless of how many networks matched.
pub async fn teardown(
    cmk: &dyn CmkAdapter,
    identity: &ProjectIdentity,
    zone_filter: Option<&str>,
) -> Result<()> {
    let network_name = identity.network_name();
    let run_id = Uuid::new_v4();
    let _span = info_span!("teardown", %run_id, network = %network_name).entered();
    info!("starting teardown");

    let zone_id = match zone_filter {
        Some(z) => Some(catalog::resolve_zone(cmk, z).await?),
        None => None,
    };

    let networks = find_matching_networks(cmk, &network_name, zone_id.as_deref()).await;
    if networks.is_empty() {
        info!("network not found, nothing to tear down");
    }

    let deploy_tag = identity.deploy_tag();
    for net in &networks {
        teardown_network(cmk, &deploy_tag, net).await;
    }

    let keypair_name = identity.keypair_name();
    if cmk
        .call_quiet(&args(["delete", "sshkeypair", &format!("name={keypair_name}")]))
        .await
        .is_none()
    {
        warn!(keypair = %keypair_name, "failed to delete keypair, continuing");
    }

    info!("teardown complete");
    Ok(())
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

    fn identity() -> ProjectIdentity {
        ProjectIdentity {
            repo_name: "my-app".into(),
            unique_id: "1".into(),
            env_name: None,
        }
    }

    #[tokio::test]
    async fn nothing_to_tear_down_when_network_absent() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"network": []}), // list networks
            serde_json::json!({}),               // delete keypair
        ]));
        teardown(&adapter, &identity(), None).await.unwrap();
    }

    #[tokio::test]
    async fn full_teardown_sequence_best_effort() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"network": [{"id": "net-1", "name": "my-app-1", "zoneid": "z-1"}]}),
            serde_json::json!({"volume": [{"id": "v-1", "name": "my-app-1-blob"}]}), // tagged volumes
            serde_json::json!({"snapshotpolicy": [{"id": "p-1"}]}), // policies for v-1
            serde_json::json!({}), // delete policy
            serde_json::json!({}), // detach v-1
            serde_json::json!({}), // delete v-1
            serde_json::json!({"publicipaddress": [
                {"id": "ip-1", "ipaddress": "1.2.3.4", "issourcenat": false, "isstaticnat": true}
            ]}),
            serde_json::json!({}), // disable staticnat
            serde_json::json!({"firewallrule": [{"id": "r-1", "startport": 22, "endport": 22}]}),
            serde_json::json!({}), // delete fw rule
            serde_json::json!({}), // disassociate ip
            serde_json::json!({"virtualmachine": [{"id": "vm-1", "name": "my-app-1-web"}]}),
            serde_json::json!({}), // destroy vm
            serde_json::json!({}), // delete network
            serde_json::json!({}), // delete keypair
        ]));
        teardown(&adapter, &identity(), None).await.unwrap();
    }

    #[tokio::test]
    async fn zone_filter_resolves_zone_before_listing_networks() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"zone": [{"id": "z-1", "name": "ZP01"}]}), // resolve_zone
            serde_json::json!({"network": []}),                           // list networks
            serde_json::json!({}),                                        // delete keypair
        ]));
        teardown(&adapter, &identity(), Some("ZP01")).await.unwrap();
    }

    #[tokio::test]
    async fn unresolvable_zone_is_fatal() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({"zone": []})]));
        assert!(teardown(&adapter, &identity(), Some("ZP99")).await.is_err());
    }
}
