//! Predicates and finders over current provider state. Every read returns
//! `None`/empty on absence — nothing here raises.

use serde_json::Value;

use crate::adapter::{args, CmkAdapter};

#[derive(Debug, Clone)]
pub struct VmInfo {
    pub id: String,
    pub state: String,
    pub service_offering_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub id: String,
    pub virtual_machine_id: Option<String>,
    pub size_bytes: u64,
    #[allow(dead_code)]
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct PublicIp {
    pub id: String,
    pub ip_address: String,
    pub is_source_nat: bool,
    pub is_static_nat: bool,
    pub virtual_machine_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FirewallRule {
    pub id: String,
    pub start_port: u32,
    pub end_port: u32,
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn list<'a>(data: &'a Value, key: &str) -> Vec<&'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

/// Exact match on `name`, scoped to `zone_id` when given. A network name is
/// only guaranteed unique within a zone, so an unscoped lookup could return
/// the wrong zone's network on a multi-zone account.
pub async fn find_network(cmk: &dyn CmkAdapter, name: &str, zone_id: Option<&str>) -> Option<String> {
    let data = cmk
        .call_quiet(&args(["list", "networks", "filter=id,name,zoneid"]))
        .await?;
    list(&data, "network")
        .into_iter()
        .find(|n| {
            str_field(n, "name").as_deref() == Some(name)
                && zone_id.is_none_or(|z| str_field(n, "zoneid").as_deref() == Some(z))
        })
        .and_then(|n| str_field(n, "id"))
}

pub async fn find_keypair(cmk: &dyn CmkAdapter, name: &str) -> bool {
    let data = cmk
        .call_quiet(&args(["list", "sshkeypairs", &format!("name={name}")]))
        .await;
    matches!(data, Some(v) if !list(&v, "sshkeypair").is_empty())
}

pub async fn find_vm(cmk: &dyn CmkAdapter, name: &str) -> Option<VmInfo> {
    let data = cmk
        .call_quiet(&args([
            "list",
            "virtualmachines",
            &format!("name={name}"),
            "filter=id,name,state,serviceofferingid",
        ]))
        .await?;
    list(&data, "virtualmachine")
        .into_iter()
        .find(|vm| str_field(vm, "name").as_deref() == Some(name))
        .map(|vm| VmInfo {
            id: str_field(vm, "id").unwrap_or_default(),
            state: str_field(vm, "state").unwrap_or_default(),
            service_offering_id: str_field(vm, "serviceofferingid"),
        })
}

pub async fn find_volume(cmk: &dyn CmkAdapter, name: &str) -> Option<VolumeInfo> {
    let data = cmk
        .call_quiet(&args([
            "list",
            "volumes",
            &format!("name={name}"),
            "type=DATADISK",
            "filter=id,name,virtualmachineid,state,size",
        ]))
        .await?;
    list(&data, "volume")
        .into_iter()
        .find(|v| str_field(v, "name").as_deref() == Some(name))
        .map(|v| VolumeInfo {
            id: str_field(v, "id").unwrap_or_default(),
            virtual_machine_id: str_field(v, "virtualmachineid"),
            size_bytes: v.get("size").and_then(Value::as_u64).unwrap_or(0),
            state: str_field(v, "state").unwrap_or_default(),
        })
}

pub(crate) fn parse_ip(ip: &Value) -> PublicIp {
    PublicIp {
        id: str_field(ip, "id").unwrap_or_default(),
        ip_address: str_field(ip, "ipaddress").unwrap_or_default(),
        is_source_nat: ip
            .get("issourcenat")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        is_static_nat: ip
            .get("isstaticnat")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        virtual_machine_id: str_field(ip, "virtualmachineid"),
    }
}

pub async fn find_public_ips(cmk: &dyn CmkAdapter, network_id: &str) -> Vec<PublicIp> {
    let data = cmk
        .call_quiet(&args([
            "list",
            "publicipaddresses",
            &format!("associatednetworkid={network_id}"),
            "filter=id,ipaddress,issourcenat,isstaticnat,virtualmachineid",
        ]))
        .await;
    match data {
        Some(v) => list(&v, "publicipaddress")
            .into_iter()
            .map(parse_ip)
            .filter(|ip| !ip.is_source_nat)
            .collect(),
        None => Vec::new(),
    }
}

pub async fn find_public_ip_for_vm(
    cmk: &dyn CmkAdapter,
    network_id: &str,
    vm_id: &str,
) -> Option<PublicIp> {
    find_public_ips(cmk, network_id)
        .await
        .into_iter()
        .find(|ip| ip.virtual_machine_id.as_deref() == Some(vm_id))
}

pub async fn find_firewall_rules(cmk: &dyn CmkAdapter, ip_id: &str) -> Vec<FirewallRule> {
    let data = cmk
        .call_quiet(&args([
            "list",
            "firewallrules",
            &format!("ipaddressid={ip_id}"),
            "filter=id,startport,endport",
        ]))
        .await;
    match data {
        Some(v) => list(&v, "firewallrule")
            .into_iter()
            .map(|r| FirewallRule {
                id: str_field(r, "id").unwrap_or_default(),
                start_port: r.get("startport").and_then(Value::as_u64).unwrap_or(0) as u32,
                end_port: r.get("endport").and_then(Value::as_u64).unwrap_or(0) as u32,
            })
            .collect(),
        None => Vec::new(),
    }
}

pub async fn is_static_nat_enabled(cmk: &dyn CmkAdapter, ip_id: &str) -> bool {
    let data = cmk
        .call_quiet(&args([
            "list",
            "publicipaddresses",
            &format!("id={ip_id}"),
            "filter=id,isstaticnat,virtualmachineid",
        ]))
        .await;
    match data {
        Some(v) => list(&v, "publicipaddress")
            .first()
            .and_then(|ip| ip.get("isstaticnat"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        None => false,
    }
}
