//! An in-memory CloudStack-compatible double used by property and scenario
//! tests. Not part of the public API — compiled for tests only.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapter::CmkAdapter;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
struct Vm {
    id: String,
    name: String,
    state: String,
    service_offering_id: String,
    network_id: String,
    nic_ip: String,
}

#[derive(Clone, Debug)]
struct Volume {
    id: String,
    name: String,
    size_gb: u32,
    vm_id: Option<String>,
    tag: Option<String>,
}

#[derive(Clone, Debug)]
struct PublicIp {
    id: String,
    address: String,
    network_id: String,
    is_source_nat: bool,
    is_static_nat: bool,
    vm_id: Option<String>,
}

#[derive(Clone, Debug)]
struct FirewallRule {
    id: String,
    ip_id: String,
    start_port: u32,
    end_port: u32,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    next_octet: u32,
    zones: Vec<(String, String)>,
    network_offerings: Vec<(String, String)>,
    disk_offerings: Vec<(String, String)>,
    service_offerings: Vec<(String, String)>,
    templates: Vec<(String, String, String)>,
    networks: Vec<(String, String, String)>,
    keypairs: Vec<String>,
    vms: Vec<Vm>,
    volumes: Vec<Volume>,
    ips: Vec<PublicIp>,
    fw_rules: Vec<FirewallRule>,
    snapshot_policy_volume_ids: Vec<(String, String)>,
    write_count: u64,
}

/// A minimal, realistic-enough CloudStack account: two zones, one offering
/// per plan tag, one disk offering, one matching Ubuntu template.
pub struct FakeCloud(Mutex<FakeState>);

impl FakeCloud {
    pub fn new() -> Self {
        let mut s = FakeState {
            next_octet: 10,
            ..Default::default()
        };
        s.zones.push(("z-zp01".into(), "ZP01".into()));
        s.zones.push(("z-zp02".into(), "ZP02".into()));
        s.network_offerings
            .push(("no-default".into(), "Default Guest Network".into()));
        s.disk_offerings
            .push(("do-general".into(), "data.disk.general".into()));
        for plan in ["micro", "small", "medium", "large", "xlarge", "2xlarge", "4xlarge"] {
            s.service_offerings.push((format!("so-{plan}"), plan.to_string()));
        }
        s.templates.push((
            "tpl-ubuntu2404".into(),
            "Ubuntu 24.04".into(),
            "2025-01-01T00:00:00+0000".into(),
        ));
        Self(Mutex::new(s))
    }

    pub fn write_count(&self) -> u64 {
        self.0.lock().unwrap().write_count
    }

    /// Convenience for property tests that need to inspect the raw set of
    /// VM names currently existing (e.g. to assert worker contiguity).
    pub fn vm_names(&self) -> Vec<String> {
        self.0.lock().unwrap().vms.iter().map(|v| v.name.clone()).collect()
    }

    pub fn firewall_ports(&self, ip_address: &str) -> Vec<(u32, u32)> {
        let s = self.0.lock().unwrap();
        let Some(ip) = s.ips.iter().find(|ip| ip.address == ip_address) else {
            return Vec::new();
        };
        s.fw_rules
            .iter()
            .filter(|r| r.ip_id == ip.id)
            .map(|r| (r.start_port, r.end_port))
            .collect()
    }
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_kv(args: &[String]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for a in args.iter().skip(2) {
        if let Some((k, v)) = a.split_once('=') {
            map.insert(k.to_string(), v.to_string());
        }
    }
    map
}

#[async_trait]
impl CmkAdapter for FakeCloud {
    async fn call(&self, args: &[String]) -> Result<Value> {
        let mut s = self.0.lock().unwrap();
        let verb = args.first().map(String::as_str).unwrap_or_default();
        let noun = args.get(1).map(String::as_str).unwrap_or_default();
        let kv = parse_kv(args);

        match (verb, noun) {
            ("list", "zones") => Ok(json!({"zone": s.zones.iter()
                .filter(|(_, name)| kv.get("name").is_none_or(|n| n == name))
                .map(|(id, name)| json!({"id": id, "name": name}))
                .collect::<Vec<_>>()})),

            ("list", "networkofferings") => Ok(json!({"networkoffering": s.network_offerings.iter()
                .map(|(id, name)| json!({"id": id, "name": name})).collect::<Vec<_>>()})),

            ("list", "diskofferings") => Ok(json!({"diskoffering": s.disk_offerings.iter()
                .map(|(id, name)| json!({"id": id, "name": name})).collect::<Vec<_>>()})),

            ("list", "serviceofferings") => Ok(json!({"serviceoffering": s.service_offerings.iter()
                .map(|(id, name)| json!({"id": id, "name": name})).collect::<Vec<_>>()})),

            ("list", "templates") => Ok(json!({"template": s.templates.iter()
                .map(|(id, name, created)| json!({"id": id, "name": name, "created": created}))
                .collect::<Vec<_>>()})),

            ("list", "networks") => {
                let name_filter = kv.get("name").cloned();
                Ok(json!({"network": s.networks.iter()
                    .filter(|(_, name, _)| name_filter.as_ref().is_none_or(|n| n == name))
                    .map(|(id, name, zoneid)| json!({"id": id, "name": name, "zoneid": zoneid}))
                    .collect::<Vec<_>>()}))
            }

            ("create", "network") => {
                let id = s.alloc("net");
                let name = kv["name"].clone();
                let zoneid = kv["zoneid"].clone();
                s.networks.push((id.clone(), name, zoneid));
                s.write_count += 1;
                Ok(json!({"network": {"id": id}}))
            }

            ("delete", "network") => {
                let id = kv["id"].clone();
                s.networks.retain(|(nid, _, _)| nid != &id);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "sshkeypairs") => {
                let name = kv["name"].clone();
                let found = s.keypairs.iter().any(|k| k == &name);
                Ok(json!({"sshkeypair": if found { vec![json!({"name": name})] } else { vec![] }}))
            }

            ("register", "sshkeypair") => {
                s.keypairs.push(kv["name"].clone());
                s.write_count += 1;
                Ok(json!({}))
            }

            ("delete", "sshkeypair") => {
                let name = kv["name"].clone();
                s.keypairs.retain(|k| k != &name);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "virtualmachines") => {
                let name_filter = kv.get("name").cloned();
                let id_filter = kv.get("id").cloned();
                let net_filter = kv.get("networkid").cloned();
                let vms: Vec<Value> = s
                    .vms
                    .iter()
                    .filter(|v| name_filter.as_ref().is_none_or(|n| n == &v.name))
                    .filter(|v| id_filter.as_ref().is_none_or(|i| i == &v.id))
                    .filter(|v| net_filter.as_ref().is_none_or(|n| n == &v.network_id))
                    .map(|v| {
                        json!({"id": v.id, "name": v.name, "state": v.state,
                               "serviceofferingid": v.service_offering_id,
                               "nic": [{"ipaddress": v.nic_ip}]})
                    })
                    .collect();
                Ok(json!({"virtualmachine": vms}))
            }

            ("deploy", "virtualmachine") => {
                let id = s.alloc("vm");
                let octet = s.next_octet;
                s.next_octet += 1;
                let vm = Vm {
                    id: id.clone(),
                    name: kv["name"].clone(),
                    state: "Running".into(),
                    service_offering_id: kv["serviceofferingid"].clone(),
                    network_id: kv["networkids"].clone(),
                    nic_ip: format!("10.0.0.{octet}"),
                };
                s.vms.push(vm);
                s.write_count += 1;
                Ok(json!({"virtualmachine": {"id": id}}))
            }

            ("scale", "virtualmachine") => {
                let id = kv["id"].clone();
                let vm = s.vms.iter_mut().find(|v| v.id == id);
                match vm {
                    Some(vm) => {
                        vm.service_offering_id = kv["serviceofferingid"].clone();
                        s.write_count += 1;
                        Ok(json!({}))
                    }
                    None => Err(Error::Fatal("vm not found".into())),
                }
            }

            ("stop", "virtualmachine") => {
                let id = kv["id"].clone();
                if let Some(vm) = s.vms.iter_mut().find(|v| v.id == id) {
                    vm.state = "Stopped".into();
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("start", "virtualmachine") => {
                let id = kv["id"].clone();
                if let Some(vm) = s.vms.iter_mut().find(|v| v.id == id) {
                    vm.state = "Running".into();
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("destroy", "virtualmachine") => {
                let id = kv["id"].clone();
                s.vms.retain(|v| v.id != id);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "volumes") => {
                let name_filter = kv.get("name").cloned();
                let tag_filter = kv.get("tags[0].value").cloned();
                let vols: Vec<Value> = s
                    .volumes
                    .iter()
                    .filter(|v| name_filter.as_ref().is_none_or(|n| n == &v.name))
                    .filter(|v| tag_filter.as_ref().is_none_or(|t| v.tag.as_deref() == Some(t.as_str())))
                    .map(|v| {
                        json!({"id": v.id, "name": v.name,
                               "virtualmachineid": v.vm_id,
                               "size": (v.size_gb as u64) * 1024 * 1024 * 1024,
                               "state": "Ready"})
                    })
                    .collect();
                Ok(json!({"volume": vols}))
            }

            ("create", "volume") => {
                let id = s.alloc("vol");
                let vol = Volume {
                    id: id.clone(),
                    name: kv["name"].clone(),
                    size_gb: kv["size"].parse().unwrap_or(0),
                    vm_id: None,
                    tag: None,
                };
                s.volumes.push(vol);
                s.write_count += 1;
                Ok(json!({"volume": {"id": id}}))
            }

            ("create", "tags") => {
                let id = kv["resourceids"].clone();
                let tag = kv["tags[0].value"].clone();
                if let Some(v) = s.volumes.iter_mut().find(|v| v.id == id) {
                    v.tag = Some(tag);
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("attach", "volume") => {
                let id = kv["id"].clone();
                let vm_id = kv["virtualmachineid"].clone();
                if let Some(v) = s.volumes.iter_mut().find(|v| v.id == id) {
                    v.vm_id = Some(vm_id);
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("detach", "volume") => {
                let id = kv["id"].clone();
                if let Some(v) = s.volumes.iter_mut().find(|v| v.id == id) {
                    v.vm_id = None;
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("delete", "volume") => {
                let id = kv["id"].clone();
                s.volumes.retain(|v| v.id != id);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("resize", "volume") => {
                let id = kv["id"].clone();
                let size: u32 = kv["size"].parse().unwrap_or(0);
                if let Some(v) = s.volumes.iter_mut().find(|v| v.id == id) {
                    v.size_gb = size;
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "publicipaddresses") => {
                let net_filter = kv.get("associatednetworkid").cloned();
                let id_filter = kv.get("id").cloned();
                let ips: Vec<Value> = s
                    .ips
                    .iter()
                    .filter(|ip| net_filter.as_ref().is_none_or(|n| n == &ip.network_id))
                    .filter(|ip| id_filter.as_ref().is_none_or(|i| i == &ip.id))
                    .map(|ip| {
                        json!({"id": ip.id, "ipaddress": ip.address,
                               "issourcenat": ip.is_source_nat, "isstaticnat": ip.is_static_nat,
                               "virtualmachineid": ip.vm_id})
                    })
                    .collect();
                Ok(json!({"publicipaddress": ips}))
            }

            ("associate", "ipaddress") => {
                let id = s.alloc("ip");
                let octet = s.next_octet;
                s.next_octet += 1;
                let ip = PublicIp {
                    id: id.clone(),
                    address: format!("198.51.100.{octet}"),
                    network_id: kv["networkid"].clone(),
                    is_source_nat: false,
                    is_static_nat: false,
                    vm_id: None,
                };
                let addr = ip.address.clone();
                s.ips.push(ip);
                s.write_count += 1;
                Ok(json!({"ipaddress": {"id": id, "ipaddress": addr}}))
            }

            ("enable", "staticnat") => {
                let id = kv["ipaddressid"].clone();
                let vm_id = kv["virtualmachineid"].clone();
                if let Some(ip) = s.ips.iter_mut().find(|ip| ip.id == id) {
                    ip.is_static_nat = true;
                    ip.vm_id = Some(vm_id);
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("disable", "staticnat") => {
                let id = kv["ipaddressid"].clone();
                if let Some(ip) = s.ips.iter_mut().find(|ip| ip.id == id) {
                    ip.is_static_nat = false;
                }
                s.write_count += 1;
                Ok(json!({}))
            }

            ("disassociate", "ipaddress") => {
                let id = kv["id"].clone();
                s.ips.retain(|ip| ip.id != id);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "firewallrules") => {
                let ip_filter = kv["ipaddressid"].clone();
                let rules: Vec<Value> = s
                    .fw_rules
                    .iter()
                    .filter(|r| r.ip_id == ip_filter)
                    .map(|r| json!({"id": r.id, "startport": r.start_port, "endport": r.end_port}))
                    .collect();
                Ok(json!({"firewallrule": rules}))
            }

            ("create", "firewallrule") => {
                let id = s.alloc("fw");
                let rule = FirewallRule {
                    id: id.clone(),
                    ip_id: kv["ipaddressid"].clone(),
                    start_port: kv["startport"].parse().unwrap_or(0),
                    end_port: kv["endport"].parse().unwrap_or(0),
                };
                s.fw_rules.push(rule);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("delete", "firewallrule") => {
                let id = kv["id"].clone();
                s.fw_rules.retain(|r| r.id != id);
                s.write_count += 1;
                Ok(json!({}))
            }

            ("list", "snapshotpolicies") => {
                let vol_id = kv["volumeid"].clone();
                let policies: Vec<Value> = s
                    .snapshot_policy_volume_ids
                    .iter()
                    .filter(|(_, v)| v == &vol_id)
                    .map(|(id, _)| json!({"id": id}))
                    .collect();
                Ok(json!({"snapshotpolicy": policies}))
            }

            ("create", "snapshotpolicy") => {
                let id = s.alloc("snap");
                let vol_id = kv["volumeid"].clone();
                s.snapshot_policy_volume_ids.push((id, vol_id));
                s.write_count += 1;
                Ok(json!({}))
            }

            ("delete", "snapshotpolicy") => {
                let id = kv["id"].clone();
                s.snapshot_policy_volume_ids.retain(|(pid, _)| pid != &id);
                s.write_count += 1;
                Ok(json!({}))
            }

            _ => Err(Error::Fatal(format!("unhandled fake cmk command: {} {}", verb, noun))),
        }
    }
}

impl FakeState {
    fn alloc(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Allocates a non-source-NAT IP directly into the fake, as `associate
/// ipaddress` normally would, for tests that need pre-existing unassigned
/// IPs in the pool.
impl FakeCloud {
    pub fn seed_unassigned_ip(&self, network_id: &str, address: &str) {
        let mut s = self.0.lock().unwrap();
        let id = s.alloc("ip");
        s.ips.push(PublicIp {
            id,
            address: address.to_string(),
            network_id: network_id.to_string(),
            is_source_nat: false,
            is_static_nat: false,
            vm_id: None,
        });
    }
}
