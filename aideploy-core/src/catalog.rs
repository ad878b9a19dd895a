//! Turns human names into opaque provider IDs. Pure lookup, no side effects.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::{Error, Result};

const NETWORK_OFFERING_NAME: &str = "Default Guest Network";
const DISK_OFFERING_NAME: &str = "data.disk.general";
const TEMPLATE_REGEX: &str = r"^Ubuntu.*24.*$";

fn find_by_name<'a>(items: &'a [Value], kind: &str, name: &str) -> Result<&'a Value> {
    items
        .iter()
        .find(|v| v.get("name").and_then(Value::as_str) == Some(name))
        .ok_or_else(|| Error::NotFound {
            args: format!("{kind} '{name}'"),
        })
}

fn as_id(v: &Value) -> String {
    v.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub async fn resolve_zone(cmk: &dyn CmkAdapter, zone_name: &str) -> Result<String> {
    let data = cmk
        .call(&args(["list", "zones", &format!("name={zone_name}"), "filter=id,name"]))
        .await?;
    let zones = list(&data, "zone");
    Ok(as_id(find_by_name(zones, "zone", zone_name)?))
}

pub async fn resolve_all_zone_ids(cmk: &dyn CmkAdapter) -> Result<Vec<String>> {
    let data = cmk.call(&args(["list", "zones", "filter=id"])).await?;
    Ok(list(&data, "zone").iter().map(as_id).collect())
}

pub async fn resolve_network_offering(cmk: &dyn CmkAdapter) -> Result<String> {
    let data = cmk
        .call(&args(["list", "networkofferings", "filter=id,name"]))
        .await?;
    let offerings = list(&data, "networkoffering");
    Ok(as_id(find_by_name(
        offerings,
        "network offering",
        NETWORK_OFFERING_NAME,
    )?))
}

pub async fn resolve_disk_offering(cmk: &dyn CmkAdapter) -> Result<String> {
    let data = cmk
        .call(&args(["list", "diskofferings", "filter=id,name"]))
        .await?;
    let offerings = list(&data, "diskoffering");
    Ok(as_id(find_by_name(
        offerings,
        "disk offering",
        DISK_OFFERING_NAME,
    )?))
}

pub async fn resolve_service_offering(cmk: &dyn CmkAdapter, name: &str) -> Result<String> {
    let data = cmk
        .call(&args(["list", "serviceofferings", "filter=id,name"]))
        .await?;
    let offerings = list(&data, "serviceoffering");
    Ok(as_id(find_by_name(offerings, "service offering", name)?))
}

/// Discovers the Ubuntu 24.x template in the given zone: lists featured
/// templates matching keyword `Ubuntu`, filters by `TEMPLATE_REGEX`, dedups
/// by ID, and picks the one with the lexicographically greatest `created`
/// timestamp (the provider emits ISO-8601, so string order is chronological
/// order — no date parsing needed, matching the source exactly).
pub async fn discover_template(cmk: &dyn CmkAdapter, zone_id: &str) -> Result<String> {
    let data = cmk
        .call(&args([
            "list",
            "templates",
            "templatefilter=featured",
            "keyword=Ubuntu",
            &format!("zoneid={zone_id}"),
            "filter=id,name,created",
        ]))
        .await?;
    let re = Regex::new(TEMPLATE_REGEX).expect("TEMPLATE_REGEX is a valid pattern");

    let mut seen = HashSet::new();
    let mut matches: Vec<(String, String, String)> = Vec::new();
    for t in list(&data, "template") {
        let id = as_id(t);
        let name = t.get("name").and_then(Value::as_str).unwrap_or_default();
        let created = t
            .get("created")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if re.is_match(name) && seen.insert(id.clone()) {
            matches.push((id, name.to_string(), created.to_string()));
        }
    }

    if matches.is_empty() {
        return Err(Error::NotFound {
            args: format!("template matching {TEMPLATE_REGEX} in zone '{zone_id}'"),
        });
    }
    matches.sort_by(|a, b| b.2.cmp(&a.2));
    let (id, name, _) = &matches[0];
    info!(template = %name, template_id = %id, "resolved template");
    Ok(id.clone())
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
    async fn resolve_zone_matches_exact_name() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "zone": [{"id": "z-1", "name": "ZP01"}, {"id": "z-2", "name": "ZP02"}]
        })]));
        assert_eq!(resolve_zone(&adapter, "ZP01").await.unwrap(), "z-1");
    }

    #[tokio::test]
    async fn resolve_zone_missing_is_fatal() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({"zone": []})]));
        assert!(resolve_zone(&adapter, "ZP99").await.is_err());
    }

    #[tokio::test]
    async fn discover_template_picks_newest_matching() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "template": [
                {"id": "t-old", "name": "Ubuntu 24.04", "created": "2025-01-01T00:00:00+0000"},
                {"id": "t-new", "name": "Ubuntu 24.04.1", "created": "2025-06-01T00:00:00+0000"},
                {"id": "t-other", "name": "CentOS 9", "created": "2025-12-01T00:00:00+0000"},
            ]
        })]));
        assert_eq!(discover_template(&adapter, "z-1").await.unwrap(), "t-new");
    }

    #[tokio::test]
    async fn discover_template_dedups_by_id() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "template": [
                {"id": "t-1", "name": "Ubuntu 24.04", "created": "2025-01-01T00:00:00+0000"},
                {"id": "t-1", "name": "Ubuntu 24.04", "created": "2025-01-01T00:00:00+0000"},
            ]
        })]));
        // No panic / double-count; still resolves to the single id.
        assert_eq!(discover_template(&adapter, "z-1").await.unwrap(), "t-1");
    }

    #[tokio::test]
    async fn discover_template_no_match_is_fatal() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "template": [{"id": "t-1", "name": "Debian 12", "created": "2025-01-01T00:00:00+0000"}]
        })]));
        assert!(discover_template(&adapter, "z-1").await.is_err());
    }
}
