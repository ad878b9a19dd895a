use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::Result;
use crate::state;

pub const WEB_PORTS: &[u32] = &[22, 80, 443];
pub const SSH_ONLY_PORTS: &[u32] = &[22];

/// Creates only the missing rules from `ports`. Never deletes — firewall
/// minimality holds because this reconciler is the sole writer and every
/// owned IP starts from an empty rule set.
pub async fn ensure_firewall_rules(
    cmk: &dyn CmkAdapter,
    ip_id: &str,
    ports: &[u32],
    label: &str,
) -> Result<()> {
    let existing = state::find_firewall_rules(cmk, ip_id).await;
    for &port in ports {
        let already = existing
            .iter()
            .any(|r| r.start_port == port && r.end_port == port);
        if already {
            info!(role = %label, port, "firewall rule already exists");
            continue;
        }
        cmk.call(&args([
            "create",
            "firewallrule",
            &format!("ipaddressid={ip_id}"),
            "protocol=TCP",
            &format!("startport={port}"),
            &format!("endport={port}"),
            "cidrlist=0.0.0.0/0",
        ]))
        .await?;
        info!(role = %label, port, "firewall rule created");
    }
    Ok(())
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
    async fn creates_only_missing_ports() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"firewallrule": [{"id": "r-1", "startport": 22, "endport": 22}]}),
            serde_json::json!({}), // create 80
            serde_json::json!({}), // create 443
        ]));
        ensure_firewall_rules(&adapter, "ip-1", WEB_PORTS, "web").await.unwrap();
    }

    #[tokio::test]
    async fn noop_when_all_present() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "firewallrule": [{"id": "r-1", "startport": 22, "endport": 22}]
        })]));
        ensure_firewall_rules(&adapter, "ip-1", SSH_ONLY_PORTS, "worker-1")
            .await
            .unwrap();
    }
}
