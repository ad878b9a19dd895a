use serde_json::Value;
use tracing::info;

use crate::adapter::{args, CmkAdapter};
use crate::error::Result;
use crate::state;

/// Ensures a network named `name` exists, returning its ID either way.
pub async fn ensure_network(
    cmk: &dyn CmkAdapter,
    name: &str,
    network_offering_id: &str,
    zone_id: &str,
) -> Result<String> {
    if let Some(id) = state::find_network(cmk, name, Some(zone_id)).await {
        info!(network = %name, id = %id, "network already exists");
        return Ok(id);
    }
    let data = cmk
        .call(&args([
            "create",
            "network",
            &format!("name={name}"),
            &format!("displaytext={name}"),
            &format!("networkofferingid={network_offering_id}"),
            &format!("zoneid={zone_id}"),
        ]))
        .await?;
    let id = data["network"]["id"].as_str().unwrap_or_default().to_string();
    info!(network = %name, id = %id, "network created");
    Ok(id)
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
    async fn creates_when_absent() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"network": []}),
            serde_json::json!({"network": {"id": "net-1"}}),
        ]));
        let id = ensure_network(&adapter, "my-app-1", "no-1", "z-1").await.unwrap();
        assert_eq!(id, "net-1");
    }

    #[tokio::test]
    async fn reuses_existing() {
        let adapter = Scripted(Mutex::new(vec![serde_json::json!({
            "network": [{"id": "net-1", "name": "my-app-1", "zoneid": "z-1"}]
        })]));
        let id = ensure_network(&adapter, "my-app-1", "no-1", "z-1").await.unwrap();
        assert_eq!(id, "net-1");
    }

    #[tokio::test]
    async fn creates_new_when_same_name_exists_in_another_zone() {
        let adapter = Scripted(Mutex::new(vec![
            serde_json::json!({"network": [{"id": "net-1", "name": "my-app-1", "zoneid": "z-1"}]}),
            serde_json::json!({"network": {"id": "net-2"}}),
        ]));
        let id = ensure_network(&adapter, "my-app-1", "no-1", "z-2").await.unwrap();
        assert_eq!(id, "net-2");
    }
}
