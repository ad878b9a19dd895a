//! Wire types: the desired spec a caller supplies, the project identity that
//! names every owned resource, and the output map a provision run produces.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A closed enumeration of the per-role sizing tags.
///
/// The source treats these as free strings passed straight through to the
/// provider's service-offering lookup; modeling them as a closed enum here
/// catches typos at config-load time instead of at the first failed `cmk`
/// call, and gives downstream consumers (e.g. a config generator tuning
/// PostgreSQL to the db VM's RAM) a side table instead of a string to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Micro,
    Small,
    Medium,
    Large,
    Xlarge,
    #[serde(rename = "2xlarge")]
    TwoXlarge,
    #[serde(rename = "4xlarge")]
    FourXlarge,
}

impl Plan {
    /// The provider service-offering name this plan resolves to.
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Micro => "micro",
            Plan::Small => "small",
            Plan::Medium => "medium",
            Plan::Large => "large",
            Plan::Xlarge => "xlarge",
            Plan::TwoXlarge => "2xlarge",
            Plan::FourXlarge => "4xlarge",
        }
    }

    /// RAM side table for downstream consumers (e.g. PostgreSQL tuning lives
    /// outside this crate, but it needs a number, not a tag).
    pub fn ram_mib(self) -> u32 {
        match self {
            Plan::Micro => 512,
            Plan::Small => 1024,
            Plan::Medium => 2048,
            Plan::Large => 4096,
            Plan::Xlarge => 8192,
            Plan::TwoXlarge => 16384,
            Plan::FourXlarge => 32768,
        }
    }
}

/// Input configuration for a `provision` run. Immutable for the duration of
/// that run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredSpec {
    pub zone: String,
    pub web_plan: Plan,
    pub blob_disk_size_gb: u32,
    #[serde(default)]
    pub workers_enabled: bool,
    #[serde(default)]
    pub workers_replicas: u32,
    #[serde(default)]
    pub workers_plan: Option<Plan>,
    #[serde(default)]
    pub db_enabled: bool,
    #[serde(default)]
    pub db_plan: Option<Plan>,
    #[serde(default)]
    pub db_disk_size_gb: Option<u32>,
}

impl DesiredSpec {
    /// Rejects specs that are structurally inconsistent before any cmk call
    /// is made. `workers_enabled:true, workers_replicas:0` is the one
    /// combination the source handles inconsistently across call sites; here
    /// it's simply invalid.
    pub fn validate(&self) -> Result<()> {
        if self.blob_disk_size_gb == 0 {
            return Err(Error::Fatal("blob_disk_size_gb must be positive".into()));
        }
        if self.workers_enabled {
            if self.workers_replicas == 0 {
                return Err(Error::Fatal(
                    "workers_enabled requires workers_replicas >= 1".into(),
                ));
            }
            if self.workers_plan.is_none() {
                return Err(Error::Fatal(
                    "workers_enabled requires workers_plan".into(),
                ));
            }
        }
        if self.db_enabled {
            if self.db_plan.is_none() {
                return Err(Error::Fatal("db_enabled requires db_plan".into()));
            }
            match self.db_disk_size_gb {
                Some(0) | None => {
                    return Err(Error::Fatal(
                        "db_enabled requires a positive db_disk_size_gb".into(),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// The `(repoName, uniqueId, envName?)` tuple that deterministically names
/// every resource this crate owns.
#[derive(Debug, Clone)]
pub struct ProjectIdentity {
    pub repo_name: String,
    pub unique_id: String,
    pub env_name: Option<String>,
}

impl ProjectIdentity {
    /// Builds an identity whose `network_name()` is exactly `network_name`,
    /// for call sites (teardown's `--network-name` flag) that only have the
    /// already-composed name, not its `repoName`/`uniqueId` components.
    pub fn from_network_name(network_name: impl Into<String>) -> Self {
        Self {
            repo_name: network_name.into(),
            unique_id: String::new(),
            env_name: None,
        }
    }

    pub fn network_name(&self) -> String {
        if self.unique_id.is_empty() {
            return self.repo_name.clone();
        }
        match &self.env_name {
            Some(env) if !env.is_empty() => {
                format!("{}-{}-{}", self.repo_name, self.unique_id, env)
            }
            _ => format!("{}-{}", self.repo_name, self.unique_id),
        }
    }

    pub fn keypair_name(&self) -> String {
        format!("{}-key", self.network_name())
    }

    pub fn web_vm_name(&self) -> String {
        format!("{}-web", self.network_name())
    }

    pub fn worker_vm_name(&self, index: u32) -> String {
        format!("{}-worker-{}", self.network_name(), index)
    }

    pub fn db_vm_name(&self) -> String {
        format!("{}-db", self.network_name())
    }

    pub fn blob_disk_name(&self) -> String {
        format!("{}-blob", self.network_name())
    }

    pub fn db_disk_name(&self) -> String {
        format!("{}-dbdata", self.network_name())
    }

    /// The canonical tag value used on every owned data volume and snapshot
    /// policy. Equal to `networkName` — not a separate identifier.
    pub fn deploy_tag(&self) -> String {
        self.network_name()
    }
}

/// Opaque provider IDs resolved once per run.
#[derive(Debug, Clone)]
pub struct CatalogIds {
    pub zone_id: String,
    pub all_zone_ids: Vec<String>,
    pub network_offering_id: String,
    pub disk_offering_id: String,
    pub template_id: String,
    pub web_offering_id: String,
    pub worker_offering_id: Option<String>,
    pub db_offering_id: Option<String>,
}

/// The wiring map a `provision` run produces. Keys are present iff the role
/// they describe exists in the desired spec — enforced here via
/// `skip_serializing_if`, matching the wire contract exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionOutput {
    pub network_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_vm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_ip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_internal_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_volume_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_vm_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_ips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_internal_ips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_vm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_ip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_internal_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_volume_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_name_without_env() {
        let id = ProjectIdentity {
            repo_name: "my-app".into(),
            unique_id: "12345".into(),
            env_name: None,
        };
        assert_eq!(id.network_name(), "my-app-12345");
        assert_eq!(id.keypair_name(), "my-app-12345-key");
        assert_eq!(id.worker_vm_name(2), "my-app-12345-worker-2");
    }

    #[test]
    fn network_name_with_env() {
        let id = ProjectIdentity {
            repo_name: "my-app".into(),
            unique_id: "12345".into(),
            env_name: Some("staging".into()),
        };
        assert_eq!(id.network_name(), "my-app-12345-staging");
        assert_eq!(id.db_vm_name(), "my-app-12345-staging-db");
    }

    #[test]
    fn from_network_name_roundtrips_without_suffix() {
        let id = ProjectIdentity::from_network_name("my-app-12345");
        assert_eq!(id.network_name(), "my-app-12345");
        assert_eq!(id.keypair_name(), "my-app-12345-key");
        assert_eq!(id.deploy_tag(), "my-app-12345");
    }

    #[test]
    fn plan_roundtrips_through_json() {
        let json = r#""2xlarge""#;
        let plan: Plan = serde_json::from_str(json).unwrap();
        assert_eq!(plan, Plan::TwoXlarge);
        assert_eq!(serde_json::to_string(&plan).unwrap(), json);
    }

    #[test]
    fn validate_rejects_zero_workers_with_workers_enabled() {
        let spec = DesiredSpec {
            zone: "ZP01".into(),
            web_plan: Plan::Small,
            blob_disk_size_gb: 10,
            workers_enabled: true,
            workers_replicas: 0,
            workers_plan: Some(Plan::Small),
            db_enabled: false,
            db_plan: None,
            db_disk_size_gb: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_accepts_web_only_spec() {
        let spec = DesiredSpec {
            zone: "ZP01".into(),
            web_plan: Plan::Small,
            blob_disk_size_gb: 20,
            workers_enabled: false,
            workers_replicas: 0,
            workers_plan: None,
            db_enabled: false,
            db_plan: None,
            db_disk_size_gb: None,
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn output_omits_absent_role_keys() {
        let out = ProvisionOutput {
            network_name: "my-app-1".into(),
            web_vm_id: Some("v-1".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("worker_vm_ids").is_none());
        assert!(json.get("db_vm_id").is_none());
        assert_eq!(json.get("web_vm_id").unwrap(), "v-1");
    }
}
