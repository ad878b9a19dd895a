//! Loads a `DesiredSpec` and an SSH public key off disk. The only I/O this
//! crate does outside of the cmk adapter.

use std::path::Path;

use crate::error::{Error, Result};
use crate::spec::DesiredSpec;

pub fn load_spec(path: &Path) -> Result<DesiredSpec> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Fatal(format!("reading config {}: {e}", path.display())))?;
    let spec: DesiredSpec = serde_json::from_str(&raw)
        .map_err(|e| Error::Fatal(format!("parsing config {}: {e}", path.display())))?;
    spec.validate()?;
    Ok(spec)
}

pub fn load_public_key(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Fatal(format!("reading public key {}: {e}", path.display())))?;
    Ok(raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_spec_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"zone":"ZP01","web_plan":"small","blob_disk_size_gb":10,
                "workers_enabled":true,"workers_replicas":0}}"#
        )
        .unwrap();
        assert!(load_spec(&path).is_err());
    }

    #[test]
    fn load_spec_accepts_complete_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"zone":"ZP01","web_plan":"small","blob_disk_size_gb":30,
                "workers_enabled":true,"workers_replicas":3,"workers_plan":"small",
                "db_enabled":true,"db_plan":"medium","db_disk_size_gb":25}}"#
        )
        .unwrap();
        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.workers_replicas, 3);
        assert!(spec.db_enabled);
    }

    #[test]
    fn load_public_key_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pub");
        std::fs::write(&path, "ssh-ed25519 AAAA...\n").unwrap();
        assert_eq!(load_public_key(&path).unwrap(), "ssh-ed25519 AAAA...");
    }
}
