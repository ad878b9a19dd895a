//! The control-plane adapter: the sole transport to the CloudStack-compatible
//! provider, wrapping the external `cmk` CLI as a subprocess.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 5;

/// `call` and `callQuiet` over the provider's CLI. A process-struct-with-
/// async-methods split so tests can substitute an in-memory double without
/// touching the reconciler or mutator code above it.
#[async_trait]
pub trait CmkAdapter: Send + Sync {
    async fn call(&self, args: &[String]) -> Result<Value>;

    /// Collapses any error to `None` — the idempotency checks throughout
    /// this crate treat "not found" and "transient failure" identically.
    async fn call_quiet(&self, args: &[String]) -> Option<Value> {
        self.call(args).await.ok()
    }
}

/// Builds a `Vec<String>` from string-like arguments, for call sites that
/// assemble a `cmk` argument list inline.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Spawns the real `cmk` binary per call.
pub struct ProcessAdapter {
    binary: String,
}

impl ProcessAdapter {
    pub fn new() -> Self {
        Self {
            binary: "cmk".to_string(),
        }
    }

    /// Overrides the binary name/path — used in integration tests that stand
    /// up a fake `cmk` script on `PATH`.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CmkAdapter for ProcessAdapter {
    async fn call(&self, args: &[String]) -> Result<Value> {
        let joined = args.join(" ");

        for attempt in 0..=MAX_RETRIES {
            let spawned = Command::new(&self.binary).args(args).output().await;

            let output = match spawned {
                Ok(output) => output,
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff = 1u64 << (attempt + 1);
                        warn!(cmd = %joined, attempt, backoff, error = %e, "cmk spawn failed, retrying");
                        sleep(Duration::from_secs(backoff)).await;
                        continue;
                    }
                    return Err(Error::Transient {
                        args: joined,
                        attempts: MAX_RETRIES + 1,
                        message: e.to_string(),
                    });
                }
            };

            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let trimmed = stdout.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Object(Default::default()));
                }
                return serde_json::from_str(trimmed).map_err(|source| Error::Malformed {
                    args: joined.clone(),
                    source,
                });
            }

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let message = if !stderr.is_empty() { stderr } else { stdout };

            if attempt < MAX_RETRIES {
                let backoff = 1u64 << (attempt + 1);
                warn!(cmd = %joined, attempt, backoff, %message, "cmk call failed, retrying");
                sleep(Duration::from_secs(backoff)).await;
            } else {
                return Err(Error::Transient {
                    args: joined,
                    attempts: MAX_RETRIES + 1,
                    message,
                });
            }
        }

        unreachable!("loop above always returns by the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAdapter {
        response: Value,
    }

    #[async_trait]
    impl CmkAdapter for FakeAdapter {
        async fn call(&self, _args: &[String]) -> Result<Value> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn call_quiet_absorbs_errors() {
        struct AlwaysFails;
        #[async_trait]
        impl CmkAdapter for AlwaysFails {
            async fn call(&self, _args: &[String]) -> Result<Value> {
                Err(Error::Fatal("boom".into()))
            }
        }
        let adapter = AlwaysFails;
        assert!(adapter.call_quiet(&args(["list", "zones"])).await.is_none());
    }

    #[tokio::test]
    async fn call_quiet_passes_through_success() {
        let adapter = FakeAdapter {
            response: serde_json::json!({"zone": []}),
        };
        let v = adapter.call_quiet(&args(["list", "zones"])).await.unwrap();
        assert_eq!(v["zone"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn empty_stdout_on_success_parses_to_empty_object() {
        let adapter = FakeAdapter {
            response: serde_json::json!({}),
        };
        assert_eq!(
            adapter.call(&args(["list", "zones"])).await.unwrap(),
            serde_json::json!({})
        );
    }
}
