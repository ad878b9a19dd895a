use thiserror::Error;

/// Errors surfaced by the control-plane adapter, catalog resolver, and reconciler.
///
/// `Transient` is the adapter's internal retry-exhausted error; by the time it
/// reaches a caller the retry budget is already spent, so there's nothing left
/// to do with it but treat it like any other fatal error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cmk {args}: not found")]
    NotFound { args: String },

    #[error("cmk {args}: conflict: {message}")]
    Conflict { args: String, message: String },

    #[error("cannot shrink {desc}: current {current_gb}GB > desired {desired_gb}GB")]
    ShrinkRejected {
        desc: String,
        current_gb: u64,
        desired_gb: u64,
    },

    #[error("cmk {args}: malformed JSON output: {source}")]
    Malformed {
        args: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cmk {args} failed after {attempts} attempts: {message}")]
    Transient {
        args: String,
        attempts: u32,
        message: String,
    },

    #[error("{0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
