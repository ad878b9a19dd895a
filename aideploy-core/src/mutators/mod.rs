//! Create/delete/attach/detach/scale/resize primitives. Each is the minimal
//! write that advances toward the desired state, and (apart from live scale
//! and volume resize, whose need is derived from a value compare) is only
//! invoked after a `state` read has confirmed the mutation is necessary.

pub mod disk;
pub mod firewall;
pub mod ip;
pub mod keypair;
pub mod network;
pub mod snapshot;
pub mod vm;
