//! Data-parallel process groups
//!
//! Replicas run the same training loop and synchronize through blocking
//! collectives issued in the same order on every rank.

mod env;
mod group;
mod tcp;

pub use env::{init_process_group, DistributedEnv};
pub use group::{LocalGroup, ProcessGroup};
pub use tcp::TcpProcessGroup;
