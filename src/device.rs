//! Device selection
//!
//! The tensor engine executes on the host CPU. Accelerator device strings are
//! still parsed so configurations written for other hardware fail loudly with
//! [`Error::BackendUnavailable`] instead of silently running somewhere else.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
    Tpu,
}

impl Device {
    /// Parse a device string: `cpu`, `cuda`, `cuda:N` or `tpu`
    ///
    /// Anything else selects the CPU.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim().to_ascii_lowercase();
        if spec == "tpu" {
            Device::Tpu
        } else if let Some(rest) = spec.strip_prefix("cuda") {
            let ordinal = rest
                .strip_prefix(':')
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            Device::Cuda(ordinal)
        } else {
            Device::Cpu
        }
    }

    /// Parse `spec` and pin CUDA to the local rank in distributed runs
    ///
    /// `local_rank` is `-1` outside distributed execution.
    pub fn resolve(spec: &str, local_rank: i64) -> Self {
        match Self::parse(spec) {
            Device::Cuda(_) if local_rank >= 0 => Device::Cuda(local_rank as usize),
            device => device,
        }
    }

    /// Fail unless this device has a backend in the current build
    pub fn ensure_available(&self) -> Result<()> {
        match self {
            Device::Cpu => Ok(()),
            Device::Cuda(_) => Err(Error::BackendUnavailable("CUDA".to_string())),
            Device::Tpu => Err(Error::BackendUnavailable("XLA".to_string())),
        }
    }

    pub fn is_tpu(&self) -> bool {
        matches!(self, Device::Tpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(n) => write!(f, "cuda:{n}"),
            Device::Tpu => write!(f, "tpu"),
        }
    }
}
