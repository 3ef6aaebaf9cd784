//! Rendezvous configuration from launcher environment variables

use super::TcpProcessGroup;
use crate::{Error, Result};
use std::net::TcpListener;
use std::time::Duration;

const DEFAULT_MASTER_ADDR: &str = "127.0.0.1";
const DEFAULT_MASTER_PORT: u16 = 29500;
const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(300);

/// Distributed launch parameters
///
/// Read from `LOCAL_RANK`, `RANK`, `WORLD_SIZE`, `MASTER_ADDR` and `MASTER_PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedEnv {
    pub local_rank: usize,
    pub rank: usize,
    pub world_size: usize,
    pub master_addr: String,
    pub master_port: u16,
}

impl DistributedEnv {
    /// `None` when `LOCAL_RANK` is unset or `-1`
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let local_rank: i64 = match lookup("LOCAL_RANK") {
            Some(value) => parse_var("LOCAL_RANK", &value)?,
            None => return Ok(None),
        };
        if local_rank < 0 {
            return Ok(None);
        }
        let local_rank = local_rank as usize;

        let rank = match lookup("RANK") {
            Some(value) => parse_var("RANK", &value)?,
            None => local_rank,
        };
        let world_size: usize = match lookup("WORLD_SIZE") {
            Some(value) => parse_var("WORLD_SIZE", &value)?,
            None => {
                return Err(Error::ConfigError(
                    "WORLD_SIZE must be set when LOCAL_RANK is".to_string(),
                ))
            }
        };
        if rank >= world_size {
            return Err(Error::ConfigError(format!(
                "RANK {rank} is outside WORLD_SIZE {world_size}"
            )));
        }
        let master_addr = lookup("MASTER_ADDR").unwrap_or_else(|| DEFAULT_MASTER_ADDR.to_string());
        let master_port = match lookup("MASTER_PORT") {
            Some(value) => parse_var("MASTER_PORT", &value)?,
            None => DEFAULT_MASTER_PORT,
        };

        Ok(Some(Self {
            local_rank,
            rank,
            world_size,
            master_addr,
            master_port,
        }))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigError(format!("{key}={value:?} is not a valid number")))
}

/// Join the process group described by `env`
///
/// Rank 0 binds `MASTER_ADDR:MASTER_PORT`; the other ranks connect to it.
pub fn init_process_group(env: &DistributedEnv) -> Result<TcpProcessGroup> {
    let addr = (env.master_addr.as_str(), env.master_port);
    tracing::info!(
        rank = env.rank,
        world_size = env.world_size,
        master = %format!("{}:{}", env.master_addr, env.master_port),
        "initializing process group"
    );
    if env.rank == 0 {
        TcpProcessGroup::host(TcpListener::bind(addr)?, env.world_size)
    } else {
        TcpProcessGroup::connect(addr, env.rank, env.world_size, RENDEZVOUS_TIMEOUT)
    }
}
