//! TCP process group with a star topology
//!
//! Rank 0 listens and keeps one stream per peer. Peers send their buffer to
//! rank 0, which answers every peer with all buffers in rank order. Frames are
//! a little-endian `u64` byte length followed by the payload; `f32` payloads are
//! little-endian.

use super::ProcessGroup;
use crate::{Error, Result};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Process group over TCP sockets
#[derive(Debug)]
pub struct TcpProcessGroup {
    rank: usize,
    world_size: usize,
    /// Rank 0: stream to rank `i + 1` at index `i`. Other ranks: the stream to rank 0.
    streams: Vec<TcpStream>,
}

impl TcpProcessGroup {
    /// Form the group as rank 0, accepting `world_size - 1` peers on `listener`
    pub fn host(listener: TcpListener, world_size: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(Error::Distributed("world size must be at least 1".to_string()));
        }

        let mut slots: Vec<Option<TcpStream>> = (1..world_size).map(|_| None).collect();
        for _ in 1..world_size {
            let (mut stream, addr) = listener.accept()?;
            stream.set_nodelay(true)?;
            let peer_rank = read_u64(&mut stream)? as usize;
            if peer_rank == 0 || peer_rank >= world_size {
                return Err(Error::Distributed(format!(
                    "peer {addr} announced rank {peer_rank} outside 1..{world_size}"
                )));
            }
            let slot = &mut slots[peer_rank - 1];
            if slot.is_some() {
                return Err(Error::Distributed(format!("rank {peer_rank} joined twice")));
            }
            tracing::debug!(rank = peer_rank, %addr, "peer joined process group");
            *slot = Some(stream);
        }

        let streams = slots.into_iter().flatten().collect();
        tracing::info!(world_size, "process group formed");
        Ok(Self {
            rank: 0,
            world_size,
            streams,
        })
    }

    /// Join the group as `rank`, retrying the connection until `timeout` elapses
    pub fn connect(
        addr: impl ToSocketAddrs,
        rank: usize,
        world_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if rank == 0 || rank >= world_size {
            return Err(Error::Distributed(format!(
                "rank {rank} cannot connect to a group of size {world_size}"
            )));
        }
        let addrs: Vec<_> = addr.to_socket_addrs()?.collect();
        let deadline = Instant::now() + timeout;

        let mut stream = loop {
            match addrs.iter().find_map(|a| TcpStream::connect(a).ok()) {
                Some(stream) => break stream,
                None if Instant::now() >= deadline => {
                    return Err(Error::Distributed(format!(
                        "rank {rank} could not reach rank 0 at {addrs:?} within {timeout:?}"
                    )));
                }
                None => thread::sleep(CONNECT_RETRY_INTERVAL),
            }
        };
        stream.set_nodelay(true)?;
        write_u64(&mut stream, rank as u64)?;
        tracing::debug!(rank, world_size, "connected to process group");

        Ok(Self {
            rank,
            world_size,
            streams: vec![stream],
        })
    }
}

impl ProcessGroup for TcpProcessGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_gather(&mut self, values: &[f32]) -> Result<Vec<Vec<f32>>> {
        if self.rank == 0 {
            let mut gathered = Vec::with_capacity(self.world_size);
            gathered.push(values.to_vec());
            for stream in &mut self.streams {
                gathered.push(decode_f32(&read_frame(stream)?)?);
            }
            for stream in &mut self.streams {
                for buffer in &gathered {
                    write_frame(stream, &encode_f32(buffer))?;
                }
                stream.flush()?;
            }
            Ok(gathered)
        } else {
            let world_size = self.world_size;
            let stream = &mut self.streams[0];
            write_frame(stream, &encode_f32(values))?;
            stream.flush()?;
            (0..world_size)
                .map(|_| decode_f32(&read_frame(stream)?))
                .collect()
        }
    }
}

fn write_u64(stream: &mut TcpStream, value: u64) -> Result<()> {
    stream.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u64(stream: &mut TcpStream) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
    write_u64(stream, payload.len() as u64)?;
    stream.write_all(payload)?;
    Ok(())
}

fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let len = read_u64(stream)? as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

fn encode_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Distributed(format!(
            "frame of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
