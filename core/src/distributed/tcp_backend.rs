//! Multi-process collectives over TCP.
//!
//! Star topology: rank 0 listens on the rendezvous address and every other
//! rank holds one connection to it. Rank 0 performs each reduction in
//! ascending rank order and sends the single result back, so every rank
//! observes the same bits.
//!
//! Frame layout: `[tag: u8][len: u32 LE][payload: len bytes]`.

use super::backend::CollectiveBackend;
use crate::error::{DdpError, Result};
use ddp_rs_kernels::cpu_add_assign;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const TAG_HELLO: u8 = 1;
const TAG_WELCOME: u8 = 2;
const TAG_BARRIER: u8 = 3;
const TAG_RELEASE: u8 = 4;
const TAG_REDUCE: u8 = 5;
const TAG_REDUCED: u8 = 6;

/// Upper bound on one frame; a gradient buffer of 256M floats.
const MAX_FRAME_LEN: usize = 1 << 30;

enum Link {
    /// Rank 0: `peers[i]` is the connection to rank `i + 1`.
    Root { peers: Vec<TcpStream> },
    Peer { root: TcpStream },
}

/// Collective backend for ranks running as separate OS processes.
pub struct TcpBackend {
    rank: usize,
    world_size: usize,
    link: Link,
}

impl TcpBackend {
    /// Joins the group at `addr`: rank 0 binds and waits for everybody,
    /// other ranks connect, retrying until `rendezvous_timeout` elapses.
    pub fn connect(
        addr: &str,
        rank: usize,
        world_size: usize,
        rendezvous_timeout: Duration,
    ) -> Result<Self> {
        if rank >= world_size {
            return Err(DdpError::InvalidRank { rank, world_size });
        }
        if rank == 0 {
            let listener = TcpListener::bind(addr)
                .map_err(|e| DdpError::io(format!("binding rendezvous address {addr}"), e))?;
            Self::serve(listener, world_size)
        } else {
            Self::join(addr, rank, world_size, rendezvous_timeout)
        }
    }

    /// Rank 0 side of the rendezvous on an already bound listener.
    ///
    /// Blocks until all `world_size - 1` peers have said hello.
    pub fn serve(listener: TcpListener, world_size: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(DdpError::InvalidRank {
                rank: 0,
                world_size,
            });
        }

        let local = listener
            .local_addr()
            .map_err(|e| DdpError::io("reading rendezvous address", e))?;
        info!(%local, world_size, "rank 0 waiting for peers");

        let mut slots: Vec<Option<TcpStream>> = (1..world_size).map(|_| None).collect();
        let mut joined = 0;
        while joined < world_size - 1 {
            let (stream, remote) = listener
                .accept()
                .map_err(|e| DdpError::io("accepting peer connection", e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| DdpError::io("configuring peer socket", e))?;

            let payload = expect_frame(&stream, TAG_HELLO, "hello")?;
            let (peer_rank, peer_world) = decode_hello(&payload)?;
            if peer_world != world_size {
                return Err(DdpError::Protocol(format!(
                    "rank {peer_rank} at {remote} expects world_size {peer_world}, root has {world_size}"
                )));
            }
            if peer_rank == 0 || peer_rank >= world_size {
                return Err(DdpError::InvalidRank {
                    rank: peer_rank,
                    world_size,
                });
            }
            let slot = &mut slots[peer_rank - 1];
            if slot.is_some() {
                return Err(DdpError::Protocol(format!(
                    "rank {peer_rank} joined twice (second time from {remote})"
                )));
            }
            debug!(peer_rank, %remote, "peer joined");
            *slot = Some(stream);
            joined += 1;
        }

        let peers: Vec<TcpStream> = slots.into_iter().flatten().collect();
        for peer in &peers {
            write_frame(peer, TAG_WELCOME, &[])?;
        }
        info!(world_size, "rendezvous complete");

        Ok(Self {
            rank: 0,
            world_size,
            link: Link::Root { peers },
        })
    }

    /// Non-root side of the rendezvous.
    pub fn join(
        addr: &str,
        rank: usize,
        world_size: usize,
        rendezvous_timeout: Duration,
    ) -> Result<Self> {
        if rank == 0 || rank >= world_size {
            return Err(DdpError::InvalidRank { rank, world_size });
        }

        let root = connect_with_retry(addr, rendezvous_timeout)?;
        root.set_nodelay(true)
            .map_err(|e| DdpError::io("configuring root socket", e))?;

        let mut hello = Vec::with_capacity(8);
        hello.extend_from_slice(&(rank as u32).to_le_bytes());
        hello.extend_from_slice(&(world_size as u32).to_le_bytes());
        write_frame(&root, TAG_HELLO, &hello)?;
        expect_frame(&root, TAG_WELCOME, "welcome")?;
        info!(rank, world_size, addr, "joined process group");

        Ok(Self {
            rank,
            world_size,
            link: Link::Peer { root },
        })
    }
}

impl CollectiveBackend for TcpBackend {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn barrier(&self) -> Result<()> {
        match &self.link {
            Link::Root { peers } => {
                for peer in peers {
                    expect_frame(peer, TAG_BARRIER, "barrier")?;
                }
                for peer in peers {
                    write_frame(peer, TAG_RELEASE, &[])?;
                }
            }
            Link::Peer { root } => {
                write_frame(root, TAG_BARRIER, &[])?;
                expect_frame(root, TAG_RELEASE, "release")?;
            }
        }
        Ok(())
    }

    fn all_reduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        match &self.link {
            Link::Root { peers } => {
                for peer in peers {
                    let payload = expect_frame(peer, TAG_REDUCE, "reduce")?;
                    let incoming = decode_f32s(&payload, buf.len())?;
                    cpu_add_assign(buf, &incoming)?;
                }
                let reduced = encode_f32s(buf);
                for peer in peers {
                    write_frame(peer, TAG_REDUCED, &reduced)?;
                }
            }
            Link::Peer { root } => {
                write_frame(root, TAG_REDUCE, &encode_f32s(buf))?;
                let payload = expect_frame(root, TAG_REDUCED, "reduced")?;
                let reduced = decode_f32s(&payload, buf.len())?;
                buf.copy_from_slice(&reduced);
            }
        }
        Ok(())
    }
}

fn connect_with_retry(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    let mut backoff = Duration::from_millis(50);
    loop {
        let attempt = addr
            .to_socket_addrs()
            .map_err(|e| DdpError::io(format!("resolving {addr}"), e))
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    DdpError::Collective(format!("{addr} did not resolve to any address"))
                })
            })
            .and_then(|sock| {
                TcpStream::connect(sock).map_err(|e| DdpError::io(format!("connecting to {addr}"), e))
            });

        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) if Instant::now() >= deadline => return Err(err),
            Err(err) => {
                debug!(%err, "rendezvous not ready, retrying");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
        }
    }
}

fn frame_header(tag: u8, len: usize) -> Result<[u8; 5]> {
    if len > MAX_FRAME_LEN {
        return Err(DdpError::Protocol(format!(
            "frame {tag} of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    let len = len as u32;
    let mut header = [tag, 0, 0, 0, 0];
    header[1..].copy_from_slice(&len.to_le_bytes());
    Ok(header)
}

fn write_frame(mut stream: &TcpStream, tag: u8, payload: &[u8]) -> Result<()> {
    let header = frame_header(tag, payload.len())?;
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    stream
        .write_all(&frame)
        .map_err(|e| DdpError::Collective(format!("sending frame {tag}: {e}")))
}

fn read_frame(mut stream: &TcpStream) -> Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream
        .read_exact(&mut header)
        .map_err(|e| DdpError::Collective(format!("peer disconnected: {e}")))?;
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DdpError::Protocol(format!("frame of {len} bytes exceeds limit")));
    }
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .map_err(|e| DdpError::Collective(format!("peer disconnected mid-frame: {e}")))?;
    Ok((header[0], payload))
}

fn expect_frame(stream: &TcpStream, tag: u8, what: &str) -> Result<Vec<u8>> {
    let (got, payload) = read_frame(stream)?;
    if got != tag {
        return Err(DdpError::Protocol(format!(
            "expected {what} frame (tag {tag}), got tag {got}; ranks issued collectives in different orders"
        )));
    }
    Ok(payload)
}

fn decode_hello(payload: &[u8]) -> Result<(usize, usize)> {
    if payload.len() != 8 {
        return Err(DdpError::Protocol(format!(
            "hello frame has {} bytes, expected 8",
            payload.len()
        )));
    }
    let rank = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let world = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
    Ok((rank, world))
}

fn encode_f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_f32s(payload: &[u8], expected_len: usize) -> Result<Vec<f32>> {
    if payload.len() != expected_len * 4 {
        return Err(DdpError::ShapeMismatch {
            expected: vec![expected_len],
            got: vec![payload.len() / 4],
        });
    }
    Ok(payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_codec() {
        let values = vec![1.0f32, -0.0, f32::MIN_POSITIVE, 3.25];
        let bytes = encode_f32s(&values);
        assert_eq!(bytes.len(), 16);
        let back = decode_f32s(&bytes, 4).unwrap();
        for (a, b) in values.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_f32_codec_length_mismatch() {
        let bytes = encode_f32s(&[1.0, 2.0]);
        assert!(matches!(
            decode_f32s(&bytes, 3),
            Err(DdpError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_frame_header_limit() {
        assert_eq!(frame_header(TAG_REDUCE, 8).unwrap(), [TAG_REDUCE, 8, 0, 0, 0]);
        assert!(frame_header(TAG_REDUCE, MAX_FRAME_LEN).is_ok());
        assert!(matches!(
            frame_header(TAG_REDUCE, MAX_FRAME_LEN + 1),
            Err(DdpError::Protocol(_))
        ));
        assert!(matches!(
            frame_header(TAG_REDUCE, 1usize << 32),
            Err(DdpError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_hello() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&4u32.to_le_bytes());
        assert_eq!(decode_hello(&payload).unwrap(), (3, 4));
        assert!(decode_hello(&payload[..7]).is_err());
    }

    #[test]
    fn test_join_rejects_rank_zero() {
        let err = TcpBackend::join("127.0.0.1:1", 0, 2, Duration::from_millis(10));
        assert!(matches!(err, Err(DdpError::InvalidRank { .. })));
    }

    #[test]
    fn test_join_times_out_without_root() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let addr = format!("127.0.0.1:{port}");
        let started = Instant::now();
        let err = TcpBackend::join(&addr, 1, 2, Duration::from_millis(200));
        assert!(err.is_err());
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
