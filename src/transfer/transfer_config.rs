use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::protocol::frame::FrameHeader;

/// Whether the sender waits for the receiver's acknowledgment after the last frame
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckMode {
    /// wait for the peer's `"OK"` and treat its absence as a failure
    AwaitAck,
    /// the transfer is successful as soon as the last frame is written
    NoAck,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub target: SocketAddr,

    /// maximum payload per frame
    pub chunk_size: usize,

    pub ack_mode: AckMode,
    /// Single-shot timeout, started once the last frame was written
    pub ack_timeout: Duration,

    pub connect_timeout: Duration,
}

impl TransferConfig {
    pub fn new(target: SocketAddr) -> TransferConfig {
        TransferConfig {
            target,
            chunk_size: FrameHeader::MAX_CHUNK_LEN,
            ack_mode: AckMode::AwaitAck,
            ack_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 || self.chunk_size > FrameHeader::MAX_CHUNK_LEN {
            bail!("chunk size must be between 1 and {}", FrameHeader::MAX_CHUNK_LEN);
        }
        if self.ack_timeout.is_zero() {
            bail!("ack timeout must be positive");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect timeout must be positive");
        }
        if self.target.port() == 0 {
            bail!("target port must not be 0");
        }
        Ok(())
    }
}
