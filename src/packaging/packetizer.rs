use anyhow::bail;
use bytes::Bytes;
use tracing::trace;

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::util::safe_converter::SafeCast;

/// Splits an assembled message into frames of at most `chunk_size` payload bytes
#[derive(Debug, Clone, Copy)]
pub struct Packetizer {
    chunk_size: usize,
}

impl Default for Packetizer {
    fn default() -> Self {
        Packetizer {
            chunk_size: FrameHeader::MAX_CHUNK_LEN,
        }
    }
}

impl Packetizer {
    pub fn new(chunk_size: usize) -> anyhow::Result<Packetizer> {
        if chunk_size == 0 || chunk_size > FrameHeader::MAX_CHUNK_LEN {
            bail!("chunk size must be between 1 and {}, was {}", FrameHeader::MAX_CHUNK_LEN, chunk_size);
        }
        Ok(Packetizer { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn frame_count(&self, message_len: usize) -> usize {
        message_len.div_ceil(self.chunk_size)
    }

    /// Produces the frames for `message` in transmission order. Payload chunks share the
    ///  message's memory rather than copying it.
    ///
    /// `image_size` goes into every frame header unchanged - it is the size of the image blob
    ///  inside the message, not the size of the message.
    pub fn packetize(&self, message: &Bytes, image_number: u16, image_size: u32) -> ProtocolResult<Vec<Frame>> {
        if message.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }

        let total_count = self.frame_count(message.len());
        let total_count: u16 = match total_count.try_into() {
            Ok(n) => n,
            Err(_) => return Err(ProtocolError::MessageTooLarge {
                len: message.len(),
                max_frames: u16::MAX as usize,
            }),
        };

        let frames = (1..=total_count)
            .map(|current_index| {
                let index: usize = current_index.safe_cast();
                let start = (index - 1) * self.chunk_size;
                let end = (start + self.chunk_size).min(message.len());
                Frame::new(image_number, image_size, current_index, total_count, message.slice(start..end))
            })
            .collect::<Vec<_>>();

        trace!("split message of {} bytes into {} frames", message.len(), frames.len());
        Ok(frames)
    }
}
