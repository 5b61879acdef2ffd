use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::image_info::ImageInfo;

/// Where a message ends in a frame sequence
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageEnd {
    /// consume frames until the input is exhausted - this is how package files are read
    AtEndOfInput,
    /// stop after the frame whose index equals its total count - this is how a live connection
    ///  is read, since the peer keeps it open waiting for an acknowledgment
    AtLastFrame,
}

/// Reads frames from an async byte source, one at a time and strictly in arrival order.
///
/// Only the framing is validated here (complete header, magic, payload length within the
///  chunk limit, complete payload). The payload checksum is left to the consumer, so that a
///  frame source for re-transmission does not need to pay for it.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> FrameReader<R> {
        FrameReader { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns `None` if the input ends exactly at a frame boundary. Input ending anywhere else
    ///  is an error.
    pub async fn next_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut raw_header = [0u8; FrameHeader::SERIALIZED_LEN];
        let num_read = read_fully(&mut self.reader, &mut raw_header).await?;
        if num_read == 0 {
            return Ok(None);
        }
        let header = FrameHeader::deser(&mut &raw_header[..num_read])?;

        let mut payload = BytesMut::zeroed(header.payload_len());
        let num_read = read_fully(&mut self.reader, &mut payload).await?;
        if num_read < payload.len() {
            return Err(ProtocolError::TruncatedPayload {
                index: header.current_index,
                expected: header.payload_len(),
                got: num_read,
            });
        }

        Ok(Some(Frame {
            header,
            payload: payload.freeze(),
        }))
    }
}

/// reads until `buf` is full or the input is exhausted, returning the number of bytes read
async fn read_fully(reader: &mut (impl AsyncRead + Unpin), buf: &mut [u8]) -> std::io::Result<usize> {
    let mut offs = 0;
    while offs < buf.len() {
        let n = reader.read(&mut buf[offs..]).await?;
        if n == 0 {
            break;
        }
        offs += n;
    }
    Ok(offs)
}

/// A message reassembled from frames and validated
#[derive(Debug, Clone)]
pub struct UnpackagedMessage {
    pub info: ImageInfo,
    /// the info block exactly as received, including its checksum
    pub raw_info: Bytes,
    pub body: Bytes,
    pub num_frames: usize,
}

/// Accumulates frame payloads in arrival order
#[derive(Debug, Default)]
pub struct Depacketizer {
    buf: BytesMut,
    num_frames: usize,
    last_header: Option<FrameHeader>,
}

impl Depacketizer {
    pub fn new() -> Depacketizer {
        Default::default()
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn accumulated_len(&self) -> usize {
        self.buf.len()
    }

    /// true if the last frame pushed declared itself as the last one of its message
    pub fn is_complete(&self) -> bool {
        self.last_header
            .map(|h| h.is_last())
            .unwrap_or(false)
    }

    pub fn push_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        if let Err(e) = frame.verify_checksum() {
            warn!("rejecting frame {}/{} of image {}: {}", frame.header.current_index, frame.header.total_count, frame.header.image_number, e);
            return Err(e);
        }
        trace!("unpacked frame {}/{} with {} bytes", frame.header.current_index, frame.header.total_count, frame.payload.len());

        self.buf.extend_from_slice(&frame.payload);
        self.num_frames += 1;
        self.last_header = Some(frame.header);
        Ok(())
    }

    /// Validates the accumulated message and splits it into info block and body
    pub fn finish(self) -> ProtocolResult<UnpackagedMessage> {
        let info = match ImageInfo::deser(&self.buf) {
            Ok(info) => info,
            Err(e) => {
                warn!("reassembled message from {} frames is invalid: {}", self.num_frames, e);
                return Err(e);
            }
        };

        let mut buf = self.buf;
        let raw_info = buf.split_to(ImageInfo::SERIALIZED_LEN).freeze();
        let body = buf.freeze();

        if info.declared_body_len() != body.len() {
            // the body length is informational, the frames define the message
            debug!("info block declares {} body bytes, got {}", info.declared_body_len(), body.len());
        }

        Ok(UnpackagedMessage {
            info,
            raw_info,
            body,
            num_frames: self.num_frames,
        })
    }
}

/// Reassembles and validates one message from an async frame stream
pub async fn depacketize_stream<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>, end: MessageEnd) -> ProtocolResult<UnpackagedMessage> {
    let mut depacketizer = Depacketizer::new();

    while let Some(frame) = reader.next_frame().await? {
        depacketizer.push_frame(&frame)?;
        if end == MessageEnd::AtLastFrame && depacketizer.is_complete() {
            break;
        }
    }

    let result = depacketizer.finish()?;
    debug!("unpackaged message {} from {} frames, body has {} bytes", result.info.message_count, result.num_frames, result.body.len());
    Ok(result)
}

/// Reassembles and validates a message from a complete in-memory frame sequence, e.g. a
///  package file's content
pub fn depacketize_bytes(mut data: &[u8]) -> ProtocolResult<UnpackagedMessage> {
    let mut depacketizer = Depacketizer::new();

    while !data.is_empty() {
        let header = FrameHeader::deser(&mut data)?;
        let payload_len = header.payload_len();
        if data.len() < payload_len {
            return Err(ProtocolError::TruncatedPayload {
                index: header.current_index,
                expected: payload_len,
                got: data.len(),
            });
        }
        let (payload, rest) = data.split_at(payload_len);
        data = rest;

        depacketizer.push_frame(&Frame {
            header,
            payload: Bytes::copy_from_slice(payload),
        })?;
    }

    depacketizer.finish()
}

pub async fn depacketize_file(path: impl AsRef<Path>) -> ProtocolResult<UnpackagedMessage> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    let mut reader = FrameReader::new(tokio::io::BufReader::new(file));
    depacketize_stream(&mut reader, MessageEnd::AtEndOfInput).await
}
