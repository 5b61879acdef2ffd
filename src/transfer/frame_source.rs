use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::fs::File;
use tokio::io::BufReader;

use crate::packaging::depacketizer::FrameReader;
use crate::protocol::error::ProtocolResult;
use crate::protocol::frame::Frame;

/// Supplies serialized frames (header followed by payload) to a transfer, in transmission order
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSource: Send {
    /// `None` once all frames were delivered
    async fn next_frame(&mut self) -> ProtocolResult<Option<Bytes>>;
}

/// Frames held in memory, typically straight from the packetizer
pub struct FrameQueue {
    frames: VecDeque<Frame>,
}

impl FrameQueue {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl From<Vec<Frame>> for FrameQueue {
    fn from(frames: Vec<Frame>) -> Self {
        FrameQueue {
            frames: frames.into(),
        }
    }
}

#[async_trait]
impl FrameSource for FrameQueue {
    async fn next_frame(&mut self) -> ProtocolResult<Option<Bytes>> {
        Ok(self.frames.pop_front().map(|f| f.to_bytes()))
    }
}

/// Streams the frames of a package file without loading the whole file. A short header or
///  payload is reported as an error, the file's end at a frame boundary as the end of frames.
pub struct PackageFileSource {
    reader: FrameReader<BufReader<File>>,
}

impl PackageFileSource {
    pub async fn open(path: impl AsRef<Path>) -> ProtocolResult<PackageFileSource> {
        let file = File::open(path.as_ref()).await?;
        Ok(PackageFileSource {
            reader: FrameReader::new(BufReader::new(file)),
        })
    }
}

#[async_trait]
impl FrameSource for PackageFileSource {
    async fn next_frame(&mut self) -> ProtocolResult<Option<Bytes>> {
        Ok(self.reader.next_frame().await?
            .map(|f| f.to_bytes()))
    }
}
