use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn, Instrument, Span};

use crate::protocol::error::ProtocolError;
use crate::transfer::frame_source::FrameSource;
use crate::transfer::transfer_config::{AckMode, TransferConfig};
use crate::transfer::ACK;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("could not connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("no connection to {addr} within {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("failed to write frame #{frame}: {source}")]
    Write { frame: usize, source: io::Error },

    #[error("failed to read acknowledgment: {0}")]
    Read(io::Error),

    #[error("could not get the next frame: {0}")]
    FrameSource(#[from] ProtocolError),

    #[error("there were no frames to send")]
    NoFrames,

    #[error("peer closed the connection without acknowledging")]
    PeerClosed,

    #[error("no acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("transfer was abandoned before it finished")]
    Abandoned,
}

/// The terminal result of a transfer, reported exactly once
#[derive(Debug)]
pub struct TransferOutcome {
    pub frames_sent: usize,
    pub result: Result<(), TransferError>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum TransferState {
    Idle,
    Connecting,
    Sending,
    AwaitingAck,
    Finished,
}

/// Drives a single outbound transfer: connect, write all frames in order, optionally wait for
///  the peer's acknowledgment, disconnect.
///
/// A manager is consumed by running it, so it can not be reused for a second transfer. Its
///  outcome is reported through the receiver returned by [TransferManager::new], exactly once -
///  if a manager is dropped before it finishes, that is reported as [TransferError::Abandoned].
pub struct TransferManager {
    config: Arc<TransferConfig>,
    state: TransferState,
    frames_sent: usize,
    on_finished: Option<oneshot::Sender<TransferOutcome>>,
}

impl TransferManager {
    pub fn new(config: Arc<TransferConfig>) -> (TransferManager, oneshot::Receiver<TransferOutcome>) {
        let (send, recv) = oneshot::channel();
        let manager = TransferManager {
            config,
            state: TransferState::Idle,
            frames_sent: 0,
            on_finished: Some(send),
        };
        (manager, recv)
    }

    /// Connects to the configured target and performs the transfer on that connection
    #[instrument(name="transfer", skip_all, fields(target = %self.config.target))]
    pub async fn run(mut self, source: impl FrameSource) {
        self.set_state(TransferState::Connecting);

        let addr = self.config.target;
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.finish(Err(TransferError::Connect { addr, source: e })),
            Err(_) => return self.finish(Err(TransferError::ConnectTimeout { addr, timeout: self.config.connect_timeout })),
        };
        debug!("connected");
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }

        self.run_on(stream, source)
            .instrument(Span::current())
            .await
    }

    /// Performs the transfer on an already established connection
    pub async fn run_on<IO, S>(mut self, mut io: IO, mut source: S)
    where
        IO: AsyncRead + AsyncWrite + Unpin,
        S: FrameSource,
    {
        let result = self.transmit(&mut io, &mut source).await;

        if result.is_ok() {
            // we initiate the disconnect, the transfer is complete regardless of how that goes
            if let Err(e) = io.shutdown().await {
                debug!("error shutting down connection after successful transfer: {}", e);
            }
        }
        self.finish(result);
    }

    async fn transmit<IO, S>(&mut self, io: &mut IO, source: &mut S) -> Result<(), TransferError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
        S: FrameSource,
    {
        self.set_state(TransferState::Sending);
        while let Some(frame) = source.next_frame().await? {
            io.write_all(&frame).await
                .map_err(|e| TransferError::Write { frame: self.frames_sent + 1, source: e })?;
            self.frames_sent += 1;
            trace!("wrote frame #{} ({} bytes)", self.frames_sent, frame.len());
        }
        if self.frames_sent == 0 {
            return Err(TransferError::NoFrames);
        }
        io.flush().await
            .map_err(|e| TransferError::Write { frame: self.frames_sent, source: e })?;
        debug!("all {} frames written", self.frames_sent);

        match self.config.ack_mode {
            AckMode::NoAck => Ok(()),
            AckMode::AwaitAck => {
                self.set_state(TransferState::AwaitingAck);
                match timeout(self.config.ack_timeout, await_ack(io)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransferError::AckTimeout(self.config.ack_timeout)),
                }
            }
        }
    }

    fn set_state(&mut self, state: TransferState) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn finish(&mut self, result: Result<(), TransferError>) {
        let Some(on_finished) = self.on_finished.take() else {
            return;
        };
        self.set_state(TransferState::Finished);

        match &result {
            Ok(()) => info!("transfer of {} frames successful", self.frames_sent),
            Err(e) => warn!("transfer failed after {} frames: {}", self.frames_sent, e),
        }

        // the receiver may have lost interest, that is fine
        let _ = on_finished.send(TransferOutcome {
            frames_sent: self.frames_sent,
            result,
        });
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        self.finish(Err(TransferError::Abandoned));
    }
}

/// Reads until the acknowledgment shows up. Other data is ignored, EOF is a failure.
async fn await_ack(io: &mut (impl AsyncRead + Unpin)) -> Result<(), TransferError> {
    let mut received = Vec::with_capacity(ACK.len() * 2);
    let mut buf = [0u8; 64];
    loop {
        let n = io.read(&mut buf).await
            .map_err(TransferError::Read)?;
        if n == 0 {
            return Err(TransferError::PeerClosed);
        }
        received.extend_from_slice(&buf[..n]);

        if received.windows(ACK.len()).any(|w| w == ACK) {
            debug!("received acknowledgment");
            return Ok(());
        }

        debug!("ignoring unexpected data from peer: {:?}", String::from_utf8_lossy(&received));
        // keep what could be the start of a split acknowledgment
        let keep_from = received.len().saturating_sub(ACK.len() - 1);
        received.drain(..keep_from);
    }
}

/// Performs a transfer and waits for its outcome
pub async fn transfer(config: Arc<TransferConfig>, source: impl FrameSource) -> TransferOutcome {
    let (manager, on_finished) = TransferManager::new(config);
    manager.run(source).await;
    match on_finished.await {
        Ok(outcome) => outcome,
        Err(_) => TransferOutcome {
            frames_sent: 0,
            result: Err(TransferError::Abandoned),
        },
    }
}
