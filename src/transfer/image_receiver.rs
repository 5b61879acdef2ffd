use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::packaging::depacketizer::{Depacketizer, FrameReader, UnpackagedMessage};
use crate::transfer::ACK;

#[derive(Debug, Clone)]
pub struct ImageReceiverConfig {
    pub listen_addr: SocketAddr,
    /// reply with the acknowledgment after each complete, valid message
    pub send_ack: bool,
}

impl ImageReceiverConfig {
    pub fn new(listen_addr: SocketAddr) -> ImageReceiverConfig {
        ImageReceiverConfig {
            listen_addr,
            send_ack: true,
        }
    }
}

#[derive(Debug)]
pub struct ReceivedMessage {
    pub peer: SocketAddr,
    pub message: UnpackagedMessage,
}

/// The receiving end of image transfers: reassembles messages from incoming connections and
///  passes them on through a channel.
///
/// Any corruption is fatal for the connection it occurs on - there is no resynchronization on
///  the image channel, the sender has to retry.
pub struct ImageReceiver {
    listener: TcpListener,
    config: Arc<ImageReceiverConfig>,
    messages: mpsc::Sender<ReceivedMessage>,
}

impl ImageReceiver {
    pub async fn bind(config: Arc<ImageReceiverConfig>, messages: mpsc::Sender<ReceivedMessage>) -> anyhow::Result<ImageReceiver> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("listening for images on {}", listener.local_addr()?);
        Ok(ImageReceiver {
            listener,
            config,
            messages,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept_loop(&self) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;

            let config = self.config.clone();
            let messages = self.messages.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(peer, stream, config, messages).await {
                    warn!("image connection from {} broke with an error: {}", peer, e);
                }
            });
        }
    }
}

#[instrument(name="image_connection", skip_all, fields(peer = %peer))]
async fn handle_connection(peer: SocketAddr, stream: TcpStream, config: Arc<ImageReceiverConfig>, messages: mpsc::Sender<ReceivedMessage>) -> anyhow::Result<()> {
    debug!("accepted connection");
    receive_messages(peer, stream, &config, &messages)
        .instrument(Span::current())
        .await
}

/// Receives messages from a single connection until the peer closes it between two messages
pub async fn receive_messages<IO>(peer: SocketAddr, io: IO, config: &ImageReceiverConfig, messages: &mpsc::Sender<ReceivedMessage>) -> anyhow::Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = FrameReader::new(io);

    loop {
        let mut depacketizer = Depacketizer::new();
        while !depacketizer.is_complete() {
            match reader.next_frame().await? {
                Some(frame) => depacketizer.push_frame(&frame)?,
                None if depacketizer.num_frames() == 0 => {
                    debug!("connection closed");
                    return Ok(());
                }
                None => bail!("connection closed in the middle of a message, after {} frames", depacketizer.num_frames()),
            }
        }

        let message = depacketizer.finish()?;
        info!("received image {} ({} body bytes in {} frames)", message.info.message_count, message.body.len(), message.num_frames);

        if config.send_ack {
            let io = reader.get_mut();
            io.write_all(ACK).await?;
            io.flush().await?;
        }

        if messages.send(ReceivedMessage { peer, message }).await.is_err() {
            bail!("message consumer is gone");
        }
    }
}
