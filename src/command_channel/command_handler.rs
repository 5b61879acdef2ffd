use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

use crate::protocol::command::Command;

/// Receives the commands recovered from a command channel connection, in stream order
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn on_command(&self, peer: SocketAddr, command: Command);
}
