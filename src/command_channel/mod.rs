//! The command channel: operator commands sent to the imaging device, one command per frame.
//!
//! The receiving side does not acknowledge commands.

pub mod command_handler;
pub mod command_sender;
pub mod command_server;
pub mod reassembly;
