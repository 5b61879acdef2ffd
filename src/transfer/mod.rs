//! The image channel: sending frame sequences to a receiver and receiving them

pub mod frame_source;
pub mod image_receiver;
pub mod ledger;
pub mod transfer_config;
pub mod transfer_manager;

/// The receiver's acknowledgment of a complete message
pub const ACK: &[u8] = b"OK";
