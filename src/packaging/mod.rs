//! Turning messages into frame sequences and back.

pub mod depacketizer;
pub mod message;
pub mod package_file;
pub mod packetizer;
