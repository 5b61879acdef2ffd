//! The fixed binary layouts of the radar data link.
//!
//! There are two independent channels:
//! * the *image channel*, where a message (an [image_info::ImageInfo] block followed by an image
//!   blob) is split into [frame::Frame]s of at most 4096 payload bytes, each with its own
//!   header and checksum
//! * the *command channel*, where each [command::CommandInfo] travels in a single command frame
//!
//! All multi-byte numbers are little endian, and all structures are byte-packed. The layouts are
//!  fixed by an external interface document, so there is no versioning.

pub mod checksum;
pub mod command;
pub mod error;
pub mod frame;
pub mod gmti;
pub mod image_info;
pub mod quantization;
