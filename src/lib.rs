pub mod command_channel;
pub mod packaging;
pub mod pipeline;
pub mod protocol;
pub mod transfer;
pub mod util;
