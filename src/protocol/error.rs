use std::io;

/// Everything that can go wrong while building or parsing the binary layouts.
///
/// At the file / bulk transfer level all of these are fatal for the message at hand. The command
///  channel recovers from the corruption variants by resynchronizing instead.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("refusing to packetize an empty message")]
    EmptyMessage,

    #[error("message of {len} bytes needs more than {max_frames} frames")]
    MessageTooLarge { len: usize, max_frames: usize },

    #[error("truncated frame header: got {got} of {expected} bytes")]
    TruncatedHeader { got: usize, expected: usize },

    #[error("frame magic mismatch: expected {expected:#06x}, found {found:#06x} - stream is out of sync")]
    BadFrameMagic { expected: u16, found: u16 },

    #[error("frame {index} declares {len} payload bytes, at most {max} are allowed - stream is out of sync")]
    OversizedChunk { index: u16, len: usize, max: usize },

    #[error("truncated payload in frame {index}: got {got} of {expected} bytes")]
    TruncatedPayload { index: u16, expected: usize, got: usize },

    #[error("checksum mismatch in frame {index}: header says {expected:#04x}, payload sums to {actual:#04x}")]
    FrameChecksumMismatch { index: u16, expected: u8, actual: u8 },

    #[error("reassembled message has {len} bytes, the image info block alone needs {required}")]
    MessageTooShort { len: usize, required: usize },

    #[error("image info magic mismatch: expected {expected:#06x}, found {found:#06x}")]
    BadInfoMagic { expected: u16, found: u16 },

    #[error("image info checksum mismatch: block says {expected:#04x}, content sums to {actual:#04x}")]
    InfoChecksumMismatch { expected: u8, actual: u8 },

    #[error("command payload has {got} bytes, a command info block needs {required}")]
    TruncatedCommandInfo { got: usize, required: usize },

    #[error("command info magic mismatch: expected {expected:#06x}, found {found:#06x}")]
    BadCommandInfoMagic { expected: u16, found: u16 },

    #[error("GMTI block holds at most {max} targets, got {got}")]
    TooManyTargets { got: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
