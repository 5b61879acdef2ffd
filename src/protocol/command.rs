use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::protocol::checksum::checksum;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};

/// Outer header of a command frame on the command channel. All numbers are little endian.
///
/// ```ascii
///  0: fixed value 0x9EE9 (u16)
///  2: reserved (16 bytes, zero)
/// 18: payload length (u16)
/// 20: checksum over the entire payload (u8)
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommandFrameHeader {
    pub magic: u16,
    pub payload_length: u16,
    pub checksum: u8,
}

impl CommandFrameHeader {
    pub const MAGIC: u16 = 0x9EE9;
    pub const SERIALIZED_LEN: usize = 21;

    const RESERVED_LEN: usize = 16;

    pub fn for_payload(payload: &[u8]) -> CommandFrameHeader {
        CommandFrameHeader {
            magic: Self::MAGIC,
            payload_length: payload.len().prechecked_cast(),
            checksum: checksum(payload),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.magic);
        buf.put_bytes(0, Self::RESERVED_LEN);
        buf.put_u16_le(self.payload_length);
        buf.put_u8(self.checksum);
    }

    /// Reads a header *without* judging its magic - the receiver decides how to react to a
    ///  mismatch. Returns `None` if there are not enough bytes for a header.
    pub fn peek(buf: &[u8]) -> Option<CommandFrameHeader> {
        if buf.len() < Self::SERIALIZED_LEN {
            return None;
        }
        let mut buf = &buf[..Self::SERIALIZED_LEN];
        let magic = buf.get_u16_le();
        buf.advance(Self::RESERVED_LEN);
        Some(CommandFrameHeader {
            magic,
            payload_length: buf.get_u16_le(),
            checksum: buf.get_u8(),
        })
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    /// total length of header and payload
    pub fn frame_len(&self) -> usize {
        Self::SERIALIZED_LEN + <u16 as SafeCast<usize>>::safe_cast(self.payload_length)
    }
}

/// Command kinds understood by the imaging device
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CommandType {
    /// request for an image (section), identified by image number and pixel offsets
    ImageRequest = 0x01,
}

/// Payload of a command frame. All numbers are little endian.
///
/// ```ascii
///  0: frame header 0x55AA (u16)
///  2: message length (u32)
///  6: message count (u16)
///  8: source address (u16)
/// 10: destination address (u16)
/// 12: command type (u8)
/// 13: reserved (u8)
/// 14: image number (u16)
/// 16: pixel offset x (i16)
/// 18: pixel offset y (i16)
/// 20: total number of image columns (i16)
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommandInfo {
    pub data_length: u32,
    pub message_count: u16,
    pub source_address: u16,
    pub destination_address: u16,
    pub command_type: u8,
    pub image_number: u16,
    pub pixel_offset_x: i16,
    pub pixel_offset_y: i16,
    pub total_y: i16,
}

impl CommandInfo {
    pub const MAGIC: u16 = 0x55AA;
    pub const SERIALIZED_LEN: usize = 22;

    /// value of the `data_length` field: the block without magic and the length field itself
    pub const DECLARED_LEN: u32 = (Self::SERIALIZED_LEN - 4) as u32;

    pub fn image_request(message_count: u16, image_number: u16, pixel_offset_x: i16, pixel_offset_y: i16) -> CommandInfo {
        CommandInfo {
            data_length: Self::DECLARED_LEN,
            message_count,
            source_address: 0,
            destination_address: 0,
            command_type: CommandType::ImageRequest.into(),
            image_number,
            pixel_offset_x,
            pixel_offset_y,
            total_y: 0,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(Self::MAGIC);
        buf.put_u32_le(self.data_length);
        buf.put_u16_le(self.message_count);
        buf.put_u16_le(self.source_address);
        buf.put_u16_le(self.destination_address);
        buf.put_u8(self.command_type);
        buf.put_u8(0);
        buf.put_u16_le(self.image_number);
        buf.put_i16_le(self.pixel_offset_x);
        buf.put_i16_le(self.pixel_offset_y);
        buf.put_i16_le(self.total_y);
    }

    /// Parses a command payload, validating its embedded magic. Bytes after the fixed block are
    ///  ignored.
    pub fn deser(payload: &[u8]) -> ProtocolResult<CommandInfo> {
        if payload.len() < Self::SERIALIZED_LEN {
            return Err(ProtocolError::TruncatedCommandInfo {
                got: payload.len(),
                required: Self::SERIALIZED_LEN,
            });
        }

        let mut buf = payload;
        let magic = buf.get_u16_le();
        if magic != Self::MAGIC {
            return Err(ProtocolError::BadCommandInfoMagic { expected: Self::MAGIC, found: magic });
        }

        let data_length = buf.get_u32_le();
        let message_count = buf.get_u16_le();
        let source_address = buf.get_u16_le();
        let destination_address = buf.get_u16_le();
        let command_type = buf.get_u8();
        buf.advance(1);

        Ok(CommandInfo {
            data_length,
            message_count,
            source_address,
            destination_address,
            command_type,
            image_number: buf.get_u16_le(),
            pixel_offset_x: buf.get_i16_le(),
            pixel_offset_y: buf.get_i16_le(),
            total_y: buf.get_i16_le(),
        })
    }

    /// Wraps this command in a complete command frame, ready to be written to the wire
    pub fn to_frame(&self) -> BytesMut {
        let mut payload = BytesMut::with_capacity(Self::SERIALIZED_LEN);
        self.ser(&mut payload);

        let mut buf = BytesMut::with_capacity(CommandFrameHeader::SERIALIZED_LEN + payload.len());
        CommandFrameHeader::for_payload(&payload).ser(&mut buf);
        buf.extend_from_slice(&payload);
        buf
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ImageRequest {
    pub image_number: u16,
    pub pixel_offset_x: i16,
    pub pixel_offset_y: i16,
    pub total_y: i16,
}

/// A validated command, tagged by kind
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    ImageRequest(ImageRequest),
    /// well-formed and checksummed, but of a kind this receiver does not know
    Unrecognized {
        command_type: u8,
        info: CommandInfo,
    },
}

impl From<CommandInfo> for Command {
    fn from(info: CommandInfo) -> Command {
        match CommandType::try_from(info.command_type) {
            Ok(CommandType::ImageRequest) => Command::ImageRequest(ImageRequest {
                image_number: info.image_number,
                pixel_offset_x: info.pixel_offset_x,
                pixel_offset_y: info.pixel_offset_y,
                total_y: info.total_y,
            }),
            Err(_) => Command::Unrecognized {
                command_type: info.command_type,
                info,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[test]
    fn test_command_frame_layout() {
        let info = CommandInfo {
            data_length: 18,
            message_count: 1,
            source_address: 100,
            destination_address: 200,
            command_type: 0x01,
            image_number: 12345,
            pixel_offset_x: 50,
            pixel_offset_y: -100,
            total_y: 0,
        };

        let frame = info.to_frame();
        assert_eq!(frame.len(), 21 + 22);

        assert_eq!(&frame[0..2], &[0xe9, 0x9e]);
        assert!(frame[2..18].iter().all(|&b| b == 0));
        assert_eq!(&frame[18..20], &[22, 0]);
        assert_eq!(frame[20], checksum(&frame[21..]));

        assert_eq!(&frame[21..], &[
            0xaa, 0x55,
            18, 0, 0, 0,
            1, 0,
            100, 0,
            200, 0,
            0x01,
            0,
            0x39, 0x30,
            50, 0,
            0x9c, 0xff,
            0, 0,
        ]);
    }

    #[test]
    fn test_peek() {
        let frame = CommandInfo::image_request(1, 2, 3, 4).to_frame();

        assert_eq!(CommandFrameHeader::peek(&frame[..20]), None);

        let header = CommandFrameHeader::peek(&frame).unwrap();
        assert!(header.has_valid_magic());
        assert_eq!(header.payload_length, 22);
        assert_eq!(header.frame_len(), 43);
    }

    #[test]
    fn test_peek_does_not_judge_magic() {
        let raw = [0x12u8; 21];
        let header = CommandFrameHeader::peek(&raw).unwrap();
        assert!(!header.has_valid_magic());
        assert_eq!(header.magic, 0x1212);
    }

    #[test]
    fn test_command_info_deser() {
        let info = CommandInfo::image_request(7, 99, -5, 17);
        let frame = info.to_frame();
        assert_eq!(CommandInfo::deser(&frame[21..]).unwrap(), info);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::one_short(vec![0xaa; 21])]
    fn test_command_info_deser_truncated(#[case] payload: Vec<u8>) {
        assert!(matches!(CommandInfo::deser(&payload), Err(ProtocolError::TruncatedCommandInfo { .. })));
    }

    #[test]
    fn test_command_info_deser_bad_magic() {
        let mut payload = BytesMut::new();
        CommandInfo::image_request(1, 1, 1, 1).ser(&mut payload);
        payload[1] = 0x56;

        match CommandInfo::deser(&payload) {
            Err(ProtocolError::BadCommandInfoMagic { found, .. }) => assert_eq!(found, 0x56aa),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[rstest]
    #[case::image_request(0x01, Command::ImageRequest(ImageRequest { image_number: 3, pixel_offset_x: 4, pixel_offset_y: 5, total_y: 6 }))]
    #[case::unknown(0x7f, Command::Unrecognized { command_type: 0x7f, info: CommandInfo { data_length: 18, message_count: 2, source_address: 0, destination_address: 0, command_type: 0x7f, image_number: 3, pixel_offset_x: 4, pixel_offset_y: 5, total_y: 6 } })]
    fn test_command_from_info(#[case] command_type: u8, #[case] expected: Command) {
        let info = CommandInfo {
            data_length: 18,
            message_count: 2,
            source_address: 0,
            destination_address: 0,
            command_type,
            image_number: 3,
            pixel_offset_x: 4,
            pixel_offset_y: 5,
            total_y: 6,
        };
        assert_eq!(Command::from(info), expected);
    }
}
