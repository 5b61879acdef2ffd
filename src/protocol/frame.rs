use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::checksum::checksum;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};

/// The header of a transport frame. All numbers are little endian.
///
/// ```ascii
///  0: fixed value 0x90E9 (u16)
///  2: reserved (6 bytes, zero)
///  8: image number (u16) - shared by all frames of a message, for diagnostics only
/// 10: image size (u32) - size of the image blob inside the message, same in all frames
/// 14: current packet, 1-based (u16)
/// 16: total packets (u16)
/// 18: payload length (u16), at most 4096
/// 20: checksum over the payload (u8)
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameHeader {
    pub image_number: u16,
    pub image_size: u32,
    pub current_index: u16,
    pub total_count: u16,
    pub chunk_length: u16,
    pub checksum: u8,
}

impl FrameHeader {
    pub const MAGIC: u16 = 0x90E9;
    pub const SERIALIZED_LEN: usize = 21;
    pub const MAX_CHUNK_LEN: usize = 4096;

    const RESERVED_LEN: usize = 6;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(Self::MAGIC);
        buf.put_bytes(0, Self::RESERVED_LEN);
        buf.put_u16_le(self.image_number);
        buf.put_u32_le(self.image_size);
        buf.put_u16_le(self.current_index);
        buf.put_u16_le(self.total_count);
        buf.put_u16_le(self.chunk_length);
        buf.put_u8(self.checksum);
    }

    /// Parses a header, checking the magic value and the payload length. Reserved bytes are
    ///  ignored.
    pub fn deser(buf: &mut impl Buf) -> ProtocolResult<FrameHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(ProtocolError::TruncatedHeader {
                got: buf.remaining(),
                expected: Self::SERIALIZED_LEN,
            });
        }

        let magic = buf.get_u16_le();
        if magic != Self::MAGIC {
            return Err(ProtocolError::BadFrameMagic {
                expected: Self::MAGIC,
                found: magic,
            });
        }
        buf.advance(Self::RESERVED_LEN);

        let header = FrameHeader {
            image_number: buf.get_u16_le(),
            image_size: buf.get_u32_le(),
            current_index: buf.get_u16_le(),
            total_count: buf.get_u16_le(),
            chunk_length: buf.get_u16_le(),
            checksum: buf.get_u8(),
        };
        if header.payload_len() > Self::MAX_CHUNK_LEN {
            return Err(ProtocolError::OversizedChunk {
                index: header.current_index,
                len: header.payload_len(),
                max: Self::MAX_CHUNK_LEN,
            });
        }
        Ok(header)
    }

    pub fn payload_len(&self) -> usize {
        self.chunk_length.safe_cast()
    }

    pub fn is_last(&self) -> bool {
        self.current_index >= self.total_count
    }
}

/// A frame header together with its payload chunk
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Wraps a payload chunk, filling in length and checksum.
    ///
    /// NB: the caller is responsible for keeping the chunk within [FrameHeader::MAX_CHUNK_LEN]
    pub fn new(image_number: u16, image_size: u32, current_index: u16, total_count: u16, payload: Bytes) -> Frame {
        Frame {
            header: FrameHeader {
                image_number,
                image_size,
                current_index,
                total_count,
                chunk_length: payload.len().prechecked_cast(),
                checksum: checksum(&payload),
            },
            payload,
        }
    }

    pub fn serialized_len(&self) -> usize {
        FrameHeader::SERIALIZED_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.reserve(self.serialized_len());
        self.header.ser(buf);
        buf.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn verify_checksum(&self) -> ProtocolResult<()> {
        let actual = checksum(&self.payload);
        if actual != self.header.checksum {
            return Err(ProtocolError::FrameChecksumMismatch {
                index: self.header.current_index,
                expected: self.header.checksum,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[test]
    fn test_frame_header_ser() {
        let header = FrameHeader {
            image_number: 0x0102,
            image_size: 0x03040506,
            current_index: 1,
            total_count: 3,
            chunk_length: 4096,
            checksum: 0xab,
        };

        let mut buf = BytesMut::new();
        header.ser(&mut buf);
        assert_eq!(buf.as_ref(), &[
            0xe9, 0x90,
            0, 0, 0, 0, 0, 0,
            0x02, 0x01,
            0x06, 0x05, 0x04, 0x03,
            1, 0,
            3, 0,
            0x00, 0x10,
            0xab,
        ]);
        assert_eq!(buf.len(), FrameHeader::SERIALIZED_LEN);
    }

    #[test]
    fn test_frame_header_deser_ignores_reserved() {
        let raw = [0xe9u8, 0x90, 1, 2, 3, 4, 5, 6, 7, 0, 10, 0, 0, 0, 2, 0, 2, 0, 5, 0, 0x11, 0x99];
        let mut buf = &raw[..];
        let header = FrameHeader::deser(&mut buf).unwrap();
        assert_eq!(header, FrameHeader {
            image_number: 7,
            image_size: 10,
            current_index: 2,
            total_count: 2,
            chunk_length: 5,
            checksum: 0x11,
        });
        assert!(header.is_last());
        assert_eq!(buf, &[0x99]);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::short(vec![0xe9, 0x90, 0, 0])]
    #[case::one_short(vec![0xe9; 20])]
    fn test_frame_header_deser_truncated(#[case] raw: Vec<u8>) {
        match FrameHeader::deser(&mut raw.as_slice()) {
            Err(ProtocolError::TruncatedHeader { got, expected }) => {
                assert_eq!(got, raw.len());
                assert_eq!(expected, 21);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[rstest]
    #[case::swapped_bytes([0x90, 0xe9], 0xe990)]
    #[case::command_magic([0xe9, 0x9e], 0x9ee9)]
    #[case::zero([0, 0], 0)]
    fn test_frame_header_deser_bad_magic(#[case] magic: [u8; 2], #[case] expected_found: u16) {
        let mut raw = vec![0u8; 21];
        raw[..2].copy_from_slice(&magic);
        match FrameHeader::deser(&mut raw.as_slice()) {
            Err(ProtocolError::BadFrameMagic { found, .. }) => assert_eq!(found, expected_found),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[rstest]
    #[case::max(4096, true)]
    #[case::one_over(4097, false)]
    #[case::info_plus_body(5170, false)]
    #[case::u16_max(u16::MAX, false)]
    fn test_frame_header_deser_chunk_length_limit(#[case] chunk_length: u16, #[case] accepted: bool) {
        let header = FrameHeader {
            image_number: 1,
            image_size: 5000,
            current_index: 1,
            total_count: 1,
            chunk_length,
            checksum: 0,
        };
        let mut buf = BytesMut::new();
        header.ser(&mut buf);

        match FrameHeader::deser(&mut buf.as_ref()) {
            Ok(parsed) => {
                assert!(accepted);
                assert_eq!(parsed, header);
            }
            Err(ProtocolError::OversizedChunk { index, len, max }) => {
                assert!(!accepted);
                assert_eq!(index, 1);
                assert_eq!(len, chunk_length as usize);
                assert_eq!(max, 4096);
            }
            Err(e) => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_frame_new_computes_checksum() {
        let frame = Frame::new(5, 100, 1, 1, Bytes::from_static(&[1, 2, 3, 250]));
        assert_eq!(frame.header.chunk_length, 4);
        assert_eq!(frame.header.checksum, 0);
        assert!(frame.verify_checksum().is_ok());

        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), 25);
        assert_eq!(&bytes[21..], &[1, 2, 3, 250]);
    }

    #[test]
    fn test_frame_verify_checksum_mismatch() {
        let mut frame = Frame::new(5, 100, 2, 3, Bytes::from_static(&[1, 2, 3]));
        frame.payload = Bytes::from_static(&[1, 2, 4]);
        match frame.verify_checksum() {
            Err(ProtocolError::FrameChecksumMismatch { index, expected, actual }) => {
                assert_eq!(index, 2);
                assert_eq!(expected, 6);
                assert_eq!(actual, 7);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
