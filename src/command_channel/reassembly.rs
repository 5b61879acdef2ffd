use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::protocol::checksum::checksum;
use crate::protocol::command::{Command, CommandFrameHeader, CommandInfo};

/// How the reassembler recovers when the buffer does not start with a command frame's magic
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ResyncPolicy {
    /// Drop everything buffered so far. This is what the existing receivers do, and it loses
    ///  any complete frames that arrived in the same buffer after the corruption.
    #[default]
    DiscardBuffer,
    /// Skip ahead to the next occurrence of the frame magic and continue parsing from there
    ScanForMagic,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ReassemblyStats {
    pub commands: u64,
    pub unrecognized_commands: u64,
    pub bad_frame_magic: u64,
    pub oversized_frames: u64,
    pub checksum_mismatches: u64,
    pub bad_command_info: u64,
    pub discarded_bytes: u64,
}

/// Recovers command frames from a byte stream that arrives in arbitrary pieces.
///
/// One reassembler belongs to exactly one connection. Bytes are pushed as they arrive, and
///  every push returns the commands that were completed by it, in stream order.
///
/// Corruption is handled differently depending on where it is detected:
/// * a frame header with the wrong magic (or an implausible length) means we lost track of
///   frame boundaries, and we resynchronize according to the [ResyncPolicy]
/// * a checksum mismatch or an invalid command info inside a well-delimited frame drops just
///   that frame, and parsing continues right after it
pub struct StreamReassembler {
    buf: BytesMut,
    policy: ResyncPolicy,
    max_frame_len: usize,
    stats: ReassemblyStats,
}

impl StreamReassembler {
    pub fn new(policy: ResyncPolicy, max_frame_len: usize) -> StreamReassembler {
        StreamReassembler {
            buf: BytesMut::new(),
            policy,
            max_frame_len,
            stats: Default::default(),
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<Command> {
        self.buf.extend_from_slice(data);

        let mut result = Vec::new();
        // every iteration either consumes bytes or stops
        while let Some(header) = CommandFrameHeader::peek(&self.buf) {
            if !header.has_valid_magic() {
                warn!("command frame magic mismatch: expected {:#06x}, found {:#06x}", CommandFrameHeader::MAGIC, header.magic);
                self.stats.bad_frame_magic += 1;
                if !self.resync() {
                    break;
                }
                continue;
            }

            let frame_len = header.frame_len();
            if frame_len > self.max_frame_len {
                warn!("command frame declares {} bytes, maximum is {} - treating the stream as out of sync", frame_len, self.max_frame_len);
                self.stats.oversized_frames += 1;
                if !self.resync() {
                    break;
                }
                continue;
            }

            if self.buf.len() < frame_len {
                trace!("partial command frame: {} of {} bytes", self.buf.len(), frame_len);
                break;
            }

            let frame = self.buf.split_to(frame_len);
            if let Some(command) = self.parse_frame(&header, &frame[CommandFrameHeader::SERIALIZED_LEN..]) {
                result.push(command);
            }
        }
        result
    }

    fn parse_frame(&mut self, header: &CommandFrameHeader, payload: &[u8]) -> Option<Command> {
        let actual = checksum(payload);
        if actual != header.checksum {
            warn!("command frame checksum mismatch: header says {:#04x}, payload sums to {:#04x} - dropping frame", header.checksum, actual);
            self.stats.checksum_mismatches += 1;
            self.stats.discarded_bytes += (CommandFrameHeader::SERIALIZED_LEN + payload.len()) as u64;
            return None;
        }

        let info = match CommandInfo::deser(payload) {
            Ok(info) => info,
            Err(e) => {
                warn!("invalid command info - dropping frame: {}", e);
                self.stats.bad_command_info += 1;
                self.stats.discarded_bytes += (CommandFrameHeader::SERIALIZED_LEN + payload.len()) as u64;
                return None;
            }
        };

        let command = Command::from(info);
        match &command {
            Command::Unrecognized { command_type, .. } => {
                warn!("received command of unknown type {:#04x}", command_type);
                self.stats.unrecognized_commands += 1;
            }
            Command::ImageRequest(request) => {
                debug!("received image request for image {} at ({}, {})", request.image_number, request.pixel_offset_x, request.pixel_offset_y);
            }
        }
        self.stats.commands += 1;
        Some(command)
    }

    /// Returns `true` if parsing can continue on the remaining buffer
    fn resync(&mut self) -> bool {
        match self.policy {
            ResyncPolicy::DiscardBuffer => {
                debug!("discarding {} buffered bytes", self.buf.len());
                self.stats.discarded_bytes += self.buf.len() as u64;
                self.buf.clear();
                false
            }
            ResyncPolicy::ScanForMagic => {
                let magic = CommandFrameHeader::MAGIC.to_le_bytes();
                match self.buf[1..].windows(magic.len()).position(|w| w == magic) {
                    Some(pos) => {
                        let skip = pos + 1;
                        debug!("skipping {} bytes to the next frame magic", skip);
                        self.stats.discarded_bytes += skip as u64;
                        self.buf.advance(skip);
                        true
                    }
                    None => {
                        // the last byte may be the first half of a magic that is still in flight
                        let keep = usize::from(self.buf.last() == Some(&magic[0]));
                        let skip = self.buf.len() - keep;
                        debug!("no frame magic in {} buffered bytes - discarding {}", self.buf.len(), skip);
                        self.stats.discarded_bytes += skip as u64;
                        self.buf.advance(skip);
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::protocol::command::ImageRequest;
    use super::*;

    const MAX_FRAME_LEN: usize = 4096;

    fn frame(image_number: u16) -> Vec<u8> {
        CommandInfo::image_request(1, image_number, 10, -20).to_frame().to_vec()
    }

    fn image_request(image_number: u16) -> Command {
        Command::ImageRequest(ImageRequest {
            image_number,
            pixel_offset_x: 10,
            pixel_offset_y: -20,
            total_y: 0,
        })
    }

    fn with_bad_checksum(image_number: u16) -> Vec<u8> {
        let mut result = frame(image_number);
        result[20] = result[20].wrapping_add(1);
        result
    }

    fn with_bad_inner_magic(image_number: u16) -> Vec<u8> {
        let mut result = frame(image_number);
        result[21] = 0;
        result[20] = checksum(&result[21..]);
        result
    }

    fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_single_frame() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        assert_eq!(reassembler.push(&frame(7)), vec![image_request(7)]);
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().commands, 1);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let data = concat(&[frame(1), frame(2), frame(3)]);
        assert_eq!(reassembler.push(&data), vec![image_request(1), image_request(2), image_request(3)]);
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let data = concat(&[frame(1), frame(2)]);

        assert_eq!(reassembler.push(&data[..60]), vec![image_request(1)]);
        assert_eq!(reassembler.buffered_len(), 60 - 43);
        assert_eq!(reassembler.push(&data[60..]), vec![image_request(2)]);
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().discarded_bytes, 0);
    }

    #[test]
    fn test_bad_magic_discards_entire_buffer() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let mut data = concat(&[frame(1), frame(2), frame(3)]);
        data[0] = 0x00;

        assert!(reassembler.push(&data).is_empty());
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().bad_frame_magic, 1);
        assert_eq!(reassembler.stats().discarded_bytes, 3 * 43);

        // the stream continues normally with the next frame
        assert_eq!(reassembler.push(&frame(4)), vec![image_request(4)]);
    }

    #[rstest]
    #[case::checksum(with_bad_checksum(1))]
    #[case::inner_magic(with_bad_inner_magic(1))]
    fn test_bad_frame_drops_only_its_span(#[case] bad_frame: Vec<u8>) {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let data = concat(&[bad_frame, frame(2), frame(3)]);

        assert_eq!(reassembler.push(&data), vec![image_request(2), image_request(3)]);
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().discarded_bytes, 43);
    }

    #[test]
    fn test_bad_checksum_keeps_following_partial_frame() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let data = concat(&[with_bad_checksum(1), frame(2)]);

        assert!(reassembler.push(&data[..50]).is_empty());
        assert_eq!(reassembler.buffered_len(), 7);
        assert_eq!(reassembler.stats().checksum_mismatches, 1);
        assert_eq!(reassembler.push(&data[50..]), vec![image_request(2)]);
    }

    #[test]
    fn test_byte_at_a_time_matches_bulk() {
        let data = concat(&[
            frame(1),
            with_bad_checksum(2),
            frame(3),
            with_bad_inner_magic(4),
            CommandInfo { command_type: 0x42, ..CommandInfo::image_request(1, 5, 0, 0) }.to_frame().to_vec(),
            frame(6),
        ]);

        let mut bulk = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let bulk_commands = bulk.push(&data);
        assert_eq!(bulk_commands.len(), 4);

        let mut slow = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let slow_commands = data.iter()
            .flat_map(|b| slow.push(&[*b]))
            .collect::<Vec<_>>();

        assert_eq!(slow_commands, bulk_commands);
        assert_eq!(slow.stats(), bulk.stats());
    }

    #[test]
    fn test_unrecognized_command_is_reported() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        let info = CommandInfo { command_type: 0x42, ..CommandInfo::image_request(1, 5, 0, 0) };

        assert_eq!(reassembler.push(&info.to_frame()), vec![Command::Unrecognized { command_type: 0x42, info }]);
        assert_eq!(reassembler.stats().unrecognized_commands, 1);
    }

    #[test]
    fn test_oversized_frame_is_treated_as_desync() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, 100);
        let mut data = frame(1);
        data[18] = 0xff;
        data[19] = 0xff;

        assert!(reassembler.push(&data).is_empty());
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().oversized_frames, 1);
    }

    #[test]
    fn test_scan_for_magic_recovers_following_frames() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::ScanForMagic, MAX_FRAME_LEN);
        let data = concat(&[b"garbage".to_vec(), frame(1), frame(2)]);

        assert_eq!(reassembler.push(&data), vec![image_request(1), image_request(2)]);
        assert_eq!(reassembler.stats().discarded_bytes, 7);
    }

    #[test]
    fn test_scan_for_magic_skips_oversized_frame() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::ScanForMagic, 100);
        let mut oversized = frame(1);
        oversized[18] = 0xff;
        oversized[19] = 0xff;
        let data = concat(&[oversized, frame(2)]);

        assert_eq!(reassembler.push(&data), vec![image_request(2)]);
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.stats().oversized_frames, 1);
        assert_eq!(reassembler.stats().discarded_bytes, 43);
    }

    #[rstest]
    #[case::short_prefix(vec![0x01, 0xe9, 0x02, 0x33, 0x9e], false)]
    #[case::prefix_longer_than_header(vec![0x5a; 30], false)]
    #[case::prefix_ending_in_half_magic(vec![0x11, 0x22, 0xe9], false)]
    #[case::garbage_between_frames(b"garbage".to_vec(), true)]
    fn test_scan_for_magic_byte_at_a_time_matches_bulk(#[case] garbage: Vec<u8>, #[case] after_first_frame: bool) {
        let data = if after_first_frame {
            concat(&[frame(1), garbage.clone(), frame(2), with_bad_checksum(3), frame(4)])
        }
        else {
            concat(&[garbage.clone(), frame(1), frame(2), with_bad_checksum(3), frame(4)])
        };

        let mut bulk = StreamReassembler::new(ResyncPolicy::ScanForMagic, MAX_FRAME_LEN);
        let bulk_commands = bulk.push(&data);
        assert_eq!(bulk_commands, vec![image_request(1), image_request(2), image_request(4)]);

        let mut slow = StreamReassembler::new(ResyncPolicy::ScanForMagic, MAX_FRAME_LEN);
        let slow_commands = data.iter()
            .flat_map(|b| slow.push(&[*b]))
            .collect::<Vec<_>>();

        assert_eq!(slow_commands, bulk_commands);
        assert_eq!(slow.buffered_len(), 0);
        assert_eq!(slow.stats().discarded_bytes, bulk.stats().discarded_bytes);
        assert_eq!(bulk.stats().discarded_bytes, (garbage.len() + 43) as u64);
    }

    #[test]
    fn test_scan_for_magic_keeps_split_magic() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::ScanForMagic, MAX_FRAME_LEN);
        let frame = frame(1);

        let mut first = vec![0x11u8; 30];
        first.push(frame[0]);
        assert!(reassembler.push(&first).is_empty());
        assert_eq!(reassembler.buffered_len(), 1);

        assert_eq!(reassembler.push(&frame[1..]), vec![image_request(1)]);
        assert_eq!(reassembler.stats().discarded_bytes, 30);
    }

    #[test]
    fn test_short_buffer_waits() {
        let mut reassembler = StreamReassembler::new(ResyncPolicy::DiscardBuffer, MAX_FRAME_LEN);
        assert!(reassembler.push(&[0x55; 20]).is_empty());
        assert_eq!(reassembler.buffered_len(), 20);
    }
}
