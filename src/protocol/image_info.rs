use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::checksum::checksum;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::quantization::{quantize_altitude, quantize_angle, quantize_pixel_gap, GeoPoint, QuantizedGeoPoint};
use crate::util::safe_converter::PrecheckedCast;

/// Kind of payload carried after the info block
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u16)]
pub enum MessageType {
    Image = 0x0001,
    Gmti = 0x0003,
}

/// The five reference points of an image, in wire order
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ImagePoint {
    TopLeft = 0,
    BottomLeft = 1,
    BottomRight = 2,
    TopRight = 3,
    Center = 4,
}
impl ImagePoint {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ImagingTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    /// NB: the wire format has a single byte for this
    pub millis: u8,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(u8)]
pub enum SideLook {
    #[default]
    Left = 0x00,
    Right = 0x01,
}

/// Header fields for an image message in physical units, as supplied by the telemetry
///  collaborator. Angles and coordinates are in degrees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageTelemetry {
    pub image_rows: u16,
    pub image_cols: u16,
    pub roll_deg: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub nav_position: GeoPoint,
    pub nav_altitude: f64,
    pub top_left: GeoPoint,
    pub bottom_left: GeoPoint,
    pub bottom_right: GeoPoint,
    pub top_right: GeoPoint,
    pub center: GeoPoint,
    pub pixel_gap_m: f64,
    pub imaging_time: ImagingTime,
    pub side_look: SideLook,
}

/// The fixed-size block at the start of every image message. Values are stored quantized, i.e.
///  exactly as they go over the wire. All numbers are little endian.
///
/// ```ascii
///   0: frame header 0x55AA (u16)
///   2: message length (u32) = 170 + length of the body following the block
///   6: message address, message type, message count, source address, destination
///      address (u16 each)
///  16: command type, command count (u8 each)
///  18: image rows, image columns, image available flag (u16 each)
///  24: roll, heading, pitch (i16 each)
///  30: navigation longitude, latitude (i32 each)
///  38: navigation altitude, north / up / east velocity (i16 each)
///  46: imaging time h / m / s / ms (u8 each)
///  50: reserved (48 bytes)
///  98: relative altitude of top-left, bottom-left, bottom-right, top-right, center (i16 each)
/// 108: longitude of the same five points (i32 each)
/// 128: latitude of the same five points (i32 each)
/// 148: slant range of the same five points (u16 each)
/// 158: reserved (u8)
/// 159: pixel gap (u8)
/// 160: depression angle, squint angle (u16 each)
/// 164: side-look direction (u8)
/// 165: reserved (4 bytes)
/// 169: checksum over bytes 2..169
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageInfo {
    pub data_length: u32,
    pub message_addr: u16,
    pub message_type: u16,
    pub message_count: u16,
    pub source_addr: u16,
    pub dest_addr: u16,
    pub cmd_type: u8,
    pub cmd_count: u8,
    pub image_rows: u16,
    pub image_cols: u16,
    pub image_available_flag: u16,
    pub roll: i16,
    pub heading: i16,
    pub pitch: i16,
    pub nav_position: QuantizedGeoPoint,
    pub nav_altitude: i16,
    pub north_velocity: i16,
    pub up_velocity: i16,
    pub east_velocity: i16,
    pub imaging_time: ImagingTime,
    pub point_altitudes: [i16; ImagePoint::COUNT],
    pub point_positions: [QuantizedGeoPoint; ImagePoint::COUNT],
    pub point_slant_ranges: [u16; ImagePoint::COUNT],
    pub pixel_gap: u8,
    pub depression_angle: u16,
    pub squint_angle: u16,
    pub side_look: u8,
}

impl ImageInfo {
    pub const MAGIC: u16 = 0x55AA;
    pub const SERIALIZED_LEN: usize = 170;
    pub const IMAGE_AVAILABLE: u16 = 0xFFFF;

    const CHECKSUM_OFFSET: usize = Self::SERIALIZED_LEN - 1;
    const RESERVED_NAV_LEN: usize = 48;
    const RESERVED_TAIL_LEN: usize = 4;

    /// An info block with only the fixed fields populated - this is what ISAR images without
    ///  telemetry are sent with
    pub fn new(message_type: MessageType, image_number: u16, body_len: usize) -> ImageInfo {
        ImageInfo {
            data_length: (Self::SERIALIZED_LEN + body_len).prechecked_cast(),
            message_addr: 0x0001,
            message_type: message_type as u16,
            message_count: image_number,
            source_addr: 0,
            dest_addr: 0,
            cmd_type: 0,
            cmd_count: 0,
            image_rows: 0,
            image_cols: 0,
            image_available_flag: Self::IMAGE_AVAILABLE,
            roll: 0,
            heading: 0,
            pitch: 0,
            nav_position: QuantizedGeoPoint::default(),
            nav_altitude: 0,
            north_velocity: 0,
            up_velocity: 0,
            east_velocity: 0,
            imaging_time: ImagingTime::default(),
            point_altitudes: [0; ImagePoint::COUNT],
            point_positions: [QuantizedGeoPoint::default(); ImagePoint::COUNT],
            point_slant_ranges: [0; ImagePoint::COUNT],
            pixel_gap: 0,
            depression_angle: 0,
            squint_angle: 0,
            side_look: SideLook::Left as u8,
        }
    }

    pub fn from_telemetry(telemetry: &ImageTelemetry, image_number: u16, image_len: usize) -> ImageInfo {
        let mut result = Self::new(MessageType::Image, image_number, image_len);

        result.image_rows = telemetry.image_rows;
        result.image_cols = telemetry.image_cols;
        result.roll = quantize_angle(telemetry.roll_deg);
        result.heading = quantize_angle(telemetry.heading_deg);
        result.pitch = quantize_angle(telemetry.pitch_deg);
        result.nav_position = telemetry.nav_position.quantized();
        result.nav_altitude = quantize_altitude(telemetry.nav_altitude);
        result.imaging_time = telemetry.imaging_time;

        result.set_point(ImagePoint::TopLeft, telemetry.top_left);
        result.set_point(ImagePoint::BottomLeft, telemetry.bottom_left);
        result.set_point(ImagePoint::BottomRight, telemetry.bottom_right);
        result.set_point(ImagePoint::TopRight, telemetry.top_right);
        result.set_point(ImagePoint::Center, telemetry.center);

        result.pixel_gap = quantize_pixel_gap(telemetry.pixel_gap_m);
        result.side_look = telemetry.side_look as u8;
        result
    }

    pub fn set_point(&mut self, point: ImagePoint, position: GeoPoint) {
        self.point_positions[point.index()] = position.quantized();
    }

    pub fn point(&self, point: ImagePoint) -> QuantizedGeoPoint {
        self.point_positions[point.index()]
    }

    /// length of the body following the info block, as declared in the block
    pub fn declared_body_len(&self) -> usize {
        (self.data_length as usize).saturating_sub(Self::SERIALIZED_LEN)
    }

    /// Serializes the block, calculating and appending the checksum
    pub fn ser(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.reserve(Self::SERIALIZED_LEN);

        buf.put_u16_le(Self::MAGIC);
        buf.put_u32_le(self.data_length);
        buf.put_u16_le(self.message_addr);
        buf.put_u16_le(self.message_type);
        buf.put_u16_le(self.message_count);
        buf.put_u16_le(self.source_addr);
        buf.put_u16_le(self.dest_addr);
        buf.put_u8(self.cmd_type);
        buf.put_u8(self.cmd_count);
        buf.put_u16_le(self.image_rows);
        buf.put_u16_le(self.image_cols);
        buf.put_u16_le(self.image_available_flag);

        buf.put_i16_le(self.roll);
        buf.put_i16_le(self.heading);
        buf.put_i16_le(self.pitch);
        buf.put_i32_le(self.nav_position.lng);
        buf.put_i32_le(self.nav_position.lat);
        buf.put_i16_le(self.nav_altitude);
        buf.put_i16_le(self.north_velocity);
        buf.put_i16_le(self.up_velocity);
        buf.put_i16_le(self.east_velocity);
        buf.put_u8(self.imaging_time.hours);
        buf.put_u8(self.imaging_time.minutes);
        buf.put_u8(self.imaging_time.seconds);
        buf.put_u8(self.imaging_time.millis);
        buf.put_bytes(0, Self::RESERVED_NAV_LEN);

        for alt in self.point_altitudes {
            buf.put_i16_le(alt);
        }
        for p in self.point_positions {
            buf.put_i32_le(p.lng);
        }
        for p in self.point_positions {
            buf.put_i32_le(p.lat);
        }
        for range in self.point_slant_ranges {
            buf.put_u16_le(range);
        }
        buf.put_u8(0);
        buf.put_u8(self.pixel_gap);
        buf.put_u16_le(self.depression_angle);
        buf.put_u16_le(self.squint_angle);
        buf.put_u8(self.side_look);
        buf.put_bytes(0, Self::RESERVED_TAIL_LEN);

        let block_checksum = Self::calc_checksum(&buf[start..]);
        buf.put_u8(block_checksum);

        debug_assert_eq!(buf.len() - start, Self::SERIALIZED_LEN);
    }

    /// checksum over everything after the magic and before the checksum byte itself
    fn calc_checksum(block: &[u8]) -> u8 {
        checksum(&block[std::mem::size_of::<u16>()..Self::CHECKSUM_OFFSET])
    }

    /// Parses and validates the info block at the start of a reassembled message. Trailing bytes
    ///  (i.e. the message body) are ignored.
    pub fn deser(message: &[u8]) -> ProtocolResult<ImageInfo> {
        if message.len() < Self::SERIALIZED_LEN {
            return Err(ProtocolError::MessageTooShort {
                len: message.len(),
                required: Self::SERIALIZED_LEN,
            });
        }
        let block = &message[..Self::SERIALIZED_LEN];

        let expected = block[Self::CHECKSUM_OFFSET];
        let actual = Self::calc_checksum(block);
        if expected != actual {
            return Err(ProtocolError::InfoChecksumMismatch { expected, actual });
        }

        let mut buf = block;
        let magic = buf.get_u16_le();
        if magic != Self::MAGIC {
            return Err(ProtocolError::BadInfoMagic { expected: Self::MAGIC, found: magic });
        }

        let data_length = buf.get_u32_le();
        let message_addr = buf.get_u16_le();
        let message_type = buf.get_u16_le();
        let message_count = buf.get_u16_le();
        let source_addr = buf.get_u16_le();
        let dest_addr = buf.get_u16_le();
        let cmd_type = buf.get_u8();
        let cmd_count = buf.get_u8();
        let image_rows = buf.get_u16_le();
        let image_cols = buf.get_u16_le();
        let image_available_flag = buf.get_u16_le();
        let roll = buf.get_i16_le();
        let heading = buf.get_i16_le();
        let pitch = buf.get_i16_le();
        let nav_lng = buf.get_i32_le();
        let nav_lat = buf.get_i32_le();
        let nav_altitude = buf.get_i16_le();
        let north_velocity = buf.get_i16_le();
        let up_velocity = buf.get_i16_le();
        let east_velocity = buf.get_i16_le();
        let imaging_time = ImagingTime {
            hours: buf.get_u8(),
            minutes: buf.get_u8(),
            seconds: buf.get_u8(),
            millis: buf.get_u8(),
        };
        buf.advance(Self::RESERVED_NAV_LEN);

        let mut point_altitudes = [0i16; ImagePoint::COUNT];
        for alt in point_altitudes.iter_mut() {
            *alt = buf.get_i16_le();
        }
        let mut point_positions = [QuantizedGeoPoint::default(); ImagePoint::COUNT];
        for p in point_positions.iter_mut() {
            p.lng = buf.get_i32_le();
        }
        for p in point_positions.iter_mut() {
            p.lat = buf.get_i32_le();
        }
        let mut point_slant_ranges = [0u16; ImagePoint::COUNT];
        for range in point_slant_ranges.iter_mut() {
            *range = buf.get_u16_le();
        }
        buf.advance(1);
        let pixel_gap = buf.get_u8();
        let depression_angle = buf.get_u16_le();
        let squint_angle = buf.get_u16_le();
        let side_look = buf.get_u8();

        Ok(ImageInfo {
            data_length,
            message_addr,
            message_type,
            message_count,
            source_addr,
            dest_addr,
            cmd_type,
            cmd_count,
            image_rows,
            image_cols,
            image_available_flag,
            roll,
            heading,
            pitch,
            nav_position: QuantizedGeoPoint { lat: nav_lat, lng: nav_lng },
            nav_altitude,
            north_velocity,
            up_velocity,
            east_velocity,
            imaging_time,
            point_altitudes,
            point_positions,
            point_slant_ranges,
            pixel_gap,
            depression_angle,
            squint_angle,
            side_look,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn sample_telemetry() -> ImageTelemetry {
        ImageTelemetry {
            image_rows: 2048,
            image_cols: 1024,
            roll_deg: 1.5,
            heading_deg: -45.25,
            pitch_deg: 0.75,
            nav_position: GeoPoint::new(34.25, 108.5),
            nav_altitude: 0.25,
            top_left: GeoPoint::new(34.3, 108.4),
            bottom_left: GeoPoint::new(34.2, 108.4),
            bottom_right: GeoPoint::new(34.2, 108.6),
            top_right: GeoPoint::new(34.3, 108.6),
            center: GeoPoint::new(34.25, 108.5),
            pixel_gap_m: 0.3,
            imaging_time: ImagingTime { hours: 13, minutes: 7, seconds: 59, millis: 120 },
            side_look: SideLook::Right,
        }
    }

    #[test]
    fn test_ser_layout() {
        let info = ImageInfo::from_telemetry(&sample_telemetry(), 9, 10_000);

        let mut buf = BytesMut::new();
        info.ser(&mut buf);
        assert_eq!(buf.len(), ImageInfo::SERIALIZED_LEN);

        assert_eq!(&buf[0..2], &[0xaa, 0x55]);
        assert_eq!(&buf[2..6], &10_170u32.to_le_bytes());
        assert_eq!(&buf[6..8], &1u16.to_le_bytes());
        assert_eq!(&buf[8..10], &1u16.to_le_bytes());
        assert_eq!(&buf[10..12], &9u16.to_le_bytes());
        assert_eq!(&buf[18..20], &2048u16.to_le_bytes());
        assert_eq!(&buf[20..22], &1024u16.to_le_bytes());
        assert_eq!(&buf[22..24], &[0xff, 0xff]);
        assert_eq!(&buf[24..26], &quantize_angle(1.5).to_le_bytes());
        assert_eq!(&buf[30..34], &GeoPoint::new(34.25, 108.5).quantized().lng.to_le_bytes());
        assert_eq!(&buf[34..38], &GeoPoint::new(34.25, 108.5).quantized().lat.to_le_bytes());
        assert_eq!(&buf[46..50], &[13, 7, 59, 120]);
        assert!(buf[50..98].iter().all(|&b| b == 0));
        assert_eq!(&buf[108..112], &GeoPoint::new(34.3, 108.4).quantized().lng.to_le_bytes());
        assert_eq!(&buf[116..120], &GeoPoint::new(34.2, 108.6).quantized().lng.to_le_bytes());
        assert_eq!(&buf[128..132], &GeoPoint::new(34.3, 108.4).quantized().lat.to_le_bytes());
        assert_eq!(&buf[144..148], &GeoPoint::new(34.25, 108.5).quantized().lat.to_le_bytes());
        assert_eq!(buf[159], 30);
        assert_eq!(buf[164], 0x01);
        assert_eq!(buf[169], checksum(&buf[2..169]));
    }

    #[test]
    fn test_deser_restores_fields() {
        let info = ImageInfo::from_telemetry(&sample_telemetry(), 321, 77);
        let mut buf = BytesMut::new();
        info.ser(&mut buf);
        buf.extend_from_slice(b"image body");

        let parsed = ImageInfo::deser(&buf).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.declared_body_len(), 77);
        assert_eq!(parsed.point(ImagePoint::BottomRight), GeoPoint::new(34.2, 108.6).quantized());
    }

    #[test]
    fn test_checksum_excludes_magic() {
        let info = ImageInfo::new(MessageType::Image, 1, 0);
        let mut buf = BytesMut::new();
        info.ser(&mut buf);

        // the magic is not covered by the checksum, so corrupting it surfaces as a magic error
        buf[0] = 0x00;
        match ImageInfo::deser(&buf) {
            Err(ProtocolError::BadInfoMagic { found, .. }) => assert_eq!(found, 0x5500),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[rstest]
    #[case::length(3)]
    #[case::rows(19)]
    #[case::nav_lat(35)]
    #[case::center_lat(147)]
    #[case::reserved(166)]
    #[case::checksum_itself(169)]
    fn test_deser_checksum_mismatch(#[case] corrupted_offset: usize) {
        let info = ImageInfo::from_telemetry(&sample_telemetry(), 1, 0);
        let mut buf = BytesMut::new();
        info.ser(&mut buf);
        buf[corrupted_offset] ^= 0x10;

        assert!(matches!(ImageInfo::deser(&buf), Err(ProtocolError::InfoChecksumMismatch { .. })));
    }

    #[test]
    fn test_deser_too_short() {
        let info = ImageInfo::new(MessageType::Gmti, 1, 0);
        let mut buf = BytesMut::new();
        info.ser(&mut buf);

        match ImageInfo::deser(&buf[..169]) {
            Err(ProtocolError::MessageTooShort { len, required }) => {
                assert_eq!(len, 169);
                assert_eq!(required, 170);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
