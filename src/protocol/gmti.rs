use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::quantization::QuantizedGeoPoint;

/// A moving target detected by GMTI processing (17 bytes on the wire)
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct GmtiTarget {
    pub id: u8,
    pub position: QuantizedGeoPoint,
    pub pixel_offset_x: i16,
    pub pixel_offset_y: i16,
    pub radial_velocity: i16,
    pub heading: i16,
}
impl GmtiTarget {
    pub const SERIALIZED_LEN: usize = 17;

    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id);
        buf.put_i32_le(self.position.lng);
        buf.put_i32_le(self.position.lat);
        buf.put_i16_le(self.pixel_offset_x);
        buf.put_i16_le(self.pixel_offset_y);
        buf.put_i16_le(self.radial_velocity);
        buf.put_i16_le(self.heading);
    }

    fn deser(buf: &mut impl Buf) -> GmtiTarget {
        let id = buf.get_u8();
        let lng = buf.get_i32_le();
        let lat = buf.get_i32_le();
        GmtiTarget {
            id,
            position: QuantizedGeoPoint { lat, lng },
            pixel_offset_x: buf.get_i16_le(),
            pixel_offset_y: buf.get_i16_le(),
            radial_velocity: buf.get_i16_le(),
            heading: buf.get_i16_le(),
        }
    }
}

/// The GMTI information block: a target count, a fixed-capacity target table, the IMU time of
///  week and the number of the underlying image. Unused target slots and the trailing reserved
///  bytes are zero.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct GmtiInfo {
    pub targets: Vec<GmtiTarget>,
    pub imu_time: u32,
    pub image_number: u16,
}

impl GmtiInfo {
    pub const MAX_TARGETS: usize = 40;
    pub const SERIALIZED_LEN: usize = 1 + Self::MAX_TARGETS * GmtiTarget::SERIALIZED_LEN + 4 + 2 + Self::RESERVED_LEN;

    const RESERVED_LEN: usize = 68;

    pub fn ser(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        if self.targets.len() > Self::MAX_TARGETS {
            return Err(ProtocolError::TooManyTargets {
                got: self.targets.len(),
                max: Self::MAX_TARGETS,
            });
        }

        buf.reserve(Self::SERIALIZED_LEN);
        buf.put_u8(self.targets.len() as u8);
        for target in &self.targets {
            target.ser(buf);
        }
        buf.put_bytes(0, (Self::MAX_TARGETS - self.targets.len()) * GmtiTarget::SERIALIZED_LEN);
        buf.put_u32_le(self.imu_time);
        buf.put_u16_le(self.image_number);
        buf.put_bytes(0, Self::RESERVED_LEN);
        Ok(())
    }

    pub fn deser(buf: &mut impl Buf) -> ProtocolResult<GmtiInfo> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(ProtocolError::MessageTooShort {
                len: buf.remaining(),
                required: Self::SERIALIZED_LEN,
            });
        }

        let target_count = (buf.get_u8() as usize).min(Self::MAX_TARGETS);
        let mut targets = Vec::with_capacity(target_count);
        for slot in 0..Self::MAX_TARGETS {
            if slot < target_count {
                targets.push(GmtiTarget::deser(buf));
            }
            else {
                buf.advance(GmtiTarget::SERIALIZED_LEN);
            }
        }

        let imu_time = buf.get_u32_le();
        let image_number = buf.get_u16_le();
        buf.advance(Self::RESERVED_LEN);

        Ok(GmtiInfo {
            targets,
            imu_time,
            image_number,
        })
    }
}
