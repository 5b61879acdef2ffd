use bytes::{Bytes, BytesMut};

use crate::packaging::packetizer::Packetizer;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::frame::Frame;
use crate::protocol::image_info::{ImageInfo, ImagePoint, MessageType};
use crate::protocol::quantization::GeoPoint;
use crate::util::safe_converter::PrecheckedCast;

/// A message ready for packetizing: the info block and the body that follows it.
///
/// For plain SAR / ISAR images the body is just the encoded image. GMTI messages carry the raw
///  GMTI data followed by the rendered image, and only the image part counts towards the image
///  size announced in the frame headers.
#[derive(Debug, Clone)]
pub struct ImageMessage {
    pub info: ImageInfo,
    pub body: Bytes,
    image_len: usize,
}

impl ImageMessage {
    /// `info.data_length` is overwritten to match the body
    pub fn new(mut info: ImageInfo, image: Bytes) -> ImageMessage {
        info.data_length = (ImageInfo::SERIALIZED_LEN + image.len()).prechecked_cast();
        ImageMessage {
            info,
            image_len: image.len(),
            body: image,
        }
    }

    pub fn gmti(image_number: u16, corners: &GmtiCorners, gmti_data: &[u8], image: &[u8]) -> ImageMessage {
        let mut body = BytesMut::with_capacity(gmti_data.len() + image.len());
        body.extend_from_slice(gmti_data);
        body.extend_from_slice(image);

        let mut info = ImageInfo::new(MessageType::Gmti, image_number, body.len());
        info.message_addr = 0;
        corners.apply_to(&mut info);

        ImageMessage {
            info,
            body: body.freeze(),
            image_len: image.len(),
        }
    }

    pub fn image_number(&self) -> u16 {
        self.info.message_count
    }

    /// size of the image part of the body, as announced in every frame header
    pub fn image_len(&self) -> usize {
        self.image_len
    }

    pub fn encoded_len(&self) -> usize {
        ImageInfo::SERIALIZED_LEN + self.body.len()
    }

    /// The complete message: info block (with checksum) followed by the body
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.info.ser(&mut buf);
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }

    pub fn packetize(&self, packetizer: &Packetizer) -> ProtocolResult<Vec<Frame>> {
        let image_len: u32 = self.image_len.try_into()
            .map_err(|_| ProtocolError::MessageTooLarge {
                len: self.encoded_len(),
                max_frames: u16::MAX as usize,
            })?;
        packetizer.packetize(&self.encode(), self.image_number(), image_len)
    }
}

/// Corner coordinates of a GMTI image as delivered in its `key=value` companion text file:
///  `B<n>` is the latitude and `L<n>` the longitude of corner `n`, with corner 0 top left,
///  1 bottom right, 2 top right and 3 bottom left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GmtiCorners {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
    pub top_right: GeoPoint,
    pub bottom_left: GeoPoint,
}

impl GmtiCorners {
    pub fn parse(text: &str) -> anyhow::Result<GmtiCorners> {
        let mut values = rustc_hash::FxHashMap::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            match value.trim().parse::<f64>() {
                Ok(v) => { values.insert(key.to_string(), v); }
                Err(_) => tracing::warn!("could not parse value for key {} - skipping", key),
            }
        }

        let corner = |n: u8| -> anyhow::Result<GeoPoint> {
            let lat_key = format!("B{}", n);
            let lng_key = format!("L{}", n);
            let Some(&lat) = values.get(&lat_key) else {
                anyhow::bail!("missing required key {}", lat_key);
            };
            let Some(&lng) = values.get(&lng_key) else {
                anyhow::bail!("missing required key {}", lng_key);
            };
            Ok(GeoPoint::new(lat, lng))
        };

        Ok(GmtiCorners {
            top_left: corner(0)?,
            bottom_right: corner(1)?,
            top_right: corner(2)?,
            bottom_left: corner(3)?,
        })
    }

    fn apply_to(&self, info: &mut ImageInfo) {
        info.set_point(ImagePoint::TopLeft, self.top_left);
        info.set_point(ImagePoint::BottomRight, self.bottom_right);
        info.set_point(ImagePoint::TopRight, self.top_right);
        info.set_point(ImagePoint::BottomLeft, self.bottom_left);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::protocol::quantization::quantize_coordinate;
    use super::*;

    #[test]
    fn test_image_message_encode() {
        let msg = ImageMessage::new(ImageInfo::new(MessageType::Image, 9, 0), Bytes::from_static(b"jpeg"));
        assert_eq!(msg.info.data_length, 174);
        assert_eq!(msg.image_len(), 4);

        let encoded = msg.encode();
        assert_eq!(encoded.len(), 174);
        assert_eq!(&encoded[170..], b"jpeg");
        assert_eq!(ImageInfo::deser(&encoded).unwrap(), msg.info);
    }

    #[test]
    fn test_image_message_packetize_announces_image_len() {
        let image = Bytes::from(vec![3u8; 5000]);
        let msg = ImageMessage::new(ImageInfo::new(MessageType::Image, 77, 0), image);

        let frames = msg.packetize(&Packetizer::default()).unwrap();
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame.header.image_number, 77);
            assert_eq!(frame.header.image_size, 5000);
        }
    }

    #[test]
    fn test_gmti_message() {
        let corners = GmtiCorners {
            top_left: GeoPoint::new(30.0, 120.0),
            bottom_right: GeoPoint::new(29.0, 121.0),
            top_right: GeoPoint::new(30.0, 121.0),
            bottom_left: GeoPoint::new(29.0, 120.0),
        };
        let msg = ImageMessage::gmti(5, &corners, b"bin-data", b"png");

        assert_eq!(msg.info.message_type, 0x0003);
        assert_eq!(msg.info.message_count, 5);
        assert_eq!(msg.info.data_length, 170 + 11);
        assert_eq!(msg.image_len(), 3);
        assert_eq!(msg.body.as_ref(), b"bin-datapng");
        assert_eq!(msg.info.point(ImagePoint::BottomRight).lng, quantize_coordinate(121.0));
        assert_eq!(msg.info.point(ImagePoint::BottomLeft).lat, quantize_coordinate(29.0));
        assert_eq!(msg.info.point(ImagePoint::Center).lat, 0);
    }

    #[test]
    fn test_parse_gmti_corners() {
        let text = "B0=30.5\nL0 = 120.25\nB1=29.5\nL1=121.75\nB2=30.5\nL2=121.75\nB3=29.5\nL3=120.25\ncomment line\nX=abc\n";
        let corners = GmtiCorners::parse(text).unwrap();
        assert_eq!(corners.top_left, GeoPoint::new(30.5, 120.25));
        assert_eq!(corners.bottom_right, GeoPoint::new(29.5, 121.75));
        assert_eq!(corners.top_right, GeoPoint::new(30.5, 121.75));
        assert_eq!(corners.bottom_left, GeoPoint::new(29.5, 120.25));
    }

    #[rstest]
    #[case::empty("")]
    #[case::missing_lng("B0=1\nB1=1\nL1=1\nB2=1\nL2=1\nB3=1\nL3=1")]
    #[case::unparseable("B0=1\nL0=x\nB1=1\nL1=1\nB2=1\nL2=1\nB3=1\nL3=1")]
    fn test_parse_gmti_corners_incomplete(#[case] text: &str) {
        assert!(GmtiCorners::parse(text).is_err());
    }
}
