//! Fixed-point encoding of physical quantities as used in the image info and GMTI blocks.
//!
//! Every quantity has a documented quantum (the value of one LSB). Encoding divides by the
//!  quantum and rounds to the nearest integer; values outside the integer type's range saturate
//!  rather than wrap.

/// attitude angles (roll / heading / pitch), degrees per LSB
pub const ANGLE_QUANTUM_DEG: f64 = 5.49334e-3;

/// longitudes and latitudes, degrees per LSB
pub const COORDINATE_QUANTUM_DEG: f64 = 8.38191e-8;

/// navigation altitude per LSB
pub const ALTITUDE_QUANTUM: f64 = 9.3133e-6;

/// pixel gap distance, meters per LSB
pub const PIXEL_GAP_QUANTUM_M: f64 = 0.01;

// NB: float-to-int `as` casts saturate at the target type's bounds (and map NaN to 0), which is
//  exactly the behavior we want for out-of-range inputs

pub fn quantize_angle(degrees: f64) -> i16 {
    (degrees / ANGLE_QUANTUM_DEG).round() as i16
}

/// decode side, for inspecting received info blocks
pub fn dequantize_angle(raw: i16) -> f64 {
    raw as f64 * ANGLE_QUANTUM_DEG
}

pub fn quantize_coordinate(degrees: f64) -> i32 {
    (degrees / COORDINATE_QUANTUM_DEG).round() as i32
}

/// decode side, for inspecting received info blocks
pub fn dequantize_coordinate(raw: i32) -> f64 {
    raw as f64 * COORDINATE_QUANTUM_DEG
}

pub fn quantize_altitude(altitude: f64) -> i16 {
    (altitude / ALTITUDE_QUANTUM).round() as i16
}

/// decode side, for inspecting received info blocks
pub fn dequantize_altitude(raw: i16) -> f64 {
    raw as f64 * ALTITUDE_QUANTUM
}

pub fn quantize_pixel_gap(meters: f64) -> u8 {
    (meters / PIXEL_GAP_QUANTUM_M).round() as u8
}

/// decode side, for inspecting received info blocks
pub fn dequantize_pixel_gap(raw: u8) -> f64 {
    raw as f64 * PIXEL_GAP_QUANTUM_M
}

/// A geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}
impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    pub fn quantized(&self) -> QuantizedGeoPoint {
        QuantizedGeoPoint {
            lat: quantize_coordinate(self.lat),
            lng: quantize_coordinate(self.lng),
        }
    }
}

/// A geographic point as it goes over the wire
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct QuantizedGeoPoint {
    pub lat: i32,
    pub lng: i32,
}
impl QuantizedGeoPoint {
    /// decode side, for inspecting received info blocks
    pub fn to_degrees(&self) -> GeoPoint {
        GeoPoint {
            lat: dequantize_coordinate(self.lat),
            lng: dequantize_coordinate(self.lng),
        }
    }
}
