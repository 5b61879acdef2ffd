/// The single-byte checksum used throughout the protocol: the sum of all bytes, modulo 256.
///
/// Callers slice the covered range themselves. The checksum field itself is never part of that
///  range, and for the image info block neither is the leading 2-byte magic.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}
