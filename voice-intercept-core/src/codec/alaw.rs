//! G.711 A-law expansion.
//!
//! Each byte is independent: sign bit, 3-bit segment, 4-bit mantissa, with
//! even bits inverted on the wire (XOR 0x55).

const SIGN_BIT: u8 = 0x80;
const SEGMENT_MASK: u8 = 0x70;
const SEGMENT_SHIFT: u8 = 4;
const MANTISSA_MASK: u8 = 0x0F;
const TOGGLE_MASK: u8 = 0x55;

/// Expand one A-law byte to a linear 16-bit sample.
pub fn decode(byte: u8) -> i16 {
    let a = byte ^ TOGGLE_MASK;
    let mut magnitude = ((a & MANTISSA_MASK) as i16) << 4;
    let segment = (a & SEGMENT_MASK) >> SEGMENT_SHIFT;
    match segment {
        0 => magnitude += 8,
        1 => magnitude += 0x108,
        _ => {
            magnitude += 0x108;
            magnitude <<= segment - 1;
        }
    }
    if a & SIGN_BIT != 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Expand a whole frame.
pub fn decode_frame(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| decode(b)).collect()
}

/// Expand into a caller-provided buffer, appending.
pub fn decode_into(bytes: &[u8], out: &mut Vec<i16>) {
    out.reserve(bytes.len());
    out.extend(bytes.iter().map(|&b| decode(b)));
}
