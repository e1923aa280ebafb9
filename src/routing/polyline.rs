//! Decoder for the encoded polyline format used by the directions provider
//! for step geometry (precision 1e-5).

use crate::geo::Coord;

const PRECISION: f64 = 1e5;

/// Decodes an encoded polyline. Returns `None` if the input is truncated,
/// contains characters outside the encoding alphabet, or accumulates past the
/// coordinate range.
pub fn decode(encoded: &str) -> Option<Vec<Coord>> {
    let mut coords = Vec::new();
    let mut bytes = encoded.bytes();
    let (mut lat, mut lng) = (0i64, 0i64);

    loop {
        let Some(dlat) = next_value(&mut bytes) else {
            break;
        };
        let dlat = dlat?;
        let dlng = next_value(&mut bytes)??;
        lat = lat.checked_add(dlat)?;
        lng = lng.checked_add(dlng)?;
        coords.push(Coord::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Some(coords)
}

/// Reads one zig-zag varint.
///
/// Outer `None` means the input ended cleanly before the value started, inner
/// `None` means the value is malformed.
fn next_value(bytes: &mut impl Iterator<Item = u8>) -> Option<Option<i64>> {
    let mut result: i64 = 0;
    let mut shift = 0;
    let mut started = false;

    loop {
        let Some(byte) = bytes.next() else {
            return if started { Some(None) } else { None };
        };
        started = true;
        if !(63..=126).contains(&byte) || shift > 60 {
            return Some(None);
        }
        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Some(Some(value))
}
