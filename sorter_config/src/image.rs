//! Persisted outlet-table image.
//!
//! Layout: `[MAGIC, count, (min, max, offset, closed, open) * count]`.
//! A missing or damaged image is not an error: callers fall back to
//! [`default_outlets`].

use crate::OutletRecord;

/// First byte of a valid image.
pub const IMAGE_MAGIC: u8 = 0xA5;
/// Bytes per outlet record.
pub const RECORD_LEN: usize = 5;
pub const MAX_OUTLETS: usize = 16;

/// Documented fallback table: a reject lane followed by five diameter grades.
pub fn default_outlets() -> Vec<OutletRecord> {
    let grade = |min_mm, max_mm, offset| OutletRecord {
        min_mm,
        max_mm,
        offset,
        closed_angle: 0,
        open_angle: 90,
    };
    vec![
        // Outlet 0 reads slot 0 regardless of offset.
        grade(0, 255, 1),
        grade(20, 255, 4),
        grade(18, 20, 7),
        grade(16, 18, 10),
        grade(14, 16, 13),
        grade(0, 14, 16),
    ]
}

pub fn encode_outlet_image(outlets: &[OutletRecord]) -> Vec<u8> {
    let n = outlets.len().min(MAX_OUTLETS);
    let mut out = Vec::with_capacity(2 + n * RECORD_LEN);
    out.push(IMAGE_MAGIC);
    out.push(n as u8);
    for o in &outlets[..n] {
        out.extend_from_slice(&[o.min_mm, o.max_mm, o.offset, o.closed_angle, o.open_angle]);
    }
    out
}

/// Decode an image; `None` when the marker, count or length is wrong.
pub fn decode_outlet_image(bytes: &[u8]) -> Option<Vec<OutletRecord>> {
    let (&magic, rest) = bytes.split_first()?;
    if magic != IMAGE_MAGIC {
        return None;
    }
    let (&count, body) = rest.split_first()?;
    let count = usize::from(count);
    if count == 0 || count > MAX_OUTLETS || body.len() < count * RECORD_LEN {
        return None;
    }
    let table = body
        .chunks_exact(RECORD_LEN)
        .take(count)
        .map(|r| OutletRecord {
            min_mm: r[0],
            max_mm: r[1],
            offset: r[2],
            closed_angle: r[3],
            open_angle: r[4],
        })
        .collect();
    Some(table)
}
