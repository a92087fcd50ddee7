//! Integer helpers for the per-tick path.
//!
//! Sensor weights are held as per-mille integers so width correction and
//! fusion never touch floating point once the runtime is built.

/// Fixed-point scale for calibration weights (1000 = 1.0).
pub const PERMILLE: u32 = 1000;

/// `n / d` rounded to nearest, ties away from zero. `d == 0` yields 0.
#[inline]
pub fn div_round_nearest_u32(n: u32, d: u32) -> u32 {
    if d == 0 {
        return 0;
    }
    let q = (u64::from(n) + u64::from(d) / 2) / u64::from(d);
    q.min(u64::from(u32::MAX)) as u32
}

/// Average of two values rounded to nearest, ties up. Cannot overflow.
#[inline]
pub fn avg2_round_nearest_u32(a: u32, b: u32) -> u32 {
    ((u64::from(a) + u64::from(b) + 1) / 2) as u32
}

/// Quantize a floating-point weight to per-mille, clamping to `u32`.
/// Non-finite or negative weights map to 0.
#[inline]
pub fn quantize_weight_permille(w: f32) -> u32 {
    if !w.is_finite() || w <= 0.0 {
        return 0;
    }
    let scaled = (w * PERMILLE as f32).round();
    if scaled >= u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Apply a per-mille weight to a raw width, rounding to nearest.
#[inline]
pub fn apply_weight(width: u32, weight_permille: u32) -> u32 {
    let scaled = u64::from(width) * u64::from(weight_permille);
    let q = (scaled + u64::from(PERMILLE) / 2) / u64::from(PERMILLE);
    q.min(u64::from(u32::MAX)) as u32
}
