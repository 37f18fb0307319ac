use crate::channel::{HalfCurve, HALF_LEN};

/// Boxcar moving average over `2 * half_width + 1` points.
///
/// Only recorded interior points are replaced; the `half_width` points at
/// each edge and missing points keep their value. Averages are taken over
/// the values before smoothing.
pub fn apply_smooth(curve: &mut HalfCurve, half_width: usize) {
    if half_width == 0 || 2 * half_width >= HALF_LEN {
        return;
    }
    let source = *curve.values();
    let width = (2 * half_width + 1) as f64;
    for d in half_width..HALF_LEN - half_width {
        if source[d] == 0.0 {
            continue;
        }
        let sum: f64 = source[d - half_width..=d + half_width].iter().sum();
        curve[d] = sum / width;
    }
}
