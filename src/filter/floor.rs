use crate::channel::{HalfCurve, HALF_LEN};

/// Remove pedestal-region noise from a half curve.
///
/// - A missing last point is back-filled from the nearest recorded point before it.
/// - The first isolated point that sits above the next recorded point is zeroed.
/// - Each recorded point whose step to the next recorded point is flatter than
///   `max_slope` while still near the pedestal (`start < low_start` or
///   `end < low_end`) is zeroed.
///
/// Zeroed points count as missing and are refilled by later stages.
pub fn apply_floor(curve: &mut HalfCurve, max_slope: f64, low_start: f64, low_end: f64) {
    backfill_last(curve);
    drop_isolated_spike(curve);
    drop_flat_pedestal(curve, max_slope, low_start, low_end);
}

fn backfill_last(curve: &mut HalfCurve) {
    let last = HALF_LEN - 1;
    if !curve.is_missing(last) {
        return;
    }
    if let Some(prev) = curve.prev_nonzero(last) {
        curve[last] = curve[prev];
    }
}

fn drop_isolated_spike(curve: &mut HalfCurve) {
    for d in 1..HALF_LEN - 1 {
        if !curve.is_missing(d - 1) || curve.is_missing(d) {
            continue;
        }
        let Some(next) = curve.next_nonzero(d + 1) else {
            continue;
        };
        if curve[d] > curve[next] {
            log::trace!("floor: zeroing spike {} at DAC {}", curve[d], d);
            curve[d] = 0.0;
            return;
        }
    }
}

fn drop_flat_pedestal(curve: &mut HalfCurve, max_slope: f64, low_start: f64, low_end: f64) {
    let Some(mut d0) = curve.first_nonzero() else {
        return;
    };
    while let Some(d1) = curve.next_nonzero(d0 + 1) {
        let (a0, a1) = (curve[d0], curve[d1]);
        let slope = (a1 - a0) / (d1 - d0) as f64;
        if slope < max_slope && (a0 < low_start || a1 < low_end) {
            curve[d0] = 0.0;
        }
        d0 = d1;
    }
}
