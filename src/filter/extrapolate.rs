//! Extending a half curve past its recorded points.

use crate::channel::{HalfCurve, HALF_LEN};

/// Fill every point before the first recorded one along the slope of the first
/// two recorded points, clipped at zero.
///
/// Does nothing with fewer than two recorded points.
pub fn apply_extrapolate_low(curve: &mut HalfCurve) {
    let Some(d0) = curve.first_nonzero() else {
        return;
    };
    let Some(d1) = curve.next_nonzero(d0 + 1) else {
        log::trace!("extrapolate_low: single recorded point at DAC {}", d0);
        return;
    };
    let a0 = curve[d0];
    let slope = (curve[d1] - a0) / (d1 - d0) as f64;
    for d in 0..d0 {
        curve[d] = (a0 - slope * (d0 - d) as f64).max(0.0);
    }
}

/// Replace a saturated tail with the linear projection of the curve below it.
///
/// The plateau is the trailing run of points equal to the last one. The
/// projection slope is taken over `span` points below the last unsaturated
/// point. Needs a plateau of at least two points and enough room for the span.
pub fn apply_extrapolate_high(curve: &mut HalfCurve, span: usize) {
    let last = HALF_LEN - 1;
    let top = curve[last];
    if top == 0.0 || span == 0 {
        return;
    }
    let plateau_start = (0..last)
        .rev()
        .find(|&d| curve[d] != top)
        .map_or(0, |d| d + 1);
    if plateau_start == last || plateau_start == 0 {
        return;
    }
    let k = plateau_start - 1;
    if k < span {
        log::trace!("extrapolate_high: only {} points below the plateau", k);
        return;
    }
    let slope = (curve[k] - curve[k - span]) / span as f64;
    for d in plateau_start..HALF_LEN {
        curve[d] = curve[k] + slope * (d - k) as f64;
    }
}

/// Back-fill a LAC curve that has a single usable point, assuming a fixed
/// empirical slope anchored at the last DAC setting. Clipped at zero.
pub fn apply_fill_lac(curve: &mut HalfCurve, slope: f64) {
    let last = HALF_LEN - 1;
    let anchor = curve[last];
    if anchor == 0.0 {
        return;
    }
    for d in 0..last {
        curve[d] = (anchor - slope * (last - d) as f64).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn extrapolate_low_reproduces_the_ramp() {
        let ramp = |d: usize| 100.0 + 7.5 * d as f64;
        let mut curve = HalfCurve::from_fn(|d| if d >= 12 { ramp(d) } else { 0.0 });
        apply_extrapolate_low(&mut curve);
        for d in 0..HALF_LEN {
            assert_abs_diff_eq!(curve[d], ramp(d), epsilon = 1e-9);
        }
    }

    #[test]
    fn extrapolate_low_clips_at_zero() {
        let ramp = |d: usize| 10.0 * d as f64 - 150.0;
        let mut curve = HalfCurve::from_fn(|d| if d >= 20 { ramp(d) } else { 0.0 });
        apply_extrapolate_low(&mut curve);
        for d in 0..20 {
            assert_abs_diff_eq!(curve[d], ramp(d).max(0.0), epsilon = 1e-9);
        }
        assert_eq!(curve[3], 0.0);
        assert_abs_diff_eq!(curve[16], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn extrapolate_low_needs_two_points() {
        let mut curve = HalfCurve::default();
        curve[40] = 500.0;
        let before = curve;
        apply_extrapolate_low(&mut curve);
        assert_eq!(curve, before);
    }

    #[test]
    fn extrapolate_high_unclips_the_plateau() {
        let line = |d: usize| 200.0 + 20.0 * d as f64;
        let mut curve = HalfCurve::from_fn(|d| line(d.min(50)));
        apply_extrapolate_high(&mut curve, 10);
        for d in 0..HALF_LEN {
            assert_abs_diff_eq!(curve[d], line(d), epsilon = 1e-9);
        }
    }

    #[test]
    fn extrapolate_high_ignores_unsaturated_curve() {
        let original = HalfCurve::from_fn(|d| 200.0 + 20.0 * d as f64);
        let mut curve = original;
        apply_extrapolate_high(&mut curve, 10);
        assert_eq!(curve, original);
    }

    #[test]
    fn extrapolate_high_needs_room_for_the_span() {
        let original = HalfCurve::from_fn(|d| 200.0 + 20.0 * d.min(8) as f64);
        let mut curve = original;
        apply_extrapolate_high(&mut curve, 10);
        assert_eq!(curve, original);
    }

    #[test]
    fn fill_lac_anchors_on_last_point() {
        let mut curve = HalfCurve::default();
        curve[63] = 300.0;
        apply_fill_lac(&mut curve, 11.0);
        assert_abs_diff_eq!(curve[62], 289.0, epsilon = 1e-12);
        assert_abs_diff_eq!(curve[40], 300.0 - 11.0 * 23.0, epsilon = 1e-12);
        assert_eq!(curve[0], 0.0);
        assert!((0..64).all(|d| curve[d] >= 0.0));
    }
}
