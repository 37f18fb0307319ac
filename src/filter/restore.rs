use crate::channel::HalfCurve;

/// Linearly interpolate interior runs of missing points.
///
/// Only gaps with a recorded point on both sides are filled. Leading and
/// trailing gaps are left as they are.
pub fn apply_restore(curve: &mut HalfCurve) {
    let Some(mut prev) = curve.first_nonzero() else {
        return;
    };
    while let Some(next) = curve.next_nonzero(prev + 1) {
        if next > prev + 1 {
            let (a0, a1) = (curve[prev], curve[next]);
            let slope = (a1 - a0) / (next - prev) as f64;
            for d in prev + 1..next {
                curve[d] = a0 + slope * (d - prev) as f64;
            }
            log::trace!("restore: filled DAC {}..{}", prev + 1, next);
        }
        prev = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn curve_without_gaps_is_unchanged() {
        let original = HalfCurve::from_fn(|i| 3.5 + 1.25 * i as f64);
        let mut curve = original;
        apply_restore(&mut curve);
        assert_eq!(curve, original);
    }

    #[test]
    fn interior_gap_is_interpolated() {
        let line = HalfCurve::from_fn(|i| 40.0 + 5.0 * i as f64);
        let mut curve = line;
        for d in 10..20 {
            curve[d] = 0.0;
        }
        apply_restore(&mut curve);
        for d in 0..64 {
            assert_abs_diff_eq!(curve[d], line[d], epsilon = 1e-9);
        }
    }

    #[test]
    fn leading_and_trailing_gaps_stay_missing() {
        let mut curve = HalfCurve::from_fn(|i| if (5..50).contains(&i) { i as f64 } else { 0.0 });
        curve[20] = 0.0;
        apply_restore(&mut curve);
        assert!((0..5).all(|d| curve.is_missing(d)));
        assert!((50..64).all(|d| curve.is_missing(d)));
        assert_abs_diff_eq!(curve[20], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_curve_is_a_noop() {
        let mut curve = HalfCurve::default();
        apply_restore(&mut curve);
        assert_eq!(curve.nonzero_count(), 0);
    }
}
