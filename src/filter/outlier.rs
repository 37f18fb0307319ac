use crate::channel::HalfCurve;

/// Replace single-sample glitches.
///
/// Walks the recorded points in DAC order; whenever the slope from the previous
/// recorded point into point `d` is steeper than `max_slope` (or not finite),
/// point `d` is replaced by the straight line between its recorded neighbours,
/// which is their midpoint when they are adjacent. The last recorded point
/// has no right neighbour and copies the previous one. Missing points are
/// never touched and never form a segment.
pub fn apply_outlier_filter(curve: &mut HalfCurve, max_slope: f64) {
    let Some(mut prev) = curve.first_nonzero() else {
        return;
    };
    while let Some(d) = curve.next_nonzero(prev + 1) {
        let slope = (curve[d] - curve[prev]) / (d - prev) as f64;
        if !slope.is_finite() || slope.abs() > max_slope {
            let replacement = match curve.next_nonzero(d + 1) {
                Some(next) => {
                    let t = (d - prev) as f64 / (next - prev) as f64;
                    curve[prev] + t * (curve[next] - curve[prev])
                }
                None => curve[prev],
            };
            log::trace!(
                "filter: DAC {} slope {:.1}, {:.1} -> {:.1}",
                d,
                slope,
                curve[d],
                replacement
            );
            curve[d] = replacement;
        }
        prev = d;
    }
}
