use nalgebra::{DMatrix, DVector};

/// Straight line `adc = slope * dac + offset` fitted by least squares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub offset: f64,
    /// Sum of squared residuals divided by the number of points.
    pub quality: f64,
    pub points: usize,
}

impl LinearFit {
    pub fn eval(&self, dac: f64) -> f64 {
        self.slope * dac + self.offset
    }
}

/// Fit a degree-1 polynomial through `(x, y)` points.
///
/// Returns `None` when the normal equations have no unique solution, which
/// includes fewer than two distinct `x` values.
pub fn fit_line(points: &[(f64, f64)]) -> Option<LinearFit> {
    let n = points.len();
    let distinct = points
        .iter()
        .skip(1)
        .any(|(x, _)| *x != points[0].0);
    if n < 2 || !distinct {
        return None;
    }

    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut target = DVector::<f64>::zeros(n);
    for (i, &(x, y)) in points.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = x;
        target[i] = y;
    }

    // Normal equations: A^T A c = A^T y
    let ata = design.transpose() * &design;
    let aty = design.transpose() * &target;
    let coeffs = ata.lu().solve(&aty)?;
    let (offset, slope) = (coeffs[0], coeffs[1]);
    if !slope.is_finite() || !offset.is_finite() {
        return None;
    }

    let ssr: f64 = points
        .iter()
        .map(|&(x, y)| (y - (slope * x + offset)).powi(2))
        .sum();

    Some(LinearFit {
        slope,
        offset,
        quality: ssr / n as f64,
        points: n,
    })
}
