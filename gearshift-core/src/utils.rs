//! Module containing miscellaneous array utility functions.

use crate::imports::*;

/// First-order difference with a leading zero, so the output has the same
/// length as the input.
pub fn diff(x: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::zeros(x.len());
    for i in 1..x.len() {
        out[i] = x[i] - x[i - 1];
    }
    out
}

/// return cumsum <f64> of arr
pub fn cumsum(arr: &Array1<f64>) -> Array1<f64> {
    arr.iter()
        .scan(0.0, |acc, &x| {
            *acc += x;
            Some(*acc)
        })
        .collect()
}

/// Return first index of `arr` greater than `cut`
pub fn first_grtr(arr: &[f64], cut: f64) -> Option<usize> {
    if arr.is_empty() {
        return None;
    }
    Some(arr.iter().position(|&x| x > cut).unwrap_or(arr.len() - 1))
}

/// return max <f64> of arr
pub fn arrmax(arr: &[f64]) -> f64 {
    arr.iter().copied().fold(f64::NAN, f64::max)
}

/// Round to 4 decimal places, matching the sample resolution of the trace
/// and power tables carried through the calculation.
pub fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

/// Piecewise-linear interpolation of `y_data` over `x_data` at `x`.
/// `x_data` must be strictly increasing. Outside the data range the value
/// is clamped to the end points unless `extrapolate` is set, in which case
/// the first/last segment is extended.
pub fn interpolate(x: f64, x_data: &[f64], y_data: &[f64], extrapolate: bool) -> f64 {
    assert!(x_data.len() == y_data.len());
    assert!(x_data.len() >= 2);
    let size = x_data.len();

    let mut i = 0;
    if x >= x_data[size - 2] {
        i = size - 2;
    } else {
        while x > x_data[i + 1] {
            i += 1;
        }
    }
    let xl = x_data[i];
    let mut yl = y_data[i];
    let xr = x_data[i + 1];
    let mut yr = y_data[i + 1];
    if !extrapolate {
        if x < xl {
            yr = yl;
        }
        if x > xr {
            yl = yr;
        }
    }
    let dydx = (yr - yl) / (xr - xl);
    yl + dydx * (x - xl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff() {
        assert_eq!(diff(&Array1::range(0.0, 3.0, 1.0)), array![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_cumsum() {
        assert_eq!(cumsum(&array![1.0, 2.0, 3.0]), array![1.0, 3.0, 6.0]);
    }

    #[test]
    fn test_first_grtr() {
        let xs: [f64; 5] = [0.0, 1.2, 3.3, 4.4, 6.6];
        assert_eq!(first_grtr(&xs, 3.0).unwrap(), 2);
        // default to the last index when nothing is greater
        assert_eq!(first_grtr(&xs, 7.0).unwrap(), 4);
    }

    #[test]
    fn test_interpolate_within_and_clamped() {
        let xs = [1000.0, 2000.0, 3000.0];
        let ys = [20.0, 60.0, 70.0];
        assert_eq!(interpolate(1500.0, &xs, &ys, false), 40.0);
        assert_eq!(interpolate(500.0, &xs, &ys, false), 20.0);
        assert_eq!(interpolate(3500.0, &xs, &ys, false), 70.0);
        // linear extension of the last segment
        assert_eq!(interpolate(3500.0, &xs, &ys, true), 75.0);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(1.00005), 1.0001);
        assert_eq!(round4(-0.33333333), -0.3333);
    }
}
