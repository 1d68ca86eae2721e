use super::constants::{DEGENERATE_BANDWIDTH, DENSITY_CUT, DENSITY_GRID_POINTS};

/// A density curve sampled on an evenly spaced grid
#[derive(Debug, Clone, PartialEq)]
pub struct DensityEstimate {
    pub points: Vec<(f64, f64)>,
    pub bandwidth: f64,
}

/// Scott's rule of thumb for a one dimensional gaussian kernel: sigma * n^(-1/5),
/// using the sample standard deviation.
pub fn scott_bandwidth(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return DEGENERATE_BANDWIDTH;
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let bandwidth = variance.sqrt() * (n as f64).powf(-0.2);
    if bandwidth.is_finite() && bandwidth > 0.0 {
        bandwidth
    } else {
        DEGENERATE_BANDWIDTH
    }
}

impl DensityEstimate {
    /// Gaussian kernel density estimate of the samples.
    ///
    /// The grid spans the data plus a few bandwidths on either side. Returns None for an
    /// empty sample set.
    pub fn gaussian(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let bandwidth = scott_bandwidth(samples);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lo = min - DENSITY_CUT * bandwidth;
        let hi = max + DENSITY_CUT * bandwidth;
        let step = (hi - lo) / (DENSITY_GRID_POINTS - 1) as f64;

        let norm = 1.0 / (samples.len() as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
        let points = (0..DENSITY_GRID_POINTS)
            .map(|i| {
                let x = lo + step * i as f64;
                let density = samples
                    .iter()
                    .map(|s| (-0.5 * ((x - s) / bandwidth).powi(2)).exp())
                    .sum::<f64>()
                    * norm;
                (x, density)
            })
            .collect();

        Some(Self { points, bandwidth })
    }

    /// Linear interpolation of the curve, clamped to the end values outside the grid
    pub fn interpolate(&self, x: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return 0.0,
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|(px, _)| *px < x);
        let (x0, y0) = self.points[upper - 1];
        let (x1, y1) = self.points[upper];
        if x1 == x0 {
            return y0;
        }
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }

    pub fn max_density(&self) -> f64 {
        self.points.iter().map(|(_, y)| *y).fold(0.0, f64::max)
    }
}
