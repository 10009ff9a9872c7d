//! Cluster-yield model
//!
//! Expected number of primary ionization clusters per meter as a function of
//! the boost factor beta*gamma, for a handful of drift-chamber gas mixtures.

use serde::{Deserialize, Serialize};

/// Source of expected cluster densities
pub trait ClusterYield: Send + Sync {
    /// Expected clusters per meter at boost factor `bg`; 0 when out of range
    fn clusters_per_meter(&self, bg: f64, gas: GasMixture) -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GasMixture {
    /// He 90% / isobutane 10%
    #[default]
    HeliumIsobutane,
    Helium,
    /// Ar 50% / ethane 50%
    ArgonEthane,
    Argon,
}

impl GasMixture {
    pub const ALL: [GasMixture; 4] = [
        Self::HeliumIsobutane,
        Self::Helium,
        Self::ArgonEthane,
        Self::Argon,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::HeliumIsobutane => 0,
            Self::Helium => 1,
            Self::ArgonEthane => 2,
            Self::Argon => 3,
        }
    }

    fn clusters_per_cm(self) -> &'static [f64; NODES] {
        match self {
            Self::HeliumIsobutane => &NCL_HE_ISO,
            Self::Helium => &NCL_HE,
            Self::ArgonEthane => &NCL_AR_ETH,
            Self::Argon => &NCL_AR,
        }
    }
}

const NODES: usize = 18;

const BG_NODES: [f64; NODES] = [
    0.5, 0.8, 1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 10.0, 12.0, 15.0, 20.0, 50.0, 100.0, 200.0, 500.0,
    1000.0, 10000.0,
];

const NCL_HE_ISO: [f64; NODES] = [
    42.94, 23.6, 18.97, 12.98, 12.2, 12.13, 12.24, 12.73, 13.03, 13.29, 13.63, 14.08, 15.56, 16.43,
    16.8, 16.95, 16.98, 16.98,
];

const NCL_HE: [f64; NODES] = [
    11.79, 6.5, 5.23, 3.59, 3.38, 3.37, 3.4, 3.54, 3.63, 3.7, 3.8, 3.92, 4.33, 4.61, 4.78, 4.87,
    4.89, 4.89,
];

const NCL_AR_ETH: [f64; NODES] = [
    130.04, 71.55, 57.56, 39.44, 37.08, 36.9, 37.25, 38.76, 39.68, 40.49, 41.53, 42.91, 46.8,
    48.09, 48.59, 48.85, 48.93, 48.93,
];

const NCL_AR: [f64; NODES] = [
    88.69, 48.93, 39.41, 27.09, 25.51, 25.43, 25.69, 26.78, 27.44, 28.02, 28.77, 29.78, 32.67,
    33.75, 34.24, 34.57, 34.68, 34.68,
];

/// Cubic spline through fixed nodes with not-a-knot end conditions
#[derive(Debug, Clone)]
struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the nodes
    m: Vec<f64>,
}

impl CubicSpline {
    /// Third derivative is continuous across the first and last interior
    /// nodes. Fewer than four nodes interpolate linearly.
    fn not_a_knot(x: &[f64], y: &[f64]) -> Self {
        let n = x.len();
        let mut m = vec![0.0; n];

        if n >= 4 {
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let k = n - 2;
            let mut sub = vec![0.0; n];
            let mut diag = vec![0.0; n];
            let mut sup = vec![0.0; n];
            let mut rhs = vec![0.0; n];
            for i in 1..=k {
                sub[i] = h[i - 1] / 6.0;
                diag[i] = (h[i - 1] + h[i]) / 3.0;
                sup[i] = h[i] / 6.0;
                rhs[i] = (y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1];
            }

            // m[0] and m[n - 1] eliminated through the end conditions
            sub[1] = 0.0;
            diag[1] = (h[0] + h[1]) * (h[0] + 2.0 * h[1]) / (6.0 * h[1]);
            sup[1] = (h[1] - h[0]) * (h[1] + h[0]) / (6.0 * h[1]);
            sub[k] = (h[k - 1] - h[k]) * (h[k - 1] + h[k]) / (6.0 * h[k - 1]);
            diag[k] = (h[k - 1] + h[k]) * (2.0 * h[k - 1] + h[k]) / (6.0 * h[k - 1]);
            sup[k] = 0.0;

            // Thomas algorithm
            for i in 2..=k {
                let w = sub[i] / diag[i - 1];
                diag[i] -= w * sup[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            m[k] = rhs[k] / diag[k];
            for i in (1..k).rev() {
                m[i] = (rhs[i] - sup[i] * m[i + 1]) / diag[i];
            }

            m[0] = ((h[0] + h[1]) * m[1] - h[0] * m[2]) / h[1];
            m[n - 1] = ((h[k - 1] + h[k]) * m[k] - h[k] * m[k - 1]) / h[k - 1];
        }

        Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        }
    }

    fn eval(&self, at: f64) -> f64 {
        let n = self.x.len();
        let hi = self.x.partition_point(|&node| node <= at).clamp(1, n - 1);
        let lo = hi - 1;

        let h = self.x[hi] - self.x[lo];
        let a = (self.x[hi] - at) / h;
        let b = (at - self.x[lo]) / h;

        a * self.y[lo]
            + b * self.y[hi]
            + ((a * a * a - a) * self.m[lo] + (b * b * b - b) * self.m[hi]) * h * h / 6.0
    }
}

/// Tabulated cluster densities interpolated with a not-a-knot cubic spline
#[derive(Debug, Clone)]
pub struct TabulatedClusterYield {
    splines: Vec<CubicSpline>,
}

impl TabulatedClusterYield {
    pub fn new() -> Self {
        let splines = GasMixture::ALL
            .iter()
            .map(|gas| CubicSpline::not_a_knot(&BG_NODES, gas.clusters_per_cm()))
            .collect();
        Self { splines }
    }

    /// Boost-factor range with a non-zero yield (open interval)
    pub fn range(&self) -> (f64, f64) {
        (BG_NODES[0], BG_NODES[NODES - 1])
    }
}

impl Default for TabulatedClusterYield {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterYield for TabulatedClusterYield {
    fn clusters_per_meter(&self, bg: f64, gas: GasMixture) -> f64 {
        let (lo, hi) = self.range();
        if !(bg > lo && bg < hi) {
            return 0.0;
        }
        100.0 * self.splines[gas.index()].eval(bg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spline_passes_through_nodes() {
        let model = TabulatedClusterYield::new();
        for gas in GasMixture::ALL {
            let table = gas.clusters_per_cm();
            for i in 1..NODES - 1 {
                let got = model.clusters_per_meter(BG_NODES[i], gas);
                assert_relative_eq!(got, 100.0 * table[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_spline_reproduces_straight_line() {
        let x = [0.0, 1.0, 3.0, 4.0];
        let y = [1.0, 3.0, 7.0, 9.0];
        let spline = CubicSpline::not_a_knot(&x, &y);
        assert_relative_eq!(spline.eval(2.0), 5.0, epsilon = 1e-12);
        assert_relative_eq!(spline.eval(3.5), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_end_conditions_reproduce_a_cubic() {
        let cubic = |t: f64| t * t * t - 2.0 * t * t + 1.0;
        let x = [0.0, 1.0, 2.5, 3.0, 4.0, 6.0];
        let y = x.map(cubic);
        let spline = CubicSpline::not_a_knot(&x, &y);
        for at in [0.4, 1.7, 2.8, 5.1] {
            assert_relative_eq!(spline.eval(at), cubic(at), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_outside_tabulated_range() {
        let model = TabulatedClusterYield::new();
        let gas = GasMixture::HeliumIsobutane;
        assert_eq!(model.clusters_per_meter(0.3, gas), 0.0);
        assert_eq!(model.clusters_per_meter(0.5, gas), 0.0);
        assert_eq!(model.clusters_per_meter(10000.0, gas), 0.0);
        assert_eq!(model.clusters_per_meter(f64::NAN, gas), 0.0);
        assert!(model.clusters_per_meter(3.5, gas) > 0.0);
    }

    #[test]
    fn test_argon_yields_more_than_helium() {
        let model = TabulatedClusterYield::new();
        let he = model.clusters_per_meter(7.0, GasMixture::Helium);
        let ar = model.clusters_per_meter(7.0, GasMixture::Argon);
        assert!(ar > he);
    }
}
