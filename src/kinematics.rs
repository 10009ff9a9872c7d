//! Four-vector helpers
//!
//! Minimal Lorentz-vector accessors needed by the identification stage.

use serde::{Deserialize, Serialize};

/// Pseudorapidity reported for vectors along the beam axis
const ETA_AT_POLE: f64 = 1.0e10;

/// Four-vector with spatial part (x, y, z) and time/energy part t
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FourVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl FourVector {
    pub fn new(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self { x, y, z, t }
    }

    /// Momentum vector with the energy fixed by a mass
    pub fn from_momentum_mass(px: f64, py: f64, pz: f64, mass: f64) -> Self {
        let e = (px * px + py * py + pz * pz + mass * mass).sqrt();
        Self::new(px, py, pz, e)
    }

    /// Transverse component
    pub fn pt(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Magnitude of the spatial part
    pub fn p(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn e(&self) -> f64 {
        self.t
    }

    /// Cosine of the polar angle; 1 for the null vector
    pub fn cos_theta(&self) -> f64 {
        let p = self.p();
        if p == 0.0 {
            1.0
        } else {
            self.z / p
        }
    }

    /// Pseudorapidity
    pub fn eta(&self) -> f64 {
        let cos_theta = self.cos_theta();
        if cos_theta * cos_theta < 1.0 {
            return -0.5 * ((1.0 - cos_theta) / (1.0 + cos_theta)).ln();
        }
        if self.z == 0.0 {
            0.0
        } else if self.z > 0.0 {
            ETA_AT_POLE
        } else {
            -ETA_AT_POLE
        }
    }

    /// Azimuthal angle in (-pi, pi]
    pub fn phi(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            0.0
        } else {
            self.y.atan2(self.x)
        }
    }
}
