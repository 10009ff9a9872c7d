//! Particle candidate record
//!
//! One record per simulated track. The surrounding pipeline owns the
//! kinematics and measurements; the identification stage writes the
//! diagnostics and, on emitted clones, the species code.

use crate::kinematics::FourVector;

/// Detector-level measurements attached to a track
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurements {
    /// Measured number of ionization clusters
    pub clusters: f64,
    /// Measured time-of-flight [s]
    pub tof_s: f64,
    /// Track length to the time-of-flight detector [mm]
    pub path_length_mm: f64,
    /// Track length inside the drift chamber [m]
    pub drift_length_m: f64,
}

impl Measurements {
    /// Track length to the time-of-flight detector [m]
    pub fn path_length_m(&self) -> f64 {
        self.path_length_mm * 1.0e-3
    }
}

/// Hypothesis-test outputs; side information only
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidDiagnostics {
    pub chi_pi: f64,
    pub chi_k: f64,
    pub prob_pi: f64,
    pub prob_k: f64,
    pub prob_p: f64,
    pub pid_meas: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    /// Signed species code
    pub pid: i32,
    pub charge: i32,
    /// Detector-level momentum
    pub momentum: FourVector,
    /// Position four-vector, used for eta and phi
    pub position: FourVector,
    /// Momentum of the originating truth particle
    pub truth_momentum: FourVector,
    pub measurements: Measurements,
    pub diagnostics: PidDiagnostics,
}

impl Candidate {
    pub fn new(pid: i32, charge: i32, momentum: FourVector) -> Self {
        Self {
            pid,
            charge,
            momentum,
            position: momentum,
            truth_momentum: momentum,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: FourVector) -> Self {
        self.position = position;
        self
    }

    pub fn with_truth_momentum(mut self, truth_momentum: FourVector) -> Self {
        self.truth_momentum = truth_momentum;
        self
    }

    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = measurements;
        self
    }

    /// Arguments passed to probability formulas: (pt, eta, phi, e)
    pub fn formula_args(&self) -> (f64, f64, f64, f64) {
        (
            self.momentum.pt(),
            self.position.eta(),
            self.position.phi(),
            self.momentum.e(),
        )
    }

    /// `code` carrying the sign of the candidate's charge; 0 for neutrals
    pub fn charged_code(&self, code: i32) -> i32 {
        match self.charge.signum() {
            1 => code,
            -1 => code.wrapping_neg(),
            _ => 0,
        }
    }
}
