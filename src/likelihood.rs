//! Mass-hypothesis likelihood engine
//!
//! Tests the pion, kaon and proton hypotheses against the measured cluster
//! count and time-of-flight of a track. Each hypothesis gets a two-term
//! chi-square, converted to a tail probability with two degrees of freedom.
//! The results are written to the candidate diagnostics; they never decide
//! whether the candidate is kept.

use std::sync::Arc;

use rand::Rng;

use crate::candidate::{Candidate, Measurements};
use crate::cluster::{ClusterYield, GasMixture};
use crate::efficiency::EfficiencyModel;
use crate::species::{is_identifiable, MassHypothesis, C_LIGHT, PID_UNIDENTIFIED};
use crate::stats::chi_square_survival;

/// Default time-of-flight resolution [s]
pub const DEFAULT_TOF_RESOLUTION_S: f64 = 30.0e-12;

/// Degrees of freedom of the combined dN/dx + TOF chi-square
const CHI2_DOF: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Species, cluster count or path lengths rule the track out
    Ineligible,
    /// Every hypothesis probability is zero
    Unidentified,
    /// One hypothesis strictly dominates the other two
    Identified(MassHypothesis),
    /// No strict winner; `pid_meas` keeps its previous value
    Undecided,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Raw tail probabilities in hypothesis order
    pub raw: [f64; 3],
    /// Hypothesis at which a non-positive expected yield stopped the scan
    pub aborted_at: Option<MassHypothesis>,
    /// Efficiency draws taken from the random stream
    pub draws: usize,
}

impl Evaluation {
    fn ineligible() -> Self {
        Self {
            verdict: Verdict::Ineligible,
            raw: [0.0; 3],
            aborted_at: None,
            draws: 0,
        }
    }
}

pub struct LikelihoodEngine {
    yields: Arc<dyn ClusterYield>,
    efficiency: EfficiencyModel,
    /// Gas filling the drift chamber
    gas: GasMixture,
    tof_resolution_s: f64,
}

impl LikelihoodEngine {
    pub fn new(yields: Arc<dyn ClusterYield>, efficiency: EfficiencyModel) -> Self {
        Self {
            yields,
            efficiency,
            gas: GasMixture::HeliumIsobutane,
            tof_resolution_s: DEFAULT_TOF_RESOLUTION_S,
        }
    }

    pub fn with_gas(mut self, gas: GasMixture) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_tof_resolution(mut self, tof_resolution_s: f64) -> Self {
        self.tof_resolution_s = tof_resolution_s;
        self
    }

    /// Annotate `candidate` with chi-square values, normalized probabilities
    /// and the measured PID
    pub fn evaluate<R: Rng + ?Sized>(&self, candidate: &mut Candidate, rng: &mut R) -> Evaluation {
        let m = candidate.measurements;
        if !is_eligible(candidate.pid, &m) {
            candidate.diagnostics.pid_meas = PID_UNIDENTIFIED;
            return Evaluation::ineligible();
        }

        let p_meas = candidate.truth_momentum.p();
        let cos_theta = candidate.truth_momentum.cos_theta();

        let mut raw = [0.0; 3];
        let mut aborted_at = None;
        let mut draws = 0;

        for hypothesis in MassHypothesis::ALL {
            draws += 1;
            let Some(chi2) = self.chi_square(hypothesis, p_meas, cos_theta, &m, rng) else {
                aborted_at = Some(hypothesis);
                break;
            };

            match hypothesis {
                MassHypothesis::Pion => candidate.diagnostics.chi_pi = chi2,
                MassHypothesis::Kaon => candidate.diagnostics.chi_k = chi2,
                MassHypothesis::Proton => {}
            }
            raw[hypothesis.index()] = chi_square_survival(chi2, CHI2_DOF);
        }

        if let Some(at) = aborted_at {
            tracing::trace!(hypothesis = at.name(), p = p_meas, "non-positive cluster yield, scan stopped");
        }

        let verdict = if raw.iter().all(|&prob| prob == 0.0) {
            candidate.diagnostics.pid_meas = PID_UNIDENTIFIED;
            Verdict::Unidentified
        } else {
            let total: f64 = raw.iter().sum();
            candidate.diagnostics.prob_pi = raw[0] / total;
            candidate.diagnostics.prob_k = raw[1] / total;
            candidate.diagnostics.prob_p = raw[2] / total;

            match select_dominant(&raw) {
                Some(hypothesis) => {
                    candidate.diagnostics.pid_meas = candidate.charged_code(hypothesis.code());
                    Verdict::Identified(hypothesis)
                }
                None => Verdict::Undecided,
            }
        };

        Evaluation {
            verdict,
            raw,
            aborted_at,
            draws,
        }
    }

    /// Chi-square of one hypothesis; `None` when the expected yield is not
    /// positive
    fn chi_square<R: Rng + ?Sized>(
        &self,
        hypothesis: MassHypothesis,
        p_meas: f64,
        cos_theta: f64,
        m: &Measurements,
        rng: &mut R,
    ) -> Option<f64> {
        let mass = hypothesis.mass();
        let bg = p_meas / mass;

        let eff = self.efficiency.sample(self.yields.as_ref(), bg, cos_theta, rng);
        let dndx_exp = self.yields.clusters_per_meter(bg, self.gas) * m.drift_length_m * eff;
        // A non-finite efficiency (track along the beam axis) is treated as no yield
        if !(dndx_exp > 0.0) || !eff.is_finite() {
            return None;
        }

        let tof_exp = m.path_length_m() * (mass * mass + p_meas * p_meas).sqrt() / (C_LIGHT * p_meas);

        let dndx_sigma = (dndx_exp * eff).sqrt();
        let chi_dndx = (m.clusters - dndx_exp) / dndx_sigma;
        let chi_tof = (m.tof_s - tof_exp) / self.tof_resolution_s;

        Some(chi_dndx * chi_dndx + chi_tof * chi_tof)
    }
}

fn is_eligible(pid: i32, m: &Measurements) -> bool {
    is_identifiable(pid) && m.clusters != 0.0 && m.path_length_m() > 0.0 && m.drift_length_m > 0.0
}

/// Hypothesis whose probability is strictly greater than both others
pub fn select_dominant(raw: &[f64; 3]) -> Option<MassHypothesis> {
    MassHypothesis::ALL.into_iter().find(|h| {
        let i = h.index();
        (0..raw.len()).filter(|&j| j != i).all(|j| raw[i] > raw[j])
    })
}
