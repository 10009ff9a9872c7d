//! Relabeling sampler
//!
//! Draws one uniform number per candidate and walks the candidate's bucket
//! in configured order. The entry whose cumulative interval contains the
//! draw decides the output code; a draw beyond the bucket's total mass drops
//! the candidate.

use std::sync::Arc;

use rand::Rng;

use crate::candidate::Candidate;
use crate::table::{Lookup, ProbabilityTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the candidate with this species code
    Retain { pid: i32 },
    Drop,
}

pub struct RelabelingSampler {
    table: Arc<ProbabilityTable>,
}

impl RelabelingSampler {
    pub fn new(table: Arc<ProbabilityTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ProbabilityTable {
        &self.table
    }

    /// Uniform draw in [0, 1)
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen::<f64>()
    }

    /// Outcome for a given uniform draw `r`
    pub fn decide(&self, candidate: &Candidate, r: f64) -> Decision {
        let (lookup, bucket) = self.table.resolve(candidate.pid);
        let (pt, eta, phi, e) = candidate.formula_args();

        let mut total = 0.0;
        for entry in bucket {
            let p = entry.probability(pt, eta, phi, e);
            if total <= r && r < total + p {
                tracing::trace!(
                    pid = candidate.pid,
                    output = entry.output,
                    expression = %entry.expression,
                    r,
                    "relabeling interval selected"
                );
                let pid = if entry.output != 0 {
                    candidate.charged_code(entry.output)
                } else {
                    candidate.pid
                };
                return Decision::Retain { pid };
            }
            total += p;
        }

        if lookup == Lookup::Fallback && bucket.is_empty() {
            tracing::trace!(pid = candidate.pid, "empty fallback bucket");
        }
        Decision::Drop
    }

    /// Relabeled clone for a retained candidate
    pub fn apply(&self, candidate: &Candidate, decision: Decision) -> Option<Candidate> {
        match decision {
            Decision::Retain { pid } => {
                let mut clone = candidate.clone();
                clone.pid = pid;
                Some(clone)
            }
            Decision::Drop => None,
        }
    }

    /// Draw, decide and clone in one step
    pub fn resample<R: Rng + ?Sized>(&self, candidate: &Candidate, rng: &mut R) -> Option<Candidate> {
        let r = self.draw(rng);
        self.apply(candidate, self.decide(candidate, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ExpressionCompiler;
    use crate::kinematics::FourVector;
    use crate::table::MapRule;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sampler(rules: &[MapRule]) -> RelabelingSampler {
        let table = ProbabilityTable::build(rules, &ExpressionCompiler).expect("table should build");
        RelabelingSampler::new(Arc::new(table))
    }

    fn track(pid: i32, charge: i32) -> Candidate {
        Candidate::new(pid, charge, FourVector::from_momentum_mass(1.0, 0.5, 0.2, 0.13957))
    }

    fn pion_bucket() -> RelabelingSampler {
        sampler(&[MapRule::new(211, 211, "0.8"), MapRule::new(211, 11, "0.1")])
    }

    #[test]
    fn test_cumulative_intervals() {
        let s = pion_bucket();
        let pion = track(211, 1);
        assert_eq!(s.decide(&pion, 0.0), Decision::Retain { pid: 211 });
        assert_eq!(s.decide(&pion, 0.5), Decision::Retain { pid: 211 });
        assert_eq!(s.decide(&pion, 0.85), Decision::Retain { pid: 11 });
        assert_eq!(s.decide(&pion, 0.95), Decision::Drop);
    }

    #[test]
    fn test_interval_edges_are_half_open() {
        let s = pion_bucket();
        let pion = track(211, 1);
        assert_eq!(s.decide(&pion, 0.8), Decision::Retain { pid: 11 });
        assert_eq!(s.decide(&pion, 0.9), Decision::Drop);
    }

    #[test]
    fn test_output_code_follows_charge() {
        let s = pion_bucket();
        let antipion = track(-211, -1);
        assert_eq!(s.decide(&antipion, 0.5), Decision::Retain { pid: -211 });
        assert_eq!(s.decide(&antipion, 0.85), Decision::Retain { pid: -11 });
    }

    #[test]
    fn test_default_bucket_keeps_everything() {
        let s = sampler(&[]);
        let exotic = track(5, 0);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        for _ in 0..1000 {
            let out = s.resample(&exotic, &mut rng).expect("always retained");
            assert_eq!(out.pid, 5);
        }
    }

    #[test]
    fn test_zero_output_keeps_input_code() {
        let s = sampler(&[MapRule::new(13, 0, "1.0")]);
        assert_eq!(s.decide(&track(-13, 1), 0.3), Decision::Retain { pid: -13 });
    }

    #[test]
    fn test_kinematic_formula() {
        let s = sampler(&[MapRule::new(321, 321, "(pt > 2) * 0.9")]);
        let soft = track(321, 1);
        assert_eq!(s.decide(&soft, 0.1), Decision::Drop);

        let hard = Candidate::new(321, 1, FourVector::from_momentum_mass(3.0, 0.0, 0.0, 0.49368));
        assert_eq!(s.decide(&hard, 0.1), Decision::Retain { pid: 321 });
    }

    #[test]
    fn test_empty_fallback_drops() {
        let table = ProbabilityTable::default();
        let s = RelabelingSampler::new(Arc::new(table));
        assert_eq!(s.decide(&track(211, 1), 0.0), Decision::Drop);
    }

    #[test]
    fn test_drop_rate_matches_missing_mass() {
        let s = sampler(&[MapRule::new(2212, 2212, "0.6"), MapRule::new(2212, 211, "0.1")]);
        let proton = track(2212, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        let n = 100_000;
        let dropped = (0..n).filter(|_| s.resample(&proton, &mut rng).is_none()).count();
        let rate = dropped as f64 / n as f64;
        assert!((rate - 0.3).abs() < 0.01, "drop rate {rate}");
    }

    #[test]
    fn test_clone_carries_diagnostics() {
        let s = pion_bucket();
        let mut pion = track(211, 1);
        pion.diagnostics.pid_meas = 321;
        let out = s.apply(&pion, s.decide(&pion, 0.85)).expect("retained");
        assert_eq!(out.pid, 11);
        assert_eq!(out.diagnostics.pid_meas, 321);
        assert_eq!(pion.pid, 211);
    }
}
