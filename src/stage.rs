//! Identification stage
//!
//! Runs the likelihood engine and the relabeling sampler over a batch of
//! candidates. Per candidate the random stream is consumed in a fixed order:
//! the sampler's uniform draw, then up to three efficiency draws.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use crate::candidate::Candidate;
use crate::cluster::ClusterYield;
use crate::config::StageConfig;
use crate::formula::FormulaCompiler;
use crate::likelihood::{Evaluation, LikelihoodEngine, Verdict};
use crate::sampler::{Decision, RelabelingSampler};
use crate::table::ProbabilityTable;
use crate::PidError;

/// Counters over one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub processed: usize,
    pub retained: usize,
    /// Retained with a different species code
    pub relabeled: usize,
    pub dropped: usize,
    pub identified: usize,
    pub undecided: usize,
    pub unidentified: usize,
    pub ineligible: usize,
}

impl StageSummary {
    fn observe(&mut self, input_pid: i32, eval: &Evaluation, decision: Decision) {
        self.processed += 1;
        match eval.verdict {
            Verdict::Identified(_) => self.identified += 1,
            Verdict::Undecided => self.undecided += 1,
            Verdict::Unidentified => self.unidentified += 1,
            Verdict::Ineligible => self.ineligible += 1,
        }
        match decision {
            Decision::Retain { pid } => {
                self.retained += 1;
                if pid != input_pid {
                    self.relabeled += 1;
                }
            }
            Decision::Drop => self.dropped += 1,
        }
    }

    pub fn merge(&mut self, other: &StageSummary) {
        self.processed += other.processed;
        self.retained += other.retained;
        self.relabeled += other.relabeled;
        self.dropped += other.dropped;
        self.identified += other.identified;
        self.undecided += other.undecided;
        self.unidentified += other.unidentified;
        self.ineligible += other.ineligible;
    }

    /// Fraction of processed candidates that were dropped
    pub fn drop_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.dropped as f64 / self.processed as f64
        }
    }
}

/// Emitted candidates in input order, plus counters
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub output: Vec<Candidate>,
    pub summary: StageSummary,
}

pub struct IdentificationStage {
    engine: LikelihoodEngine,
    sampler: RelabelingSampler,
}

impl IdentificationStage {
    pub fn new(engine: LikelihoodEngine, sampler: RelabelingSampler) -> Self {
        Self { engine, sampler }
    }

    /// Build engine and table from configuration; fails before any
    /// candidate is seen
    pub fn from_config(
        cfg: &StageConfig,
        yields: Arc<dyn ClusterYield>,
        compiler: &dyn FormulaCompiler,
    ) -> Result<Self, PidError> {
        cfg.validate()?;
        let table = ProbabilityTable::build(&cfg.efficiency_formula, compiler)?;
        let engine = LikelihoodEngine::new(yields, cfg.efficiency)
            .with_gas(cfg.gas)
            .with_tof_resolution(cfg.tof_resolution_s);
        Ok(Self::new(engine, RelabelingSampler::new(Arc::new(table))))
    }

    pub fn engine(&self) -> &LikelihoodEngine {
        &self.engine
    }

    pub fn sampler(&self) -> &RelabelingSampler {
        &self.sampler
    }

    /// Annotate one candidate and decide its fate
    pub fn process_candidate<R: Rng + ?Sized>(
        &self,
        candidate: &mut Candidate,
        rng: &mut R,
    ) -> (Evaluation, Decision) {
        let r = self.sampler.draw(rng);
        let eval = self.engine.evaluate(candidate, rng);
        let decision = self.sampler.decide(candidate, r);

        tracing::trace!(
            pid = candidate.pid,
            pid_meas = candidate.diagnostics.pid_meas,
            r,
            ?decision,
            "candidate processed"
        );
        (eval, decision)
    }

    /// Process a batch front to back with one random stream
    pub fn process<R: Rng + ?Sized>(&self, candidates: &mut [Candidate], rng: &mut R) -> Batch {
        let mut batch = Batch {
            output: Vec::with_capacity(candidates.len()),
            summary: StageSummary::default(),
        };

        for candidate in candidates.iter_mut() {
            let input_pid = candidate.pid;
            let (eval, decision) = self.process_candidate(candidate, rng);
            batch.summary.observe(input_pid, &eval, decision);
            if let Some(clone) = self.sampler.apply(candidate, decision) {
                batch.output.push(clone);
            }
        }

        tracing::debug!(
            processed = batch.summary.processed,
            retained = batch.summary.retained,
            dropped = batch.summary.dropped,
            "batch processed"
        );
        batch
    }

    /// Process fixed-size chunks in parallel. Chunk `i` uses the ChaCha
    /// stream `i` of `seed`, so the result does not depend on the number of
    /// worker threads.
    pub fn process_parallel(&self, candidates: &mut [Candidate], seed: u64, chunk_size: usize) -> Batch {
        let chunk_size = chunk_size.max(1);

        let parts: Vec<Batch> = candidates
            .par_chunks_mut(chunk_size)
            .enumerate()
            .map(|(idx, chunk)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(idx as u64);
                self.process(chunk, &mut rng)
            })
            .collect();

        let mut merged = Batch::default();
        for part in parts {
            merged.summary.merge(&part.summary);
            merged.output.extend(part.output);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Measurements;
    use crate::cluster::TabulatedClusterYield;
    use crate::formula::ExpressionCompiler;
    use crate::kinematics::FourVector;
    use crate::species::{MassHypothesis, C_LIGHT, PID_UNIDENTIFIED};
    use crate::table::MapRule;
    use rand::RngCore;

    fn config(rules: Vec<MapRule>) -> StageConfig {
        StageConfig {
            efficiency_formula: rules,
            ..StageConfig::default()
        }
    }

    fn stage(rules: Vec<MapRule>) -> IdentificationStage {
        IdentificationStage::from_config(
            &config(rules),
            Arc::new(TabulatedClusterYield::new()),
            &ExpressionCompiler,
        )
        .expect("stage should build")
    }

    fn measured_track(pid: i32, charge: i32, p: f64, phi: f64) -> Candidate {
        let mass = MassHypothesis::Pion.mass();
        let momentum = FourVector::from_momentum_mass(p * phi.cos(), p * phi.sin(), 0.3 * p, mass);
        let tof_s = 2.0 * (mass * mass + p * p).sqrt() / (C_LIGHT * p);
        Candidate::new(pid, charge, momentum).with_measurements(Measurements {
            clusters: 1500.0,
            tof_s,
            path_length_mm: 2000.0,
            drift_length_m: 1.0,
        })
    }

    fn sample_event(n: usize) -> Vec<Candidate> {
        let codes: [i32; 7] = [211, -211, 321, -2212, 11, 22, 13];
        (0..n)
            .map(|i| {
                let pid = codes[i % codes.len()];
                let charge = if pid == 22 { 0 } else { pid.signum() };
                measured_track(pid, charge, 0.5 + 0.1 * i as f64, 0.3 * i as f64)
            })
            .collect()
    }

    fn lossy_rules() -> Vec<MapRule> {
        vec![
            MapRule::new(211, 211, "0.8"),
            MapRule::new(211, 321, "0.1"),
            MapRule::new(321, 321, "(pt > 1) * 0.9"),
            MapRule::new(0, 0, "0.7"),
        ]
    }

    #[test]
    fn test_default_table_retains_everything() {
        let s = stage(Vec::new());
        let mut event = sample_event(20);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let batch = s.process(&mut event, &mut rng);

        assert_eq!(batch.output.len(), 20);
        assert_eq!(batch.summary.dropped, 0);
        assert_eq!(batch.summary.relabeled, 0);
        let pids: Vec<i32> = batch.output.iter().map(|c| c.pid).collect();
        let expected: Vec<i32> = event.iter().map(|c| c.pid).collect();
        assert_eq!(pids, expected);
    }

    #[test]
    fn test_diagnostics_written_to_input_and_clone() {
        let s = stage(Vec::new());
        let mut event = vec![measured_track(22, 0, 1.0, 0.0), measured_track(211, 1, 1.0, 0.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let batch = s.process(&mut event, &mut rng);

        assert_eq!(event[0].diagnostics.pid_meas, PID_UNIDENTIFIED);
        assert_ne!(event[1].diagnostics.pid_meas, 0);
        assert_eq!(batch.output[1].diagnostics, event[1].diagnostics);
        assert_eq!(batch.summary.ineligible, 1);
    }

    #[test]
    fn test_ineligible_candidates_draw_once() {
        let s = stage(Vec::new());
        let mut event = vec![
            measured_track(11, -1, 1.0, 0.0),
            measured_track(22, 0, 2.0, 0.0),
            measured_track(13, 1, 3.0, 0.0),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        s.process(&mut event, &mut rng);

        let mut replay = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..3 {
            let _: f64 = replay.gen();
        }
        assert_eq!(rng.next_u64(), replay.next_u64());
    }

    #[test]
    fn test_dropped_candidates_leave_no_gap() {
        let s = stage(lossy_rules());
        let mut event = sample_event(200);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let batch = s.process(&mut event, &mut rng);

        assert!(batch.summary.dropped > 0);
        assert_eq!(batch.output.len(), batch.summary.retained);
        assert_eq!(batch.summary.retained + batch.summary.dropped, 200);

        // emitted candidates keep their relative input order
        let mut cursor = event.iter();
        for out in &batch.output {
            assert!(cursor.any(|c| c.momentum == out.momentum));
        }
    }

    #[test]
    fn test_sequential_processing_is_reproducible() {
        let s = stage(lossy_rules());
        let run = |seed| {
            let mut event = sample_event(100);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            s.process(&mut event, &mut rng)
        };
        let a = run(42);
        let b = run(42);
        assert_eq!(a.output, b.output);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn test_parallel_result_independent_of_thread_count() {
        let s = stage(lossy_rules());

        let mut event = sample_event(500);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .expect("thread pool");
        let single = pool.install(|| s.process_parallel(&mut event, 7, 64));

        let mut event = sample_event(500);
        let multi = s.process_parallel(&mut event, 7, 64);

        assert_eq!(single.output, multi.output);
        assert_eq!(single.summary, multi.summary);
        assert_eq!(multi.summary.processed, 500);
    }

    #[test]
    fn test_parallel_single_chunk_matches_sequential_stream_zero() {
        let s = stage(lossy_rules());

        let mut event = sample_event(50);
        let parallel = s.process_parallel(&mut event, 11, 1000);

        let mut event = sample_event(50);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        rng.set_stream(0);
        let sequential = s.process(&mut event, &mut rng);

        assert_eq!(parallel.output, sequential.output);
    }

    #[test]
    fn test_summary_merge_and_rate() {
        let mut a = StageSummary {
            processed: 4,
            dropped: 1,
            ..StageSummary::default()
        };
        let b = StageSummary {
            processed: 6,
            dropped: 4,
            ..StageSummary::default()
        };
        a.merge(&b);
        assert_eq!(a.processed, 10);
        assert!((a.drop_rate() - 0.5).abs() < 1e-12);
        assert_eq!(StageSummary::default().drop_rate(), 0.0);
    }
}
