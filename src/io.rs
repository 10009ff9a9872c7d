//! CSV candidate tables and the run manifest

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, Measurements, PidDiagnostics};
use crate::kinematics::FourVector;
use crate::stage::StageSummary;
use crate::PidError;

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

/// Flat CSV row for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub pid: i32,
    pub charge: i32,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
    pub truth_px: f64,
    pub truth_py: f64,
    pub truth_pz: f64,
    pub truth_e: f64,
    pub clusters: f64,
    pub tof_s: f64,
    pub path_length_mm: f64,
    pub drift_length_m: f64,
    #[serde(default)]
    pub chi_pi: f64,
    #[serde(default)]
    pub chi_k: f64,
    #[serde(default)]
    pub prob_pi: f64,
    #[serde(default)]
    pub prob_k: f64,
    #[serde(default)]
    pub prob_p: f64,
    #[serde(default)]
    pub pid_meas: i32,
}

impl From<&Candidate> for CandidateRecord {
    fn from(c: &Candidate) -> Self {
        Self {
            pid: c.pid,
            charge: c.charge,
            px: c.momentum.x,
            py: c.momentum.y,
            pz: c.momentum.z,
            e: c.momentum.t,
            x: c.position.x,
            y: c.position.y,
            z: c.position.z,
            t: c.position.t,
            truth_px: c.truth_momentum.x,
            truth_py: c.truth_momentum.y,
            truth_pz: c.truth_momentum.z,
            truth_e: c.truth_momentum.t,
            clusters: c.measurements.clusters,
            tof_s: c.measurements.tof_s,
            path_length_mm: c.measurements.path_length_mm,
            drift_length_m: c.measurements.drift_length_m,
            chi_pi: c.diagnostics.chi_pi,
            chi_k: c.diagnostics.chi_k,
            prob_pi: c.diagnostics.prob_pi,
            prob_k: c.diagnostics.prob_k,
            prob_p: c.diagnostics.prob_p,
            pid_meas: c.diagnostics.pid_meas,
        }
    }
}

impl From<CandidateRecord> for Candidate {
    fn from(r: CandidateRecord) -> Self {
        Self {
            pid: r.pid,
            charge: r.charge,
            momentum: FourVector::new(r.px, r.py, r.pz, r.e),
            position: FourVector::new(r.x, r.y, r.z, r.t),
            truth_momentum: FourVector::new(r.truth_px, r.truth_py, r.truth_pz, r.truth_e),
            measurements: Measurements {
                clusters: r.clusters,
                tof_s: r.tof_s,
                path_length_mm: r.path_length_mm,
                drift_length_m: r.drift_length_m,
            },
            diagnostics: PidDiagnostics {
                chi_pi: r.chi_pi,
                chi_k: r.chi_k,
                prob_pi: r.prob_pi,
                prob_k: r.prob_k,
                prob_p: r.prob_p,
                pid_meas: r.pid_meas,
            },
        }
    }
}

/// Run description written next to the output table
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub seed: u64,
    pub chunk_size: usize,
    pub input: String,
    pub summary: StageSummary,
}

pub fn ensure_outdir(outdir: &Path) -> Result<(), PidError> {
    fs::create_dir_all(outdir)?;
    Ok(())
}

pub fn read_candidates(path: &Path) -> Result<Vec<Candidate>, PidError> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut candidates = Vec::new();
    for (row, record) in rdr.deserialize::<CandidateRecord>().enumerate() {
        let record = record?;
        if !(-1..=1).contains(&record.charge) {
            return Err(PidError::InvalidInput(format!(
                "row {}: charge {} outside [-1, 1]",
                row + 1,
                record.charge
            )));
        }
        candidates.push(record.into());
    }
    Ok(candidates)
}

pub fn write_candidates(path: &Path, candidates: &[Candidate]) -> Result<(), PidError> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    for candidate in candidates {
        wtr.serialize(CandidateRecord::from(candidate))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_manifest_json(outdir: &Path, manifest: &Manifest) -> Result<PathBuf, PidError> {
    let path = outdir.join("manifest.json");
    let payload = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, payload)?;
    Ok(path)
}
