//! PID-MAP - cluster-counting particle identification and PID relabeling
//!
//! A per-candidate decision stage for fast detector simulation. For each
//! charged track it tests the pion, kaon and proton mass hypotheses against
//! the measured ionization cluster count and time-of-flight, then resamples
//! the particle identity from a configurable probability table, which may
//! also drop the track entirely.

pub mod candidate;
pub mod cluster;
pub mod config;
pub mod efficiency;
pub mod formula;
pub mod io;
pub mod kinematics;
pub mod likelihood;
pub mod sampler;
pub mod species;
pub mod stage;
pub mod stats;
pub mod table;

use thiserror::Error;

// Re-export main types
pub use candidate::{Candidate, Measurements, PidDiagnostics};
pub use cluster::{ClusterYield, GasMixture, TabulatedClusterYield};
pub use config::StageConfig;
pub use efficiency::EfficiencyModel;
pub use formula::{ExpressionCompiler, Formula, FormulaCompiler};
pub use kinematics::FourVector;
pub use likelihood::{Evaluation, LikelihoodEngine};
pub use sampler::{Decision, RelabelingSampler};
pub use species::MassHypothesis;
pub use stage::{Batch, IdentificationStage, StageSummary};
pub use table::{Lookup, MapRule, ProbabilityTable};

#[derive(Debug, Error)]
pub enum PidError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cannot compile formula '{expression}' at offset {offset}: {message}")]
    Formula {
        expression: String,
        offset: usize,
        message: String,
    },
}
