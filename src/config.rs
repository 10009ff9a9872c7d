//! Stage configuration loaded from TOML

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::GasMixture;
use crate::efficiency::EfficiencyModel;
use crate::likelihood::DEFAULT_TOF_RESOLUTION_S;
use crate::table::MapRule;
use crate::PidError;

/// Runtime configuration of the identification stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Seed of the random stream
    pub seed: u64,
    /// Drift-chamber gas
    pub gas: GasMixture,
    /// Time-of-flight resolution [s]
    pub tof_resolution_s: f64,
    /// Candidates per parallel chunk; 0 processes sequentially
    pub chunk_size: usize,
    pub efficiency: EfficiencyModel,
    /// Relabeling rules as `[input, output, "formula"]` triples
    pub efficiency_formula: Vec<MapRule>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_1D_u64,
            gas: GasMixture::HeliumIsobutane,
            tof_resolution_s: DEFAULT_TOF_RESOLUTION_S,
            chunk_size: 0,
            efficiency: EfficiencyModel::default(),
            efficiency_formula: Vec::new(),
        }
    }
}

impl StageConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, PidError> {
        let cfg: StageConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, PidError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), PidError> {
        if !(self.tof_resolution_s.is_finite() && self.tof_resolution_s > 0.0) {
            return Err(PidError::InvalidConfig(
                "tof_resolution_s must be finite and greater than zero".to_string(),
            ));
        }

        self.efficiency.validate()?;

        if let Some(rule) = self.efficiency_formula.iter().find(|r| r.formula.trim().is_empty()) {
            return Err(PidError::InvalidConfig(format!(
                "empty formula for input code {}",
                rule.input
            )));
        }

        Ok(())
    }
}
