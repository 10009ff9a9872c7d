//! Cluster-counting efficiency
//!
//! The counting efficiency is parametrized linearly in the cluster density
//! seen along the track, which grows as 1/sin(theta), and smeared with a
//! Gaussian on every call.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterYield, GasMixture};
use crate::PidError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyModel {
    /// Conversion of the yield into the parametrization unit (per cm)
    pub scale: f64,
    pub slope: f64,
    pub offset: f64,
    /// Width of the Gaussian smearing
    pub sigma: f64,
    /// Gas used for the yield entering the parametrization
    pub gas: GasMixture,
}

impl Default for EfficiencyModel {
    fn default() -> Self {
        Self {
            scale: 0.01,
            slope: -0.007309,
            offset: 1.245497,
            sigma: 0.02,
            gas: GasMixture::HeliumIsobutane,
        }
    }
}

impl EfficiencyModel {
    pub fn validate(&self) -> Result<(), PidError> {
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(PidError::InvalidConfig(
                "efficiency sigma must be finite and non-negative".to_string(),
            ));
        }
        if !(self.scale.is_finite() && self.slope.is_finite() && self.offset.is_finite()) {
            return Err(PidError::InvalidConfig(
                "efficiency scale, slope and offset must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Mean efficiency; not finite when |cos_theta| = 1
    pub fn central_value(&self, yields: &dyn ClusterYield, bg: f64, cos_theta: f64) -> f64 {
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        yields.clusters_per_meter(bg, self.gas) * self.scale * self.slope / sin_theta + self.offset
    }

    /// One smeared efficiency draw; always consumes exactly one normal sample
    pub fn sample<R: Rng + ?Sized>(
        &self,
        yields: &dyn ClusterYield,
        bg: f64,
        cos_theta: f64,
        rng: &mut R,
    ) -> f64 {
        let mean = self.central_value(yields, bg, cos_theta);
        let z: f64 = rng.sample(StandardNormal);
        mean + self.sigma * z
    }
}
