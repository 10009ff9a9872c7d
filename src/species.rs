//! Species codes and mass hypotheses

/// Speed of light [m/s]
pub const C_LIGHT: f64 = 2.997_924_58e8;

/// `pid_meas` value for candidates that cannot be identified
pub const PID_UNIDENTIFIED: i32 = -1;

pub const PION_CODE: i32 = 211;
pub const KAON_CODE: i32 = 321;
pub const PROTON_CODE: i32 = 2212;

/// Mass hypotheses tested by the likelihood engine, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MassHypothesis {
    Pion,
    Kaon,
    Proton,
}

impl MassHypothesis {
    pub const ALL: [MassHypothesis; 3] = [Self::Pion, Self::Kaon, Self::Proton];

    /// Rest mass [GeV]
    pub fn mass(self) -> f64 {
        match self {
            Self::Pion => 0.13957,
            Self::Kaon => 0.49368,
            Self::Proton => 0.93827,
        }
    }

    /// Unsigned species code
    pub fn code(self) -> i32 {
        match self {
            Self::Pion => PION_CODE,
            Self::Kaon => KAON_CODE,
            Self::Proton => PROTON_CODE,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Pion => 0,
            Self::Kaon => 1,
            Self::Proton => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pion => "pion",
            Self::Kaon => "kaon",
            Self::Proton => "proton",
        }
    }
}

/// True for charged pions, kaons and protons of either sign
pub fn is_identifiable(code: i32) -> bool {
    matches!(code.abs(), PION_CODE | KAON_CODE | PROTON_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiable_codes() {
        for code in [211, -211, 321, -321, 2212, -2212] {
            assert!(is_identifiable(code), "{code}");
        }
        for code in [0, 11, -13, 22, 130, 2112] {
            assert!(!is_identifiable(code), "{code}");
        }
    }

    #[test]
    fn test_hypotheses_are_ordered_by_mass() {
        let masses: Vec<f64> = MassHypothesis::ALL.iter().map(|h| h.mass()).collect();
        assert!(masses.windows(2).all(|w| w[0] < w[1]));
        for (i, h) in MassHypothesis::ALL.iter().enumerate() {
            assert_eq!(h.index(), i);
        }
    }
}
