//! Conversions between reported measurement units and the canonical units the
//! engine computes in: parts-per-trillion for concentrations and gallons per
//! minute for flow rates.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const MINUTES_PER_DAY: f64 = 1440.0;
const MINUTES_PER_YEAR: f64 = 365.0 * 1440.0;
const GALLONS_PER_ACRE_FOOT: f64 = 325_851.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcentrationUnit {
    Ppt,
    Ppb,
    Ppm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowUnit {
    Gpm,
    Mgd,
    Gpy,
    Mgy,
    Afpy,
}

impl ConcentrationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ppt => "ppt",
            Self::Ppb => "ppb",
            Self::Ppm => "ppm",
        }
    }

    pub fn to_ppt(&self, value: f64) -> f64 {
        match self {
            Self::Ppt => value,
            Self::Ppb => value * 1e3,
            Self::Ppm => value * 1e6,
        }
    }
}

impl FlowUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpm => "gpm",
            Self::Mgd => "mgd",
            Self::Gpy => "gpy",
            Self::Mgy => "mgy",
            Self::Afpy => "afpy",
        }
    }

    pub fn to_gpm(&self, value: f64) -> f64 {
        match self {
            Self::Gpm => value,
            Self::Mgd => value * 1e6 / MINUTES_PER_DAY,
            Self::Gpy => value / MINUTES_PER_YEAR,
            Self::Mgy => value * 1e6 / MINUTES_PER_YEAR,
            Self::Afpy => value * GALLONS_PER_ACRE_FOOT / MINUTES_PER_YEAR,
        }
    }
}

impl std::str::FromStr for ConcentrationUnit {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ppt" => Ok(Self::Ppt),
            "ppb" => Ok(Self::Ppb),
            "ppm" => Ok(Self::Ppm),
            other => Err(DomainError::UnsupportedUnit { unit: other.to_owned() }),
        }
    }
}

impl std::str::FromStr for FlowUnit {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpm" => Ok(Self::Gpm),
            "mgd" => Ok(Self::Mgd),
            "gpy" => Ok(Self::Gpy),
            "mgy" => Ok(Self::Mgy),
            "afpy" => Ok(Self::Afpy),
            other => Err(DomainError::UnsupportedUnit { unit: other.to_owned() }),
        }
    }
}

/// Converts a reported concentration to parts-per-trillion.
pub fn to_ppt(value: f64, unit: &str) -> Result<f64, DomainError> {
    let unit: ConcentrationUnit = unit.parse()?;
    Ok(unit.to_ppt(value))
}

/// Converts a reported flow rate to gallons per minute.
pub fn to_gpm(value: f64, unit: &str) -> Result<f64, DomainError> {
    let unit: FlowUnit = unit.parse()?;
    Ok(unit.to_gpm(value))
}

// Display inverses from the canonical GPM, used by the presentation layer.

pub fn gpm_to_gpy(gpm: f64) -> f64 {
    gpm * MINUTES_PER_YEAR
}

pub fn gpm_to_mgd(gpm: f64) -> f64 {
    gpm * MINUTES_PER_DAY / 1e6
}

pub fn gpm_to_afpy(gpm: f64) -> f64 {
    gpm * MINUTES_PER_YEAR / GALLONS_PER_ACRE_FOOT
}

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;

    use super::{gpm_to_afpy, gpm_to_gpy, gpm_to_mgd, to_gpm, to_ppt};

    #[test]
    fn concentration_conversions_are_linear() {
        assert_eq!(to_ppt(2.5, "ppt").expect("ppt"), 2.5);
        assert_eq!(to_ppt(2.5, "ppb").expect("ppb"), 2_500.0);
        assert_eq!(to_ppt(2.5, "ppm").expect("ppm"), 2_500_000.0);
    }

    #[test]
    fn concentration_round_trips_through_the_inverse() {
        for (unit, factor) in [("ppt", 1.0), ("ppb", 1e3), ("ppm", 1e6)] {
            let forward = to_ppt(7.25, unit).expect("convert");
            assert!((forward / factor - 7.25).abs() < 1e-9, "unit {unit} should be linear");
        }
    }

    #[test]
    fn flow_conversions_match_reference_values() {
        assert_eq!(to_gpm(10.0, "gpm").expect("gpm"), 10.0);
        assert!((to_gpm(1.0, "mgd").expect("mgd") - 694.4444).abs() < 1e-3);
        assert!((to_gpm(525_600.0, "gpy").expect("gpy") - 1.0).abs() < 1e-9);
        assert!((to_gpm(1.0, "mgy").expect("mgy") - 1.9025875).abs() < 1e-6);
        assert!((to_gpm(1.0, "afpy").expect("afpy") - 325_851.0 / 525_600.0).abs() < 1e-9);
    }

    #[test]
    fn unit_parsing_is_case_insensitive() {
        assert_eq!(to_ppt(1.0, "PPB").expect("ppb"), 1e3);
        assert_eq!(to_gpm(1.0, " MGD ").expect("mgd"), 1e6 / 1440.0);
    }

    #[test]
    fn unknown_units_are_rejected() {
        let error = to_ppt(1.0, "mg/L").expect_err("unsupported");
        assert!(matches!(error, DomainError::UnsupportedUnit { ref unit } if unit == "mg/l"));

        let error = to_gpm(1.0, "liters").expect_err("unsupported");
        assert!(matches!(error, DomainError::UnsupportedUnit { .. }));
    }

    #[test]
    fn display_inverses_undo_the_canonical_conversion() {
        let gpm = to_gpm(3.0, "mgd").expect("mgd");
        assert!((gpm_to_mgd(gpm) - 3.0).abs() < 1e-9);

        let gpm = to_gpm(100_000.0, "gpy").expect("gpy");
        assert!((gpm_to_gpy(gpm) - 100_000.0).abs() < 1e-6);

        let gpm = to_gpm(12.0, "afpy").expect("afpy");
        assert!((gpm_to_afpy(gpm) - 12.0).abs() < 1e-9);
    }
}
