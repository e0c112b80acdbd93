//! Derivation of the per-source settlement metrics: PFAS exposure score,
//! regulatory bump, adjusted flow rate, and good-faith-estimate figures.
//!
//! Every function here is a pure function of its reconciled inputs. The
//! regression constants were fitted against the settlement matrix and must
//! not be rounded.

use tracing::warn;

use crate::domain::observation::{Observation, PfasObservation};
use crate::domain::source::{Defendant, ScoreMethod};

/// Normalized PFOA or PFOS at or above this level (ppt) triggers the
/// regulatory bump.
pub const REG_BUMP_THRESHOLD_PPT: f64 = 4.0;

/// AAFR averages the top annual values, zero-padded to this many years.
pub const AFR_YEARS: usize = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct PfasScore {
    pub score: f64,
    pub method: ScoreMethod,
    pub all_nds: bool,
    pub regulatory_bump: bool,
    pub pfoa_ppt: f64,
    pub pfos_ppt: f64,
    pub max_other_ppt: f64,
}

/// Scores a max-per-analyte reconciled result set.
pub fn pfas_score(results: &[PfasObservation]) -> PfasScore {
    let pfoa_ppt = results
        .iter()
        .find(|r| r.analyte.0 == crate::domain::observation::Analyte::PFOA)
        .map(|r| r.normalized_value())
        .unwrap_or(0.0);
    let pfos_ppt = results
        .iter()
        .find(|r| r.analyte.0 == crate::domain::observation::Analyte::PFOS)
        .map(|r| r.normalized_value())
        .unwrap_or(0.0);
    let max_other_ppt = results
        .iter()
        .filter(|r| !r.analyte.is_scored_directly())
        .map(|r| r.normalized_value())
        .fold(0.0, f64::max);

    let (score, method) = score_and_method(pfoa_ppt, pfos_ppt, max_other_ppt);

    PfasScore {
        score,
        method,
        all_nds: score == 0.0,
        regulatory_bump: pfoa_ppt >= REG_BUMP_THRESHOLD_PPT || pfos_ppt >= REG_BUMP_THRESHOLD_PPT,
        pfoa_ppt,
        pfos_ppt,
        max_other_ppt,
    }
}

/// Default score is PFOA + PFOS; the alternate averages the default with the
/// square root of the highest other analyte. The higher of the two wins.
pub fn score_and_method(pfoa_ppt: f64, pfos_ppt: f64, max_other_ppt: f64) -> (f64, ScoreMethod) {
    let default_score = pfoa_ppt + pfos_ppt;
    let alternate_score = (default_score + max_other_ppt.sqrt()) / 2.0;
    if default_score >= alternate_score {
        (default_score, ScoreMethod::MaxPfoaPfos)
    } else {
        (alternate_score, ScoreMethod::Alternate)
    }
}

/// Threshold shown next to the "max other analyte" column in the portal.
pub fn max_other_threshold(pfoa_ppt: f64, pfos_ppt: f64) -> f64 {
    let squared = (pfoa_ppt + pfos_ppt).powi(2);
    (squared * 10.0).round() / 10.0
}

#[derive(Clone, Debug, PartialEq)]
pub struct AfrResult {
    pub afr: f64,
    pub aafr: f64,
    pub vfr: f64,
    pub note: Option<String>,
}

/// Computes the adjusted flow rate from reconciled annual values (GPM) and
/// the verified max flow, annotating any data gaps.
pub fn afr_and_note(annual_gpm: &[f64], vfr: Option<f64>) -> AfrResult {
    let mut note_parts = Vec::new();

    let mut sorted: Vec<f64> = annual_gpm.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    sorted.resize(AFR_YEARS, 0.0);
    sorted.truncate(AFR_YEARS);

    if annual_gpm.is_empty() {
        note_parts.push("no annual production data provided".to_owned());
    } else if annual_gpm.len() < AFR_YEARS {
        note_parts
            .push(format!("only {} years of annual production provided", annual_gpm.len()));
    }

    let aafr = sorted.iter().sum::<f64>() / AFR_YEARS as f64;

    let vfr = match vfr {
        Some(value) if value.is_finite() => value,
        _ => {
            note_parts.push("vfr missing or invalid".to_owned());
            0.0
        }
    };

    let afr = (aafr + vfr) / 2.0;
    let note = if note_parts.is_empty() { None } else { Some(note_parts.join(" and ")) };

    AfrResult { afr, aafr, vfr, note }
}

struct GfeCoefficients {
    a: f64,
    b: f64,
    c: f64,
}

impl Defendant {
    fn coefficients(&self) -> GfeCoefficients {
        match self {
            Defendant::Tyco => {
                GfeCoefficients { a: 0.440_385_9, b: 0.693_928_5, c: 4.374_362_1 }
            }
            Defendant::Basf => {
                GfeCoefficients { a: 0.439_808_3, b: 0.693_843_0, c: 3.503_402_3 }
            }
        }
    }
}

/// Good-faith estimate for one defendant. A zero score or zero AFR yields a
/// zero estimate; that is a data gap, not an error.
pub fn gfe(defendant: Defendant, pfas_score: f64, afr: f64) -> f64 {
    let score = pfas_score.max(0.0);
    let afr = afr.max(0.0);

    if score == 0.0 || afr == 0.0 {
        warn!(
            event_name = "metrics.gfe_zeroed",
            defendant = defendant.as_str(),
            pfas_score = score,
            afr,
            "pfas score or afr is missing, gfe will be zero"
        );
        return 0.0;
    }

    let GfeCoefficients { a, b, c } = defendant.coefficients();
    let log_gfe = a * score.ln() + b * afr.ln() + c;
    log_gfe.exp()
}

#[derive(Clone, Debug, PartialEq)]
pub struct GfeResult {
    pub tyco: f64,
    pub basf: f64,
    pub total: f64,
}

pub fn gfes(pfas_score: f64, afr: f64) -> GfeResult {
    let tyco = gfe(Defendant::Tyco, pfas_score, afr);
    let basf = gfe(Defendant::Basf, pfas_score, afr);
    GfeResult { tyco, basf, total: tyco + basf }
}
