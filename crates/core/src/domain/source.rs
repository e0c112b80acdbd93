use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::observation::{PwsId, SourceName};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Defendant {
    Tyco,
    Basf,
}

impl Defendant {
    pub const ALL: [Defendant; 2] = [Defendant::Tyco, Defendant::Basf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tyco => "Tyco",
            Self::Basf => "BASF",
        }
    }
}

impl std::str::FromStr for Defendant {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tyco" => Ok(Self::Tyco),
            "basf" => Ok(Self::Basf),
            other => Err(DomainError::InvalidDefendant(other.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMethod {
    MaxPfoaPfos,
    Alternate,
}

impl ScoreMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxPfoaPfos => "max_pfoa_pfos",
            Self::Alternate => "alternate",
        }
    }
}

/// Derived per-source metrics. Written only by the update orchestrator;
/// providers never edit these directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub pfas_score: f64,
    pub pfas_score_method: ScoreMethod,
    pub regulatory_bump: bool,
    pub all_nds: bool,
    pub afr: f64,
    pub afr_note: Option<String>,
    pub gfe_tyco: f64,
    pub gfe_basf: f64,
    pub gfe_total: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub pwsid: PwsId,
    pub source_name: SourceName,
    pub water_source_id: Option<i64>,
    pub source_type: Option<String>,
    pub source_status: Option<String>,
    pub metrics: Option<SourceMetrics>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PwsTotals {
    pub gfe_tyco: f64,
    pub gfe_basf: f64,
    pub gfe_total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pws {
    pub pwsid: PwsId,
    pub pws_name: Option<String>,
    pub totals: Option<PwsTotals>,
    pub submit_date: Option<DateTime<Utc>>,
}
