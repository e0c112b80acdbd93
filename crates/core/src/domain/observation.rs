use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::units::{ConcentrationUnit, FlowUnit};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PwsId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceName(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Analyte(pub String);

impl Analyte {
    pub const PFOA: &'static str = "PFOA";
    pub const PFOS: &'static str = "PFOS";

    pub fn pfoa() -> Self {
        Self(Self::PFOA.to_owned())
    }

    pub fn pfos() -> Self {
        Self(Self::PFOS.to_owned())
    }

    /// PFOA and PFOS drive the default score and the regulatory bump; every
    /// other analyte only contributes through the alternate-score path.
    pub fn is_scored_directly(&self) -> bool {
        self.0 == Self::PFOA || self.0 == Self::PFOS
    }
}

/// Where a record came from. Claims are the immutable intake baseline;
/// provider updates are portal submissions; placeholders are synthesized so
/// downstream scoring and display always have their required keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Claim,
    ProviderUpdate,
    Placeholder,
    NotAvailable,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim intake",
            Self::ProviderUpdate => "update portal",
            Self::Placeholder => "placeholder",
            Self::NotAvailable => "not available",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowKind {
    MaxFlow,
    Annual { year: i32 },
}

impl FlowKind {
    /// Storage tag for the kind column (`VFR` for peak flow, `AFR` for annual
    /// production), mirroring the claim workbook vocabulary.
    pub fn variable(&self) -> &'static str {
        match self {
            Self::MaxFlow => "VFR",
            Self::Annual { .. } => "AFR",
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            Self::MaxFlow => None,
            Self::Annual { year } => Some(*year),
        }
    }

    pub fn from_variable(variable: &str, year: Option<i32>) -> Result<Self, DomainError> {
        match (variable, year) {
            ("VFR", _) => Ok(Self::MaxFlow),
            ("AFR", Some(year)) => Ok(Self::Annual { year }),
            ("AFR", None) => {
                Err(DomainError::InvalidKey { kind: "AFR without a year".to_owned() })
            }
            (other, _) => Err(DomainError::InvalidKey { kind: other.to_owned() }),
        }
    }
}

/// Logical key one reconciled value exists for at any time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservationKey {
    Analyte(Analyte),
    Flow(FlowKind),
}

impl std::fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analyte(analyte) => write!(f, "analyte:{}", analyte.0),
            Self::Flow(FlowKind::MaxFlow) => write!(f, "flow:max"),
            Self::Flow(FlowKind::Annual { year }) => write!(f, "flow:annual:{year}"),
        }
    }
}

/// Common capability surface over both record kinds, so reconciliation can
/// merge them without caring which table they came from.
pub trait Observation {
    fn key(&self) -> ObservationKey;
    fn value(&self) -> f64;
    fn normalized_value(&self) -> f64;
    fn submitted_at(&self) -> DateTime<Utc>;
    fn submitted_by_provider(&self) -> bool;
    fn provenance(&self) -> Provenance;
    /// Field names that must be present for this record to win reconciliation.
    fn missing_required_fields(&self) -> Vec<String>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PfasObservation {
    pub id: RecordId,
    pub pwsid: PwsId,
    pub water_source_id: Option<i64>,
    pub source_name: SourceName,
    pub analyte: Analyte,
    pub result: f64,
    pub unit: ConcentrationUnit,
    pub result_ppt: f64,
    pub sampling_date: Option<NaiveDate>,
    pub analysis_date: Option<NaiveDate>,
    pub lab: Option<String>,
    pub analysis_method: Option<String>,
    pub lab_sample_id: Option<String>,
    pub filename: Option<String>,
    pub comments: Option<String>,
    pub submitted_by_provider: bool,
    pub submit_date: DateTime<Utc>,
    pub provenance: Provenance,
}

impl PfasObservation {
    /// Zero-valued stand-in for an analyte with no observation on file.
    pub fn not_available(
        pwsid: PwsId,
        water_source_id: Option<i64>,
        source_name: SourceName,
        analyte: Analyte,
    ) -> Self {
        Self {
            id: RecordId(format!("na-{}-{}", source_name.0, analyte.0)),
            pwsid,
            water_source_id,
            source_name,
            analyte,
            result: 0.0,
            unit: ConcentrationUnit::Ppt,
            result_ppt: 0.0,
            sampling_date: None,
            analysis_date: None,
            lab: None,
            analysis_method: None,
            lab_sample_id: None,
            filename: None,
            comments: None,
            submitted_by_provider: false,
            submit_date: DateTime::<Utc>::UNIX_EPOCH,
            provenance: Provenance::NotAvailable,
        }
    }
}

impl Observation for PfasObservation {
    fn key(&self) -> ObservationKey {
        ObservationKey::Analyte(self.analyte.clone())
    }

    fn value(&self) -> f64 {
        self.result
    }

    fn normalized_value(&self) -> f64 {
        self.result_ppt
    }

    fn submitted_at(&self) -> DateTime<Utc> {
        self.submit_date
    }

    fn submitted_by_provider(&self) -> bool {
        self.submitted_by_provider
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.analyte.0.trim().is_empty() {
            missing.push("analyte".to_owned());
        }
        if !self.result_ppt.is_finite() {
            missing.push("result_ppt".to_owned());
        }
        missing
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowObservation {
    pub id: RecordId,
    pub pwsid: PwsId,
    pub water_source_id: Option<i64>,
    pub source_name: SourceName,
    pub kind: FlowKind,
    pub flow_rate: f64,
    pub unit: FlowUnit,
    pub flow_rate_gpm: f64,
    pub flow_rate_reduced: Option<bool>,
    pub filename: Option<String>,
    pub comments: Option<String>,
    pub submitted_by_provider: bool,
    pub submit_date: DateTime<Utc>,
    pub provenance: Provenance,
}

impl FlowObservation {
    /// Zero-production placeholder for a display year with no record on file.
    pub fn placeholder_year(pwsid: PwsId, source_name: SourceName, year: i32) -> Self {
        Self {
            id: RecordId(format!("ph-{}-{year}", source_name.0)),
            pwsid,
            water_source_id: None,
            source_name,
            kind: FlowKind::Annual { year },
            flow_rate: 0.0,
            unit: FlowUnit::Gpy,
            flow_rate_gpm: 0.0,
            flow_rate_reduced: None,
            filename: None,
            comments: None,
            submitted_by_provider: true,
            submit_date: DateTime::<Utc>::UNIX_EPOCH,
            provenance: Provenance::Placeholder,
        }
    }
}

impl Observation for FlowObservation {
    fn key(&self) -> ObservationKey {
        ObservationKey::Flow(self.kind)
    }

    fn value(&self) -> f64 {
        self.flow_rate
    }

    fn normalized_value(&self) -> f64 {
        self.flow_rate_gpm
    }

    fn submitted_at(&self) -> DateTime<Utc> {
        self.submit_date
    }

    fn submitted_by_provider(&self) -> bool {
        self.submitted_by_provider
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.flow_rate_gpm.is_finite() {
            missing.push("flow_rate_gpm".to_owned());
        }
        if let FlowKind::Annual { year } = self.kind {
            if year <= 0 {
                missing.push("year".to_owned());
            }
        }
        missing
    }
}
