//! Field-level validation of portal submissions. Each payload mirrors one
//! intake form; `validate` either returns a cleaned record ready for
//! persistence or a map of per-field messages suitable for display.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::observation::{
    Analyte, FlowKind, FlowObservation, PfasObservation, Provenance, PwsId, RecordId, SourceName,
};
use crate::units::{to_gpm, to_ppt};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_owned()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// One PFAS analytical result as submitted through the portal form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PfasResultPayload {
    pub analyte: String,
    pub result: Option<f64>,
    pub unit: String,
    pub sampling_date: Option<NaiveDate>,
    pub analysis_date: Option<NaiveDate>,
    pub lab: Option<String>,
    pub analysis_method: Option<String>,
    pub lab_sample_id: Option<String>,
    pub filename: Option<String>,
    pub comments: Option<String>,
}

impl PfasResultPayload {
    pub fn validate(
        &self,
        pwsid: &PwsId,
        water_source_id: Option<i64>,
        source_name: &SourceName,
        now: DateTime<Utc>,
    ) -> Result<PfasObservation, FieldErrors> {
        let mut errors = FieldErrors::default();

        let analyte = self.analyte.trim();
        if analyte.is_empty() {
            errors.push("analyte", "Analyte is required");
        }

        let result = match self.result {
            Some(value) if value.is_finite() && value >= 0.0 => value,
            Some(_) => {
                errors.push("result", "Result must be a non-negative number");
                0.0
            }
            None => {
                errors.push("result", "Result is required");
                0.0
            }
        };

        let result_ppt = match to_ppt(result, &self.unit) {
            Ok(value) => value,
            Err(error) => {
                errors.push("unit", error.to_string());
                0.0
            }
        };

        let today = now.date_naive();
        if let Some(sampling_date) = self.sampling_date {
            if sampling_date > today {
                errors.push("sampling_date", "Sampling date cannot be in the future");
            }
        } else {
            errors.push("sampling_date", "Sampling date is required");
        }
        if let Some(analysis_date) = self.analysis_date {
            if analysis_date > today {
                errors.push("analysis_date", "Analysis date cannot be in the future");
            }
            if let Some(sampling_date) = self.sampling_date {
                if analysis_date < sampling_date {
                    errors.push(
                        "analysis_date",
                        "Analysis date cannot precede the sampling date",
                    );
                }
            }
        } else {
            errors.push("analysis_date", "Analysis date is required");
        }

        if self.filename.as_deref().map(str::trim).filter(|name| !name.is_empty()).is_none() {
            errors.push("filename", "A supporting lab report file is required");
        }

        let unit = self.unit.parse().unwrap_or(crate::units::ConcentrationUnit::Ppt);
        errors.into_result(PfasObservation {
            id: RecordId(Uuid::new_v4().to_string()),
            pwsid: pwsid.clone(),
            water_source_id,
            source_name: source_name.clone(),
            analyte: Analyte(analyte.to_owned()),
            result,
            unit,
            result_ppt,
            sampling_date: self.sampling_date,
            analysis_date: self.analysis_date,
            lab: trimmed(&self.lab),
            analysis_method: trimmed(&self.analysis_method),
            lab_sample_id: trimmed(&self.lab_sample_id),
            filename: trimmed(&self.filename),
            comments: trimmed(&self.comments),
            submitted_by_provider: true,
            submit_date: now,
            provenance: Provenance::ProviderUpdate,
        })
    }
}

/// Verified maximum flow as submitted through the portal form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxFlowPayload {
    pub flow_rate: Option<f64>,
    pub unit: String,
    pub flow_rate_reduced: Option<bool>,
    pub filename: Option<String>,
    pub comments: Option<String>,
}

impl MaxFlowPayload {
    pub fn validate(
        &self,
        pwsid: &PwsId,
        water_source_id: Option<i64>,
        source_name: &SourceName,
        now: DateTime<Utc>,
    ) -> Result<FlowObservation, FieldErrors> {
        let mut errors = FieldErrors::default();
        let (flow_rate, flow_rate_gpm) =
            validated_flow(&mut errors, self.flow_rate, &self.unit);

        if self.flow_rate_reduced == Some(true)
            && self.comments.as_deref().map(str::trim).filter(|c| !c.is_empty()).is_none()
        {
            errors.push("comments", "Explain why the maximum flow was reduced");
        }

        if self.filename.as_deref().map(str::trim).filter(|name| !name.is_empty()).is_none() {
            errors.push("filename", "A supporting document is required");
        }

        let unit = self.unit.parse().unwrap_or(crate::units::FlowUnit::Gpm);
        errors.into_result(FlowObservation {
            id: RecordId(Uuid::new_v4().to_string()),
            pwsid: pwsid.clone(),
            water_source_id,
            source_name: source_name.clone(),
            kind: FlowKind::MaxFlow,
            flow_rate,
            unit,
            flow_rate_gpm,
            flow_rate_reduced: self.flow_rate_reduced,
            filename: trimmed(&self.filename),
            comments: trimmed(&self.comments),
            submitted_by_provider: true,
            submit_date: now,
            provenance: Provenance::ProviderUpdate,
        })
    }
}

/// One year of annual production as submitted through the portal form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnualProductionPayload {
    pub year: Option<i32>,
    pub flow_rate: Option<f64>,
    pub unit: String,
    pub filename: Option<String>,
    pub comments: Option<String>,
}

impl AnnualProductionPayload {
    pub fn validate(
        &self,
        pwsid: &PwsId,
        water_source_id: Option<i64>,
        source_name: &SourceName,
        now: DateTime<Utc>,
    ) -> Result<FlowObservation, FieldErrors> {
        let mut errors = FieldErrors::default();
        let (flow_rate, flow_rate_gpm) =
            validated_flow(&mut errors, self.flow_rate, &self.unit);

        let year = match self.year {
            Some(year) if (1900..=now.date_naive().year()).contains(&year) => year,
            Some(_) => {
                errors.push("year", "Year is outside the accepted range");
                0
            }
            None => {
                errors.push("year", "Year is required");
                0
            }
        };

        if self.filename.as_deref().map(str::trim).filter(|name| !name.is_empty()).is_none() {
            errors.push("filename", "A supporting document is required");
        }

        let unit = self.unit.parse().unwrap_or(crate::units::FlowUnit::Gpy);
        errors.into_result(FlowObservation {
            id: RecordId(Uuid::new_v4().to_string()),
            pwsid: pwsid.clone(),
            water_source_id,
            source_name: source_name.clone(),
            kind: FlowKind::Annual { year },
            flow_rate,
            unit,
            flow_rate_gpm,
            flow_rate_reduced: None,
            filename: trimmed(&self.filename),
            comments: trimmed(&self.comments),
            submitted_by_provider: true,
            submit_date: now,
            provenance: Provenance::ProviderUpdate,
        })
    }
}

fn validated_flow(errors: &mut FieldErrors, flow_rate: Option<f64>, unit: &str) -> (f64, f64) {
    let flow_rate = match flow_rate {
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(_) => {
            errors.push("flow_rate", "Flow rate must be a non-negative number");
            0.0
        }
        None => {
            errors.push("flow_rate", "Flow rate is required");
            0.0
        }
    };

    let flow_rate_gpm = match to_gpm(flow_rate, unit) {
        Ok(value) => value,
        Err(error) => {
            errors.push("unit", error.to_string());
            0.0
        }
    };

    (flow_rate, flow_rate_gpm)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}
