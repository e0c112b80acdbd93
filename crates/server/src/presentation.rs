//! Builds the read-side views the portal serves: reconciled analyte rows,
//! the verified max flow, and the windowed annual-production table, with
//! every flow figure offered in the display units the intake forms use.

use chrono::{DateTime, Utc};
use serde::Serialize;

use aquaclaim_core::domain::observation::{
    FlowKind, FlowObservation, Observation, PfasObservation, Provenance,
};
use aquaclaim_core::domain::source::{Source, SourceMetrics};
use aquaclaim_core::metrics::{max_other_threshold, pfas_score};
use aquaclaim_core::reconcile::{reconcile, scoring_set, window_annuals, UPDATE_YEAR};
use aquaclaim_core::units::{gpm_to_afpy, gpm_to_gpy, gpm_to_mgd};

#[derive(Clone, Debug, Serialize)]
pub struct SourceView {
    pub pwsid: String,
    pub source_name: String,
    pub source_type: Option<String>,
    pub source_status: Option<String>,
    pub metrics: Option<MetricsView>,
    pub pfas_rows: Vec<PfasRow>,
    pub max_flow: Option<FlowRow>,
    pub annual_rows: Vec<AnnualRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsView {
    pub pfas_score: f64,
    pub pfas_score_method: &'static str,
    pub regulatory_bump: bool,
    pub all_nds: bool,
    pub afr_gpm: f64,
    pub afr_note: Option<String>,
    pub gfe_tyco: f64,
    pub gfe_basf: f64,
    pub gfe_total: f64,
    /// Shown next to the "other analytes" column: the level another analyte
    /// would have to reach before the alternate score could win.
    pub max_other_threshold_ppt: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PfasRow {
    pub analyte: String,
    pub result_ppt: f64,
    /// Normalized claim value for the analyte; the contractual floor.
    pub claim_ppt: Option<f64>,
    /// True when the displayed provider value sits below the claim floor.
    pub below_claim_floor: bool,
    pub sampling_date: Option<chrono::NaiveDate>,
    pub lab: Option<String>,
    pub provenance: &'static str,
    pub submit_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FlowRow {
    pub flow_rate_gpm: f64,
    pub flow_rate_gpy: f64,
    pub flow_rate_mgd: f64,
    pub flow_rate_afpy: f64,
    pub claim_gpm: Option<f64>,
    pub flow_rate_reduced: Option<bool>,
    pub provenance: &'static str,
    pub submit_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnnualRow {
    pub year: i32,
    pub flow_rate_gpm: f64,
    pub flow_rate_gpy: f64,
    pub flow_rate_mgd: f64,
    pub flow_rate_afpy: f64,
    /// Providers may still add or correct the live update year.
    pub editable: bool,
    pub provenance: &'static str,
}

/// Assembles the portal view of one source from its full record history and
/// its stored metrics.
pub fn build_source_view(
    source: &Source,
    pfas: &[PfasObservation],
    flows: &[FlowObservation],
) -> SourceView {
    let (pfas_claims, pfas_updates) = split_by_provenance(pfas);
    let (flow_claims, flow_updates) = split_by_provenance(flows);

    let pfas_rows = build_pfas_rows(&pfas_claims, &pfas_updates);
    let metrics = source
        .metrics
        .as_ref()
        .map(|metrics| build_metrics_view(metrics, &pfas_claims, &pfas_updates));
    let all_nds = metrics.as_ref().map(|m| m.all_nds).unwrap_or(false);

    let reconciled_flows = reconcile(&flow_claims, &flow_updates);
    let max_flow = reconciled_flows.values().find_map(|record| {
        if record.winner.kind != FlowKind::MaxFlow {
            return None;
        }
        Some(FlowRow {
            flow_rate_gpm: record.winner.flow_rate_gpm,
            flow_rate_gpy: gpm_to_gpy(record.winner.flow_rate_gpm),
            flow_rate_mgd: gpm_to_mgd(record.winner.flow_rate_gpm),
            flow_rate_afpy: gpm_to_afpy(record.winner.flow_rate_gpm),
            claim_gpm: record.lower_bound,
            flow_rate_reduced: record.winner.flow_rate_reduced,
            provenance: record.provenance.as_str(),
            submit_date: record.winner.submitted_at(),
        })
    });

    let reconciled_annuals: Vec<FlowObservation> = reconciled_flows
        .into_values()
        .filter(|record| matches!(record.winner.kind, FlowKind::Annual { .. }))
        .map(|record| record.winner)
        .collect();
    let windowed =
        window_annuals(&reconciled_annuals, all_nds, &source.pwsid, &source.source_name);
    let annual_rows = windowed
        .iter()
        .filter_map(|record| {
            let year = record.kind.year()?;
            Some(AnnualRow {
                year,
                flow_rate_gpm: record.flow_rate_gpm,
                flow_rate_gpy: gpm_to_gpy(record.flow_rate_gpm),
                flow_rate_mgd: gpm_to_mgd(record.flow_rate_gpm),
                flow_rate_afpy: gpm_to_afpy(record.flow_rate_gpm),
                editable: year == UPDATE_YEAR,
                provenance: record.provenance.as_str(),
            })
        })
        .collect();

    SourceView {
        pwsid: source.pwsid.0.clone(),
        source_name: source.source_name.0.clone(),
        source_type: source.source_type.clone(),
        source_status: source.source_status.clone(),
        metrics,
        pfas_rows,
        max_flow,
        annual_rows,
    }
}

fn build_pfas_rows(claims: &[PfasObservation], updates: &[PfasObservation]) -> Vec<PfasRow> {
    reconcile(claims, updates)
        .into_values()
        .map(|record| {
            let below_claim_floor = record
                .lower_bound
                .map(|floor| record.winner.normalized_value() < floor)
                .unwrap_or(false);
            PfasRow {
                analyte: record.winner.analyte.0.clone(),
                result_ppt: record.winner.result_ppt,
                claim_ppt: record.lower_bound,
                below_claim_floor,
                sampling_date: record.winner.sampling_date,
                lab: record.winner.lab.clone(),
                provenance: record.provenance.as_str(),
                submit_date: record.winner.submitted_at(),
            }
        })
        .collect()
}

fn build_metrics_view(
    metrics: &SourceMetrics,
    claims: &[PfasObservation],
    updates: &[PfasObservation],
) -> MetricsView {
    // The threshold depends on the scoring inputs, not the stored score, so
    // re-derive it from the same record set the derivation used.
    let scored = pfas_score(&scoring_set(claims, updates));

    MetricsView {
        pfas_score: metrics.pfas_score,
        pfas_score_method: metrics.pfas_score_method.as_str(),
        regulatory_bump: metrics.regulatory_bump,
        all_nds: metrics.all_nds,
        afr_gpm: metrics.afr,
        afr_note: metrics.afr_note.clone(),
        gfe_tyco: metrics.gfe_tyco,
        gfe_basf: metrics.gfe_basf,
        gfe_total: metrics.gfe_total,
        max_other_threshold_ppt: max_other_threshold(scored.pfoa_ppt, scored.pfos_ppt),
        computed_at: metrics.computed_at,
    }
}

fn split_by_provenance<T: Observation + Clone>(records: &[T]) -> (Vec<T>, Vec<T>) {
    let claims =
        records.iter().filter(|r| r.provenance() == Provenance::Claim).cloned().collect();
    let updates = records
        .iter()
        .filter(|r| r.provenance() == Provenance::ProviderUpdate)
        .cloned()
        .collect();
    (claims, updates)
}
