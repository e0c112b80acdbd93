//! Drives one provider submission through its full lifecycle: validate the
//! payload, persist the observation, re-derive the source metrics, and
//! re-aggregate the provider totals. Transitions come from the update state
//! machine; this module supplies the side effects.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use aquaclaim_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use aquaclaim_core::domain::observation::{
    FlowKind, FlowObservation, Observation, PfasObservation, Provenance, PwsId, RecordId,
    SourceName,
};
use aquaclaim_core::domain::source::SourceMetrics;
use aquaclaim_core::errors::ApplicationError;
use aquaclaim_core::flows::{
    SourceUpdateFlow, UpdateContext, UpdateEngine, UpdateEvent, UpdateKind, UpdateState,
};
use aquaclaim_core::metrics::{afr_and_note, gfes, pfas_score};
use aquaclaim_core::reconcile::{ensure_pfoa_pfos, scoring_annuals, scoring_set};
use aquaclaim_core::validation::{
    AnnualProductionPayload, FieldErrors, MaxFlowPayload, PfasResultPayload,
};

use crate::repositories::{
    AuditEventRepository, FlowRateRepository, PfasResultRepository, PwsRepository,
    RepositoryError, SourceRepository,
};

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionReceipt {
    pub record_id: RecordId,
    pub state: UpdateState,
    pub correlation_id: String,
    /// Metrics after this submission, absent when derivation hit a data gap.
    pub metrics: Option<SourceMetrics>,
}

pub struct UpdateService {
    systems: Arc<dyn PwsRepository>,
    sources: Arc<dyn SourceRepository>,
    pfas_results: Arc<dyn PfasResultRepository>,
    flow_rates: Arc<dyn FlowRateRepository>,
    audit: Arc<dyn AuditEventRepository>,
}

impl UpdateService {
    pub fn new(
        systems: Arc<dyn PwsRepository>,
        sources: Arc<dyn SourceRepository>,
        pfas_results: Arc<dyn PfasResultRepository>,
        flow_rates: Arc<dyn FlowRateRepository>,
        audit: Arc<dyn AuditEventRepository>,
    ) -> Self {
        Self { systems, sources, pfas_results, flow_rates, audit }
    }

    pub async fn submit_pfas_result(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        payload: PfasResultPayload,
    ) -> Result<SubmissionReceipt, ApplicationError> {
        let water_source_id = self.require_source(pwsid, source_name).await?;
        let validated = payload.validate(pwsid, water_source_id, source_name, Utc::now());
        self.run_submission(UpdateKind::PfasResult, pwsid, source_name, validated, |record| {
            let repo = self.pfas_results.clone();
            let id = record.id.clone();
            async move { repo.insert(record).await.map(|_| id) }
        })
        .await
    }

    pub async fn submit_max_flow(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        payload: MaxFlowPayload,
    ) -> Result<SubmissionReceipt, ApplicationError> {
        let water_source_id = self.require_source(pwsid, source_name).await?;
        let validated = payload.validate(pwsid, water_source_id, source_name, Utc::now());
        self.run_submission(UpdateKind::MaxFlow, pwsid, source_name, validated, |record| {
            let repo = self.flow_rates.clone();
            let id = record.id.clone();
            async move { repo.insert(record).await.map(|_| id) }
        })
        .await
    }

    pub async fn submit_annual_production(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        payload: AnnualProductionPayload,
    ) -> Result<SubmissionReceipt, ApplicationError> {
        let water_source_id = self.require_source(pwsid, source_name).await?;
        let validated = payload.validate(pwsid, water_source_id, source_name, Utc::now());
        self.run_submission(
            UpdateKind::AnnualProduction,
            pwsid,
            source_name,
            validated,
            |record| {
                let repo = self.flow_rates.clone();
                let id = record.id.clone();
                async move { repo.insert(record).await.map(|_| id) }
            },
        )
        .await
    }

    async fn run_submission<T, S, F>(
        &self,
        kind: UpdateKind,
        pwsid: &PwsId,
        source_name: &SourceName,
        validated: Result<T, FieldErrors>,
        store: S,
    ) -> Result<SubmissionReceipt, ApplicationError>
    where
        T: Observation,
        S: FnOnce(T) -> F,
        F: std::future::Future<Output = Result<RecordId, RepositoryError>>,
    {
        let engine = UpdateEngine::new(SourceUpdateFlow::new(kind));
        let context = UpdateContext::default();
        let correlation_id = Uuid::new_v4().to_string();
        let mut state = engine.initial_state();

        let record = match validated {
            Ok(record) => record,
            Err(errors) => {
                state = self
                    .advance(&engine, &state, &UpdateEvent::PayloadRejected, &context, pwsid, source_name, &correlation_id)
                    .await;
                debug_assert_eq!(state, UpdateState::Failed);
                return Err(ApplicationError::Validation(errors));
            }
        };

        state = self
            .advance(&engine, &state, &UpdateEvent::PayloadAccepted, &context, pwsid, source_name, &correlation_id)
            .await;

        let record_id = match store(record).await {
            Ok(id) => id,
            Err(error) => {
                self.advance(&engine, &state, &UpdateEvent::StorageFailed, &context, pwsid, source_name, &correlation_id)
                    .await;
                return Err(ApplicationError::Persistence(error.to_string()));
            }
        };

        state = self
            .advance(&engine, &state, &UpdateEvent::ObservationStored, &context, pwsid, source_name, &correlation_id)
            .await;

        // Persist-first: a derivation gap never rolls back the stored record.
        let metrics = match self.derive_and_store_metrics(pwsid, source_name).await {
            Ok(metrics) => {
                state = self
                    .advance(&engine, &state, &UpdateEvent::MetricsDerived, &context, pwsid, source_name, &correlation_id)
                    .await;
                Some(metrics)
            }
            Err(error) => {
                warn!(
                    event_name = "update.derivation_gap",
                    pwsid = %pwsid.0,
                    source_name = %source_name.0,
                    error = %error,
                    "metrics derivation failed after persisting the observation"
                );
                self.append_event(
                    pwsid,
                    source_name,
                    &correlation_id,
                    "metrics.derivation_gap",
                    AuditCategory::Metrics,
                    AuditOutcome::Failed,
                )
                .await;
                state = self
                    .advance(&engine, &state, &UpdateEvent::DerivationFailed, &context, pwsid, source_name, &correlation_id)
                    .await;
                None
            }
        };

        // Totals lag behind until the next recompute if aggregation fails;
        // the persisted observation and source metrics are never taken back.
        match self.systems.aggregate_totals(pwsid).await {
            Ok(()) => {
                self.append_event(
                    pwsid,
                    source_name,
                    &correlation_id,
                    "aggregation.totals_refreshed",
                    AuditCategory::Aggregation,
                    AuditOutcome::Success,
                )
                .await;
            }
            Err(error) => {
                warn!(
                    event_name = "update.aggregation_gap",
                    pwsid = %pwsid.0,
                    source_name = %source_name.0,
                    error = %error,
                    "provider totals aggregation failed after persisting the observation"
                );
                self.append_event(
                    pwsid,
                    source_name,
                    &correlation_id,
                    "aggregation.totals_failed",
                    AuditCategory::Aggregation,
                    AuditOutcome::Failed,
                )
                .await;
            }
        }

        state = self
            .advance(&engine, &state, &UpdateEvent::SubmissionAcknowledged, &context, pwsid, source_name, &correlation_id)
            .await;

        info!(
            event_name = "update.submission_complete",
            pwsid = %pwsid.0,
            source_name = %source_name.0,
            correlation_id = %correlation_id,
            "provider submission processed"
        );

        Ok(SubmissionReceipt { record_id, state, correlation_id, metrics })
    }

    /// Re-derives and stores the metrics for one source from its full record
    /// history. Used by the submission path and by batch recomputes.
    pub async fn derive_and_store_metrics(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<SourceMetrics, ApplicationError> {
        let water_source_id = self.require_source(pwsid, source_name).await?;

        let pfas = self
            .pfas_results
            .list_for_source(pwsid, source_name)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        let flows = self
            .flow_rates
            .list_for_source(pwsid, source_name)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;

        let metrics = derive_metrics(pwsid, water_source_id, source_name, &pfas, &flows);

        self.sources
            .save_metrics(pwsid, source_name, &metrics)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;

        Ok(metrics)
    }

    /// Recomputes every source of a provider and refreshes its totals.
    pub async fn recompute_pws(&self, pwsid: &PwsId) -> Result<usize, ApplicationError> {
        let sources = self
            .sources
            .list_for_pws(pwsid)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;

        let mut recomputed = 0;
        for source in &sources {
            self.derive_and_store_metrics(pwsid, &source.source_name).await?;
            recomputed += 1;
        }

        self.systems
            .aggregate_totals(pwsid)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;

        Ok(recomputed)
    }

    async fn require_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Option<i64>, ApplicationError> {
        let source = self
            .sources
            .find(pwsid, source_name)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;

        match source {
            Some(source) => Ok(source.water_source_id),
            None => {
                let mut errors = FieldErrors::default();
                errors.push("source_name", "Unknown water source for this provider");
                Err(ApplicationError::Validation(errors))
            }
        }
    }

    async fn advance(
        &self,
        engine: &UpdateEngine<SourceUpdateFlow>,
        state: &UpdateState,
        event: &UpdateEvent,
        context: &UpdateContext,
        pwsid: &PwsId,
        source_name: &SourceName,
        correlation_id: &str,
    ) -> UpdateState {
        match engine.apply(state, event, context) {
            Ok(outcome) => {
                self.audit
                    .append(
                        AuditEvent::new(
                            Some(pwsid.clone()),
                            Some(source_name.clone()),
                            correlation_id,
                            "update.transition_applied",
                            AuditCategory::Submission,
                            "update-orchestrator",
                            AuditOutcome::Success,
                        )
                        .with_metadata("from", format!("{:?}", outcome.from))
                        .with_metadata("to", format!("{:?}", outcome.to))
                        .with_metadata("event", format!("{:?}", outcome.event)),
                    )
                    .await
                    .ok();
                outcome.to
            }
            Err(error) => {
                // Transition table and driver are maintained together; a
                // rejected event here is a bug, not a user error.
                warn!(
                    event_name = "update.transition_rejected",
                    error = %error,
                    "update state machine rejected an orchestrator event"
                );
                UpdateState::Failed
            }
        }
    }

    async fn append_event(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        correlation_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) {
        self.audit
            .append(AuditEvent::new(
                Some(pwsid.clone()),
                Some(source_name.clone()),
                correlation_id,
                event_type,
                category,
                "update-orchestrator",
                outcome,
            ))
            .await
            .ok();
    }
}

/// Pure derivation over the source's full record history: reconcile, score,
/// compute the adjusted flow rate, and price both good-faith estimates.
pub fn derive_metrics(
    pwsid: &PwsId,
    water_source_id: Option<i64>,
    source_name: &SourceName,
    pfas: &[PfasObservation],
    flows: &[FlowObservation],
) -> SourceMetrics {
    let (pfas_claims, pfas_updates) = split_by_provenance(pfas);
    let mut scored = scoring_set(&pfas_claims, &pfas_updates);
    ensure_pfoa_pfos(&mut scored, pwsid, water_source_id, source_name);
    let score = pfas_score(&scored);

    let (flow_claims, flow_updates) = split_by_provenance(flows);
    let best_flows = scoring_set(&flow_claims, &flow_updates);
    let vfr = best_flows
        .iter()
        .find(|record| record.kind == FlowKind::MaxFlow)
        .map(|record| record.flow_rate_gpm);
    let annual_gpm: Vec<f64> = scoring_annuals(&flow_claims, &flow_updates)
        .iter()
        .map(|record| record.flow_rate_gpm)
        .collect();

    let afr = afr_and_note(&annual_gpm, vfr);
    let gfe = gfes(score.score, afr.afr);

    SourceMetrics {
        pfas_score: score.score,
        pfas_score_method: score.method,
        regulatory_bump: score.regulatory_bump,
        all_nds: score.all_nds,
        afr: afr.afr,
        afr_note: afr.note,
        gfe_tyco: gfe.tyco,
        gfe_basf: gfe.basf,
        gfe_total: gfe.total,
        computed_at: Utc::now(),
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, Utc};

    use aquaclaim_core::domain::observation::{
        Analyte, FlowKind, FlowObservation, PfasObservation, Provenance, PwsId, RecordId,
        SourceName,
    };
    use aquaclaim_core::domain::source::{Pws, ScoreMethod, Source};
    use aquaclaim_core::errors::ApplicationError;
    use aquaclaim_core::flows::UpdateState;
    use aquaclaim_core::units::{ConcentrationUnit, FlowUnit};
    use aquaclaim_core::validation::{MaxFlowPayload, PfasResultPayload};

    use super::{derive_metrics, UpdateService};
    use crate::repositories::{
        AuditEventRepository, FlowRateRepository, InMemoryFlowRateRepository,
        InMemoryPfasResultRepository, InMemoryPwsRepository, InMemorySourceRepository,
        PfasResultRepository, PwsRepository, RepositoryError, SourceRepository,
        SqlAuditEventRepository, SqlFlowRateRepository, SqlPfasResultRepository,
        SqlPwsRepository, SqlSourceRepository,
    };
    use crate::{connect_with_settings, migrations};

    fn pwsid() -> PwsId {
        PwsId("CA0000001".to_owned())
    }

    fn source_name() -> SourceName {
        SourceName("Well 01".to_owned())
    }

    async fn service() -> (
        UpdateService,
        Arc<InMemoryPwsRepository>,
        Arc<InMemorySourceRepository>,
        Arc<InMemoryPfasResultRepository>,
        Arc<InMemoryFlowRateRepository>,
        Arc<SqlAuditEventRepository>,
    ) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let sources = Arc::new(InMemorySourceRepository::default());
        let systems = Arc::new(InMemoryPwsRepository::with_sources(sources.clone()));
        let pfas = Arc::new(InMemoryPfasResultRepository::default());
        let flows = Arc::new(InMemoryFlowRateRepository::default());
        let audit = Arc::new(SqlAuditEventRepository::new(pool));

        systems
            .save(Pws { pwsid: pwsid(), pws_name: None, totals: None, submit_date: None })
            .await
            .expect("seed pws");
        sources
            .save(Source {
                pwsid: pwsid(),
                source_name: source_name(),
                water_source_id: Some(1),
                source_type: Some("Well".to_owned()),
                source_status: Some("Active".to_owned()),
                metrics: None,
            })
            .await
            .expect("seed source");

        let service = UpdateService::new(
            systems.clone(),
            sources.clone(),
            pfas.clone(),
            flows.clone(),
            audit.clone(),
        );
        (service, systems, sources, pfas, flows, audit)
    }

    fn pfas_payload(analyte: &str, result: f64) -> PfasResultPayload {
        PfasResultPayload {
            analyte: analyte.to_owned(),
            result: Some(result),
            unit: "ppt".to_owned(),
            sampling_date: NaiveDate::from_ymd_opt(2023, 4, 1),
            analysis_date: NaiveDate::from_ymd_opt(2023, 4, 10),
            filename: Some("lab.pdf".to_owned()),
            ..PfasResultPayload::default()
        }
    }

    fn claim_pfas(analyte: &str, ppt: f64) -> PfasObservation {
        PfasObservation {
            id: RecordId(format!("claim-{analyte}")),
            pwsid: pwsid(),
            water_source_id: Some(1),
            source_name: source_name(),
            analyte: Analyte(analyte.to_owned()),
            result: ppt,
            unit: ConcentrationUnit::Ppt,
            result_ppt: ppt,
            sampling_date: None,
            analysis_date: None,
            lab: None,
            analysis_method: None,
            lab_sample_id: None,
            filename: None,
            comments: None,
            submitted_by_provider: false,
            submit_date: Utc::now() - Duration::days(365),
            provenance: Provenance::Claim,
        }
    }

    fn claim_annual(year: i32, gpm: f64) -> FlowObservation {
        FlowObservation {
            id: RecordId(format!("claim-{year}")),
            pwsid: pwsid(),
            water_source_id: Some(1),
            source_name: source_name(),
            kind: FlowKind::Annual { year },
            flow_rate: gpm,
            unit: FlowUnit::Gpm,
            flow_rate_gpm: gpm,
            flow_rate_reduced: None,
            filename: None,
            comments: None,
            submitted_by_provider: false,
            submit_date: Utc::now() - Duration::days(365),
            provenance: Provenance::Claim,
        }
    }

    #[tokio::test]
    async fn pfas_submission_runs_the_full_lifecycle() {
        let (service, systems, sources, _pfas, _flows, audit) = service().await;

        let receipt = service
            .submit_pfas_result(&pwsid(), &source_name(), pfas_payload("PFOA", 6.0))
            .await
            .expect("submission");

        assert_eq!(receipt.state, UpdateState::Complete);
        let metrics = receipt.metrics.expect("metrics derived");
        assert_eq!(metrics.pfas_score, 6.0);
        assert!(metrics.regulatory_bump);

        let stored = sources
            .find(&pwsid(), &source_name())
            .await
            .expect("find")
            .expect("exists")
            .metrics
            .expect("metrics persisted");
        assert_eq!(stored.pfas_score, 6.0);

        let totals = systems
            .find(&pwsid())
            .await
            .expect("find pws")
            .expect("exists")
            .totals
            .expect("totals aggregated");
        // Score is present but AFR is zero, so estimates stay zero.
        assert_eq!(totals.gfe_total, 0.0);

        let trail = audit.list_for_pws(&pwsid(), 50).await.expect("audit trail");
        assert!(trail.iter().any(|e| e.event_type == "update.transition_applied"));
        assert!(trail.iter().any(|e| e.event_type == "aggregation.totals_refreshed"));
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_any_write() {
        let (service, _systems, _sources, pfas, _flows, audit) = service().await;

        let error = service
            .submit_pfas_result(
                &pwsid(),
                &source_name(),
                PfasResultPayload { analyte: "PFOA".to_owned(), ..PfasResultPayload::default() },
            )
            .await
            .expect_err("invalid payload");

        assert!(matches!(error, ApplicationError::Validation(_)));
        let stored = pfas.list_for_source(&pwsid(), &source_name()).await.expect("list");
        assert!(stored.is_empty(), "rejected payloads must not be stored");

        let trail = audit.list_for_pws(&pwsid(), 50).await.expect("audit trail");
        assert!(trail
            .iter()
            .any(|e| e.metadata.get("to").map(String::as_str) == Some("Failed")));
    }

    #[tokio::test]
    async fn unknown_source_is_a_validation_error() {
        let (service, _systems, _sources, _pfas, _flows, _audit) = service().await;

        let error = service
            .submit_pfas_result(
                &pwsid(),
                &SourceName("Well 99".to_owned()),
                pfas_payload("PFOA", 1.0),
            )
            .await
            .expect_err("unknown source");

        match error {
            ApplicationError::Validation(errors) => {
                assert!(errors.0.contains_key("source_name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_flow_submission_updates_afr_and_estimates() {
        let (service, systems, _sources, pfas, flows, _audit) = service().await;

        pfas.insert(claim_pfas("PFOA", 4.0)).await.expect("claim pfoa");
        pfas.insert(claim_pfas("PFOS", 6.0)).await.expect("claim pfos");
        for (year, gpm) in [(2019, 30.0), (2020, 60.0), (2021, 90.0)] {
            flows.insert(claim_annual(year, gpm)).await.expect("claim annual");
        }

        let receipt = service
            .submit_max_flow(
                &pwsid(),
                &source_name(),
                MaxFlowPayload {
                    flow_rate: Some(120.0),
                    unit: "GPM".to_owned(),
                    filename: Some("pump-test.pdf".to_owned()),
                    ..MaxFlowPayload::default()
                },
            )
            .await
            .expect("submission");

        let metrics = receipt.metrics.expect("metrics derived");
        assert_eq!(metrics.pfas_score, 10.0);
        // AAFR = (30 + 60 + 90) / 3 = 60, AFR = (60 + 120) / 2 = 90.
        assert!((metrics.afr - 90.0).abs() < 1e-9);
        assert_eq!(metrics.afr_note, None);
        assert!(metrics.gfe_total > 0.0);

        let totals = systems
            .find(&pwsid())
            .await
            .expect("find")
            .expect("exists")
            .totals
            .expect("totals");
        assert!((totals.gfe_total - metrics.gfe_total).abs() < 1e-9);
    }

    #[tokio::test]
    async fn newer_update_beats_claim_but_claim_floor_holds_for_scoring() {
        let (service, _systems, _sources, pfas, _flows, _audit) = service().await;

        pfas.insert(claim_pfas("PFOA", 8.0)).await.expect("claim");

        // A lower re-test does not drop the score below the claim floor.
        let receipt = service
            .submit_pfas_result(&pwsid(), &source_name(), pfas_payload("PFOA", 3.0))
            .await
            .expect("submission");

        let metrics = receipt.metrics.expect("metrics");
        assert_eq!(metrics.pfas_score, 8.0);
        assert_eq!(metrics.pfas_score_method, ScoreMethod::MaxPfoaPfos);
    }

    #[tokio::test]
    async fn recompute_pws_rederives_every_source() {
        let (service, systems, sources, pfas, _flows, _audit) = service().await;

        sources
            .save(Source {
                pwsid: pwsid(),
                source_name: SourceName("Well 02".to_owned()),
                water_source_id: Some(2),
                source_type: Some("Well".to_owned()),
                source_status: Some("Active".to_owned()),
                metrics: None,
            })
            .await
            .expect("second source");
        pfas.insert(claim_pfas("PFOA", 5.0)).await.expect("claim");

        let recomputed = service.recompute_pws(&pwsid()).await.expect("recompute");
        assert_eq!(recomputed, 2);

        for name in ["Well 01", "Well 02"] {
            let source = sources
                .find(&pwsid(), &SourceName(name.to_owned()))
                .await
                .expect("find")
                .expect("exists");
            assert!(source.metrics.is_some(), "{name} should have metrics");
        }
        assert!(systems.find(&pwsid()).await.expect("find").expect("exists").totals.is_some());
    }

    #[test]
    fn all_non_detect_source_derives_zeroed_metrics() {
        let metrics = derive_metrics(&pwsid(), Some(1), &source_name(), &[], &[]);

        assert_eq!(metrics.pfas_score, 0.0);
        assert!(metrics.all_nds);
        assert!(!metrics.regulatory_bump);
        assert_eq!(metrics.gfe_total, 0.0);
        assert_eq!(
            metrics.afr_note.as_deref(),
            Some("no annual production data provided and vfr missing or invalid")
        );
    }

    #[test]
    fn partial_intake_year_is_excluded_from_afr_but_not_score() {
        let flows =
            vec![claim_annual(2013, 500.0), claim_annual(2019, 30.0), claim_annual(2020, 60.0)];
        let pfas = vec![claim_pfas("PFOA", 2.0), claim_pfas("PFOS", 2.0)];

        let metrics = derive_metrics(&pwsid(), Some(1), &source_name(), &pfas, &flows);

        // Top-3 zero-padded annuals are 30 and 60 only; 2013 never counts.
        assert!((metrics.afr - ((30.0 + 60.0) / 3.0) / 2.0).abs() < 1e-9);
        assert!(metrics
            .afr_note
            .as_deref()
            .expect("note present")
            .contains("only 2 years of annual production provided"));
    }

    struct UnavailableTotalsPwsRepository {
        inner: InMemoryPwsRepository,
    }

    #[async_trait::async_trait]
    impl PwsRepository for UnavailableTotalsPwsRepository {
        async fn find(&self, pwsid: &PwsId) -> Result<Option<Pws>, RepositoryError> {
            self.inner.find(pwsid).await
        }

        async fn save(&self, pws: Pws) -> Result<(), RepositoryError> {
            self.inner.save(pws).await
        }

        async fn aggregate_totals(&self, _pwsid: &PwsId) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("totals writer offline".to_owned()))
        }
    }

    #[tokio::test]
    async fn aggregation_failure_still_acknowledges_the_persisted_submission() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let sources = Arc::new(InMemorySourceRepository::default());
        let systems =
            Arc::new(UnavailableTotalsPwsRepository { inner: InMemoryPwsRepository::default() });
        let pfas = Arc::new(InMemoryPfasResultRepository::default());
        let flows = Arc::new(InMemoryFlowRateRepository::default());
        let audit = Arc::new(SqlAuditEventRepository::new(pool));

        systems
            .save(Pws { pwsid: pwsid(), pws_name: None, totals: None, submit_date: None })
            .await
            .expect("seed pws");
        sources
            .save(Source {
                pwsid: pwsid(),
                source_name: source_name(),
                water_source_id: Some(1),
                source_type: Some("Well".to_owned()),
                source_status: Some("Active".to_owned()),
                metrics: None,
            })
            .await
            .expect("seed source");

        let service = UpdateService::new(
            systems,
            sources.clone(),
            pfas.clone(),
            flows,
            audit.clone(),
        );

        let receipt = service
            .submit_pfas_result(&pwsid(), &source_name(), pfas_payload("PFOA", 6.0))
            .await
            .expect("submission is acknowledged despite the aggregation failure");

        assert_eq!(receipt.state, UpdateState::Complete);
        assert!(receipt.metrics.is_some());

        let stored = pfas.list_for_source(&pwsid(), &source_name()).await.expect("list");
        assert_eq!(stored.len(), 1, "the observation stays persisted");
        let source = sources
            .find(&pwsid(), &source_name())
            .await
            .expect("find")
            .expect("exists");
        assert!(source.metrics.is_some(), "derived metrics stay persisted");

        let trail = audit.list_for_pws(&pwsid(), 50).await.expect("audit trail");
        assert!(trail.iter().any(|e| e.event_type == "aggregation.totals_failed"));
    }

    #[tokio::test]
    async fn concurrent_submissions_keep_provider_totals_consistent() {
        let pool =
            connect_with_settings("sqlite::memory:?cache=shared", 5, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let systems = Arc::new(SqlPwsRepository::new(pool.clone()));
        let sources = Arc::new(SqlSourceRepository::new(pool.clone()));
        let pfas = Arc::new(SqlPfasResultRepository::new(pool.clone()));
        let flows = Arc::new(SqlFlowRateRepository::new(pool.clone()));
        let audit = Arc::new(SqlAuditEventRepository::new(pool.clone()));

        let pwsid = PwsId("CA0000777".to_owned());
        systems
            .save(Pws { pwsid: pwsid.clone(), pws_name: None, totals: None, submit_date: None })
            .await
            .expect("seed pws");

        for name in ["Well 01", "Well 02"] {
            let source_name = SourceName(name.to_owned());
            sources
                .save(Source {
                    pwsid: pwsid.clone(),
                    source_name: source_name.clone(),
                    water_source_id: None,
                    source_type: Some("Well".to_owned()),
                    source_status: Some("Active".to_owned()),
                    metrics: None,
                })
                .await
                .expect("seed source");

            for (analyte, ppt) in [("PFOA", 4.0), ("PFOS", 6.0)] {
                let mut record = claim_pfas(analyte, ppt);
                record.id = RecordId(format!("claim-{name}-{analyte}"));
                record.pwsid = pwsid.clone();
                record.source_name = source_name.clone();
                pfas.insert(record).await.expect("claim pfas");
            }
            for (year, gpm) in [(2019, 30.0), (2020, 60.0), (2021, 90.0)] {
                let mut record = claim_annual(year, gpm);
                record.id = RecordId(format!("claim-{name}-{year}"));
                record.pwsid = pwsid.clone();
                record.source_name = source_name.clone();
                flows.insert(record).await.expect("claim annual");
            }
        }

        let service = Arc::new(UpdateService::new(
            systems.clone(),
            sources.clone(),
            pfas,
            flows,
            audit,
        ));

        let submit = |well: &str| {
            let service = service.clone();
            let pwsid = pwsid.clone();
            let source_name = SourceName(well.to_owned());
            tokio::spawn(async move {
                service
                    .submit_max_flow(
                        &pwsid,
                        &source_name,
                        MaxFlowPayload {
                            flow_rate: Some(120.0),
                            unit: "GPM".to_owned(),
                            filename: Some("pump-test.pdf".to_owned()),
                            ..MaxFlowPayload::default()
                        },
                    )
                    .await
            })
        };

        let (first, second) = tokio::join!(submit("Well 01"), submit("Well 02"));
        first.expect("task").expect("first submission");
        second.expect("task").expect("second submission");

        let mut expected_total = 0.0;
        for name in ["Well 01", "Well 02"] {
            let source = sources
                .find(&pwsid, &SourceName(name.to_owned()))
                .await
                .expect("find")
                .expect("exists");
            expected_total += source.metrics.expect("metrics derived").gfe_total;
        }
        assert!(expected_total > 0.0);

        let totals = systems
            .find(&pwsid)
            .await
            .expect("find pws")
            .expect("exists")
            .totals
            .expect("totals aggregated");
        assert!(
            (totals.gfe_total - expected_total).abs() < 1e-9,
            "provider totals must equal the sum over sources after concurrent updates"
        );
    }
}
