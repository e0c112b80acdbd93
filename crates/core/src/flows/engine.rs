use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    TransitionOutcome, UpdateAction, UpdateContext, UpdateEvent, UpdateKind, UpdateState,
};

/// Lifecycle of one provider submission, from payload receipt through
/// per-source metric derivation and provider-level aggregation.
pub trait UpdateFlow {
    fn kind(&self) -> UpdateKind;
    fn initial_state(&self) -> UpdateState;
    fn transition(
        &self,
        current: &UpdateState,
        event: &UpdateEvent,
        context: &UpdateContext,
    ) -> Result<TransitionOutcome, UpdateTransitionError>;
}

/// All three submission kinds share one lifecycle; the kind only decides
/// which table the stored observation lands in.
#[derive(Clone, Debug)]
pub struct SourceUpdateFlow {
    kind: UpdateKind,
}

impl SourceUpdateFlow {
    pub fn new(kind: UpdateKind) -> Self {
        Self { kind }
    }
}

impl UpdateFlow for SourceUpdateFlow {
    fn kind(&self) -> UpdateKind {
        self.kind.clone()
    }

    fn initial_state(&self) -> UpdateState {
        UpdateState::Received
    }

    fn transition(
        &self,
        current: &UpdateState,
        event: &UpdateEvent,
        context: &UpdateContext,
    ) -> Result<TransitionOutcome, UpdateTransitionError> {
        transition_source_update(current, event, context)
    }
}

pub struct UpdateEngine<F> {
    flow: F,
}

impl<F> UpdateEngine<F>
where
    F: UpdateFlow,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn kind(&self) -> UpdateKind {
        self.flow.kind()
    }

    pub fn initial_state(&self) -> UpdateState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &UpdateState,
        event: &UpdateEvent,
        context: &UpdateContext,
    ) -> Result<TransitionOutcome, UpdateTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &UpdateState,
        event: &UpdateEvent,
        context: &UpdateContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, UpdateTransitionError>
    where
        S: AuditSink,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.pwsid.clone(),
                        audit.source_name.clone(),
                        audit.correlation_id.clone(),
                        "update.transition_applied",
                        AuditCategory::Submission,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.pwsid.clone(),
                        audit.source_name.clone(),
                        audit.correlation_id.clone(),
                        "update.transition_rejected",
                        AuditCategory::Submission,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for UpdateEngine<SourceUpdateFlow> {
    fn default() -> Self {
        Self::new(SourceUpdateFlow::new(UpdateKind::PfasResult))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpdateTransitionError {
    #[error("payload has field errors and cannot advance from {state:?}: {field_errors:?}")]
    FieldErrors { state: UpdateState, field_errors: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: UpdateState, event: UpdateEvent },
}

fn transition_source_update(
    current: &UpdateState,
    event: &UpdateEvent,
    context: &UpdateContext,
) -> Result<TransitionOutcome, UpdateTransitionError> {
    use UpdateAction::{
        AggregateProviderTotals, DeriveSourceMetrics, NotifyProvider, RecordDerivationGap,
        StoreObservation, SurfaceFieldErrors,
    };
    use UpdateEvent::{
        DerivationFailed, FatalError, MetricsDerived, ObservationStored, PayloadAccepted,
        PayloadRejected, StorageFailed, SubmissionAcknowledged,
    };
    use UpdateState::{Aggregated, Complete, Failed, Persisted, Received, Validated};

    let (to, actions) = match (current, event) {
        (Received, PayloadAccepted) => {
            if !context.field_errors.is_empty() {
                return Err(UpdateTransitionError::FieldErrors {
                    state: current.clone(),
                    field_errors: context.field_errors.clone(),
                });
            }
            (Validated, vec![StoreObservation])
        }
        (Received, PayloadRejected) => (Failed, vec![SurfaceFieldErrors]),
        (Validated, ObservationStored) => (Persisted, vec![DeriveSourceMetrics]),
        (Validated, StorageFailed) => (Failed, Vec::new()),
        // A stored observation is never rolled back over a derivation gap;
        // the gap is recorded and totals are still re-aggregated.
        (Persisted, MetricsDerived) => (Aggregated, vec![AggregateProviderTotals]),
        (Persisted, DerivationFailed) => {
            (Aggregated, vec![RecordDerivationGap, AggregateProviderTotals])
        }
        (Aggregated, SubmissionAcknowledged) => (Complete, vec![NotifyProvider]),
        (state, FatalError) if !state.is_terminal() => (Failed, Vec::new()),
        _ => {
            return Err(UpdateTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}
