use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    PfasResult,
    MaxFlow,
    AnnualProduction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateState {
    Received,
    Validated,
    Persisted,
    Aggregated,
    Complete,
    Failed,
}

impl UpdateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateEvent {
    PayloadAccepted,
    PayloadRejected,
    ObservationStored,
    StorageFailed,
    MetricsDerived,
    DerivationFailed,
    SubmissionAcknowledged,
    FatalError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateContext {
    pub field_errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    StoreObservation,
    DeriveSourceMetrics,
    AggregateProviderTotals,
    RecordDerivationGap,
    NotifyProvider,
    SurfaceFieldErrors,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: UpdateState,
    pub to: UpdateState,
    pub event: UpdateEvent,
    pub actions: Vec<UpdateAction>,
}
