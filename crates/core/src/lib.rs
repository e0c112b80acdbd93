pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod metrics;
pub mod reconcile;
pub mod units;
pub mod validation;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::observation::{
    Analyte, FlowKind, FlowObservation, Observation, ObservationKey, PfasObservation, Provenance,
    PwsId, RecordId, SourceName,
};
pub use domain::source::{Defendant, Pws, PwsTotals, ScoreMethod, Source, SourceMetrics};
pub use errors::{ApplicationError, DomainError};
pub use metrics::{AfrResult, GfeResult, PfasScore};
pub use reconcile::ReconciledRecord;
pub use units::{ConcentrationUnit, FlowUnit};
pub use validation::{
    AnnualProductionPayload, FieldErrors, MaxFlowPayload, PfasResultPayload,
};
