use async_trait::async_trait;
use thiserror::Error;

use aquaclaim_core::audit::AuditEvent;
use aquaclaim_core::domain::observation::{FlowObservation, PfasObservation, PwsId, SourceName};
use aquaclaim_core::domain::source::{Pws, Source, SourceMetrics};

pub mod audit_event;
pub mod flow_rate;
pub mod memory;
pub mod pfas_result;
pub mod pws;
pub mod source;

pub use audit_event::SqlAuditEventRepository;
pub use flow_rate::SqlFlowRateRepository;
pub use memory::{
    InMemoryFlowRateRepository, InMemoryPfasResultRepository, InMemoryPwsRepository,
    InMemorySourceRepository,
};
pub use pfas_result::SqlPfasResultRepository;
pub use pws::SqlPwsRepository;
pub use source::SqlSourceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PwsRepository: Send + Sync {
    async fn find(&self, pwsid: &PwsId) -> Result<Option<Pws>, RepositoryError>;
    async fn save(&self, pws: Pws) -> Result<(), RepositoryError>;
    /// Recomputes provider-level totals as the sum over its sources and stamps
    /// the submit date. Runs as one statement so concurrent submissions for
    /// different sources of the same provider cannot lose each other's writes.
    async fn aggregate_totals(&self, pwsid: &PwsId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn find(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Option<Source>, RepositoryError>;
    async fn list_for_pws(&self, pwsid: &PwsId) -> Result<Vec<Source>, RepositoryError>;
    async fn save(&self, source: Source) -> Result<(), RepositoryError>;
    async fn save_metrics(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        metrics: &SourceMetrics,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PfasResultRepository: Send + Sync {
    async fn insert(&self, record: PfasObservation) -> Result<(), RepositoryError>;
    /// Every record for the source, claims and provider updates alike.
    async fn list_for_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Vec<PfasObservation>, RepositoryError>;
}

#[async_trait]
pub trait FlowRateRepository: Send + Sync {
    async fn insert(&self, record: FlowObservation) -> Result<(), RepositoryError>;
    async fn list_for_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Vec<FlowObservation>, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>, RepositoryError>;
    async fn list_for_pws(
        &self,
        pwsid: &PwsId,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}
