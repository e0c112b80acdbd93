use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use aquaclaim_core::config::{AppConfig, ConfigError, LoadOptions};
use aquaclaim_db::repositories::{
    AuditEventRepository, FlowRateRepository, PfasResultRepository, PwsRepository,
    SourceRepository, SqlAuditEventRepository, SqlFlowRateRepository, SqlPfasResultRepository,
    SqlPwsRepository, SqlSourceRepository,
};
use aquaclaim_db::{connect, migrations, DbPool, UpdateService};

use crate::evidence::EvidenceClient;
use crate::mailer::Mailer;

/// Shared repository handles used by both the portal routes and the update
/// orchestrator.
#[derive(Clone)]
pub struct Repositories {
    pub systems: Arc<dyn PwsRepository>,
    pub sources: Arc<dyn SourceRepository>,
    pub pfas_results: Arc<dyn PfasResultRepository>,
    pub flow_rates: Arc<dyn FlowRateRepository>,
    pub audit: Arc<dyn AuditEventRepository>,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repositories: Repositories,
    pub update_service: Arc<UpdateService>,
    pub evidence: Arc<EvidenceClient>,
    pub mailer: Arc<Mailer>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repositories = Repositories {
        systems: Arc::new(SqlPwsRepository::new(db_pool.clone())),
        sources: Arc::new(SqlSourceRepository::new(db_pool.clone())),
        pfas_results: Arc::new(SqlPfasResultRepository::new(db_pool.clone())),
        flow_rates: Arc::new(SqlFlowRateRepository::new(db_pool.clone())),
        audit: Arc::new(SqlAuditEventRepository::new(db_pool.clone())),
    };

    let update_service = Arc::new(UpdateService::new(
        repositories.systems.clone(),
        repositories.sources.clone(),
        repositories.pfas_results.clone(),
        repositories.flow_rates.clone(),
        repositories.audit.clone(),
    ));

    let evidence = Arc::new(EvidenceClient::new(config.evidence.clone()));
    let mailer = Arc::new(Mailer::new(config.mail.clone()));

    Ok(Application { config, db_pool, repositories, update_service, evidence, mailer })
}

#[cfg(test)]
mod tests {
    use aquaclaim_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_service() {
        let app = bootstrap(memory_options()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('pws', 'source', 'pfas_result', 'flow_rate', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose every baseline table");

        assert!(!app.evidence.enabled(), "evidence store defaults to disabled");
        assert!(!app.mailer.enabled(), "mail relay defaults to disabled");

        app.db_pool.close().await;
    }
}
