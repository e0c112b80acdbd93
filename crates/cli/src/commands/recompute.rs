use std::sync::Arc;

use crate::commands::CommandResult;
use aquaclaim_core::config::{AppConfig, LoadOptions};
use aquaclaim_core::domain::observation::PwsId;
use aquaclaim_db::repositories::{
    SqlAuditEventRepository, SqlFlowRateRepository, SqlPfasResultRepository, SqlPwsRepository,
    SqlSourceRepository,
};
use aquaclaim_db::{connect, migrations, UpdateService};

pub fn run(pwsid: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "recompute",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "recompute",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let pwsid = PwsId(pwsid.to_string());
    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let service = UpdateService::new(
            Arc::new(SqlPwsRepository::new(pool.clone())),
            Arc::new(SqlSourceRepository::new(pool.clone())),
            Arc::new(SqlPfasResultRepository::new(pool.clone())),
            Arc::new(SqlFlowRateRepository::new(pool.clone())),
            Arc::new(SqlAuditEventRepository::new(pool.clone())),
        );

        let recomputed = service
            .recompute_pws(&pwsid)
            .await
            .map_err(|error| ("recompute", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<usize, (&'static str, String, u8)>(recomputed)
    });

    match result {
        Ok(0) => CommandResult::success(
            "recompute",
            format!("no sources on record for water system {}", pwsid.0),
        ),
        Ok(recomputed) => CommandResult::success(
            "recompute",
            format!(
                "re-derived metrics for {recomputed} source(s) of water system {} and refreshed totals",
                pwsid.0
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recompute", error_class, message, exit_code)
        }
    }
}
