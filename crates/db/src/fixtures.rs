use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Canonical demo seeds and verification contract for the intake dataset.
const SEED_SOURCES: &[SeedSourceContract] = &[
    SeedSourceContract {
        source_name: "Well 01",
        water_source_id: 1,
        source_status: "Active",
        expected_pfas_count: 3,
        expected_flow_count: 5,
        has_detections: true,
        description: "Detections with a full production history",
    },
    SeedSourceContract {
        source_name: "Well 02",
        water_source_id: 2,
        source_status: "Standby",
        expected_pfas_count: 2,
        expected_flow_count: 0,
        has_detections: false,
        description: "All non-detect, no flow data",
    },
];

const SEED_PWSID: &str = "CA5500042";

const SEED_PFAS_IDS: &[&str] =
    &["seed-pfas-001", "seed-pfas-002", "seed-pfas-003", "seed-pfas-004", "seed-pfas-005"];

const SEED_FLOW_IDS: &[&str] =
    &["seed-flow-001", "seed-flow-002", "seed-flow-003", "seed-flow-004", "seed-flow-005"];

/// Demo Seed Dataset for the claims intake of one water system.
///
/// Provides deterministic fixtures for:
/// 1. A source with detections, a verified max flow, and four annual values
/// 2. An all-non-detect source with no flow data
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo seed data.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo seed dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let sources_seeded = SEED_SOURCES
            .iter()
            .map(|source| SourceSeedInfo {
                source_name: source.source_name,
                description: source.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { pwsid: SEED_PWSID, sources_seeded })
    }

    /// Verify that the seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let pws_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pws WHERE pwsid = ?1)")
                .bind(SEED_PWSID)
                .fetch_one(pool)
                .await?;
        checks.push(("pws", pws_exists == 1));

        for source in SEED_SOURCES {
            let source_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM source
                 WHERE id = ?1 AND pwsid = ?2 AND source_name = ?3 AND source_status = ?4)",
            )
            .bind(source.water_source_id)
            .bind(SEED_PWSID)
            .bind(source.source_name)
            .bind(source.source_status)
            .fetch_one(pool)
            .await?;
            checks.push((source.source_label(), source_ok == 1));

            let pfas_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM pfas_result
                 WHERE pwsid = ?1 AND source_name = ?2 AND provenance = 'claim intake'",
            )
            .bind(SEED_PWSID)
            .bind(source.source_name)
            .fetch_one(pool)
            .await?;
            checks.push((source.pfas_count_label(), pfas_count == source.expected_pfas_count));

            let flow_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM flow_rate WHERE pwsid = ?1 AND source_name = ?2",
            )
            .bind(SEED_PWSID)
            .bind(source.source_name)
            .fetch_one(pool)
            .await?;
            checks.push((source.flow_count_label(), flow_count == source.expected_flow_count));

            let max_detect: f64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(result_ppt), 0.0) FROM pfas_result
                 WHERE pwsid = ?1 AND source_name = ?2",
            )
            .bind(SEED_PWSID)
            .bind(source.source_name)
            .fetch_one(pool)
            .await?;
            checks.push((source.detections_label(), (max_detect > 0.0) == source.has_detections));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_pfas = sql_array_from_ids(SEED_PFAS_IDS);
        let quoted_flows = sql_array_from_ids(SEED_FLOW_IDS);

        sqlx::query(&format!("DELETE FROM pfas_result WHERE id IN {quoted_pfas}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM flow_rate WHERE id IN {quoted_flows}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM source WHERE pwsid = ?1").bind(SEED_PWSID).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM pws WHERE pwsid = ?1").bind(SEED_PWSID).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedSourceContract {
    source_name: &'static str,
    water_source_id: i64,
    source_status: &'static str,
    expected_pfas_count: i64,
    expected_flow_count: i64,
    has_detections: bool,
    description: &'static str,
}

impl SeedSourceContract {
    fn source_label(&self) -> &'static str {
        match self.source_name {
            "Well 01" => "source-well01",
            _ => "source-well02",
        }
    }

    fn pfas_count_label(&self) -> &'static str {
        match self.source_name {
            "Well 01" => "well01-pfas-count",
            _ => "well02-pfas-count",
        }
    }

    fn flow_count_label(&self) -> &'static str {
        match self.source_name {
            "Well 01" => "well01-flow-count",
            _ => "well02-flow-count",
        }
    }

    fn detections_label(&self) -> &'static str {
        match self.source_name {
            "Well 01" => "well01-detections",
            _ => "well02-detections",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub pwsid: &'static str,
    pub sources_seeded: Vec<SourceSeedInfo>,
}

#[derive(Debug)]
pub struct SourceSeedInfo {
    pub source_name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
