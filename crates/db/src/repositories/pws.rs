use chrono::{DateTime, Utc};
use sqlx::Row;

use aquaclaim_core::domain::observation::PwsId;
use aquaclaim_core::domain::source::{Pws, PwsTotals};

use super::{PwsRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPwsRepository {
    pool: DbPool,
}

impl SqlPwsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_pws(row: &sqlx::sqlite::SqliteRow) -> Result<Pws, RepositoryError> {
    let pwsid: String =
        row.try_get("pwsid").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pws_name: Option<String> =
        row.try_get("pws_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gfe_tyco: Option<f64> =
        row.try_get("gfe_tyco").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gfe_basf: Option<f64> =
        row.try_get("gfe_basf").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gfe_total: Option<f64> =
        row.try_get("gfe_total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submit_date_str: Option<String> =
        row.try_get("submit_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let totals = match (gfe_tyco, gfe_basf, gfe_total) {
        (Some(gfe_tyco), Some(gfe_basf), Some(gfe_total)) => {
            Some(PwsTotals { gfe_tyco, gfe_basf, gfe_total })
        }
        _ => None,
    };
    let submit_date = submit_date_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Pws { pwsid: PwsId(pwsid), pws_name, totals, submit_date })
}

#[async_trait::async_trait]
impl PwsRepository for SqlPwsRepository {
    async fn find(&self, pwsid: &PwsId) -> Result<Option<Pws>, RepositoryError> {
        let row = sqlx::query(
            "SELECT pwsid, pws_name, gfe_tyco, gfe_basf, gfe_total, submit_date
             FROM pws WHERE pwsid = ?",
        )
        .bind(&pwsid.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_pws(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, pws: Pws) -> Result<(), RepositoryError> {
        let submit_date = pws.submit_date.map(|dt| dt.to_rfc3339());
        sqlx::query(
            "INSERT INTO pws (pwsid, pws_name, gfe_tyco, gfe_basf, gfe_total, submit_date)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(pwsid) DO UPDATE SET
                 pws_name = excluded.pws_name,
                 submit_date = excluded.submit_date",
        )
        .bind(&pws.pwsid.0)
        .bind(&pws.pws_name)
        .bind(pws.totals.as_ref().map(|t| t.gfe_tyco))
        .bind(pws.totals.as_ref().map(|t| t.gfe_basf))
        .bind(pws.totals.as_ref().map(|t| t.gfe_total))
        .bind(&submit_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn aggregate_totals(&self, pwsid: &PwsId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE pws SET
                 gfe_tyco = (SELECT COALESCE(SUM(gfe_tyco), 0) FROM source WHERE pwsid = ?1),
                 gfe_basf = (SELECT COALESCE(SUM(gfe_basf), 0) FROM source WHERE pwsid = ?1),
                 gfe_total = (SELECT COALESCE(SUM(gfe_total), 0) FROM source WHERE pwsid = ?1),
                 submit_date = ?2
             WHERE pwsid = ?1",
        )
        .bind(&pwsid.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aquaclaim_core::domain::observation::{PwsId, SourceName};
    use aquaclaim_core::domain::source::{Pws, Source};

    use super::SqlPwsRepository;
    use crate::repositories::{PwsRepository, SourceRepository, SqlSourceRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_pws(pwsid: &str) -> Pws {
        Pws {
            pwsid: PwsId(pwsid.to_string()),
            pws_name: Some("City of Riverton".to_string()),
            totals: None,
            submit_date: None,
        }
    }

    fn sample_source(pwsid: &str, name: &str) -> Source {
        Source {
            pwsid: PwsId(pwsid.to_string()),
            source_name: SourceName(name.to_string()),
            water_source_id: None,
            source_type: Some("Well".to_string()),
            source_status: Some("Active".to_string()),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlPwsRepository::new(pool);

        repo.save(sample_pws("CA0000001")).await.expect("save");
        let found = repo.find(&PwsId("CA0000001".to_string())).await.expect("find");
        let found = found.expect("should exist");

        assert_eq!(found.pws_name.as_deref(), Some("City of Riverton"));
        assert!(found.totals.is_none());
    }

    #[tokio::test]
    async fn aggregate_totals_sums_source_estimates() {
        let pool = setup().await;
        let pws_repo = SqlPwsRepository::new(pool.clone());
        let source_repo = SqlSourceRepository::new(pool.clone());

        pws_repo.save(sample_pws("CA0000001")).await.expect("save pws");
        source_repo.save(sample_source("CA0000001", "Well 01")).await.expect("save source 1");
        source_repo.save(sample_source("CA0000001", "Well 02")).await.expect("save source 2");

        for (name, tyco, basf) in [("Well 01", 100.0, 40.0), ("Well 02", 50.0, 10.0)] {
            sqlx::query(
                "UPDATE source SET gfe_tyco = ?, gfe_basf = ?, gfe_total = ?
                 WHERE pwsid = 'CA0000001' AND source_name = ?",
            )
            .bind(tyco)
            .bind(basf)
            .bind(tyco + basf)
            .bind(name)
            .execute(&pool)
            .await
            .expect("seed metrics");
        }

        pws_repo.aggregate_totals(&PwsId("CA0000001".to_string())).await.expect("aggregate");

        let found = pws_repo
            .find(&PwsId("CA0000001".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        let totals = found.totals.expect("totals populated");
        assert_eq!(totals.gfe_tyco, 150.0);
        assert_eq!(totals.gfe_basf, 50.0);
        assert_eq!(totals.gfe_total, 200.0);
        assert!(found.submit_date.is_some());
    }

    #[tokio::test]
    async fn aggregate_totals_with_no_sources_yields_zeroes() {
        let pool = setup().await;
        let repo = SqlPwsRepository::new(pool);

        repo.save(sample_pws("CA0000002")).await.expect("save");
        repo.aggregate_totals(&PwsId("CA0000002".to_string())).await.expect("aggregate");

        let totals = repo
            .find(&PwsId("CA0000002".to_string()))
            .await
            .expect("find")
            .expect("should exist")
            .totals
            .expect("totals populated");
        assert_eq!(totals.gfe_total, 0.0);
    }
}
