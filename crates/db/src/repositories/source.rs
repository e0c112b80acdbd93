use chrono::{DateTime, Utc};
use sqlx::Row;

use aquaclaim_core::domain::observation::{PwsId, SourceName};
use aquaclaim_core::domain::source::{ScoreMethod, Source, SourceMetrics};

use super::{RepositoryError, SourceRepository};
use crate::DbPool;

pub struct SqlSourceRepository {
    pool: DbPool,
}

impl SqlSourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_score_method(s: &str) -> ScoreMethod {
    match s {
        "alternate" => ScoreMethod::Alternate,
        _ => ScoreMethod::MaxPfoaPfos,
    }
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source, RepositoryError> {
    let pwsid: String =
        row.try_get("pwsid").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_name: String =
        row.try_get("source_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let water_source_id: Option<i64> =
        row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_type: Option<String> =
        row.try_get("source_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_status: Option<String> =
        row.try_get("source_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let pfas_score: Option<f64> =
        row.try_get("pfas_score").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metrics = match pfas_score {
        Some(pfas_score) => {
            let method_str: Option<String> = row
                .try_get("pfas_score_method")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let regulatory_bump: Option<i64> = row
                .try_get("regulatory_bump")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let all_nds: Option<i64> =
                row.try_get("all_nds").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let afr: Option<f64> =
                row.try_get("afr").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let afr_note: Option<String> =
                row.try_get("afr_note").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let gfe_tyco: Option<f64> =
                row.try_get("gfe_tyco").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let gfe_basf: Option<f64> =
                row.try_get("gfe_basf").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let gfe_total: Option<f64> =
                row.try_get("gfe_total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let computed_at_str: Option<String> =
                row.try_get("computed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let computed_at = computed_at_str
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            Some(SourceMetrics {
                pfas_score,
                pfas_score_method: parse_score_method(method_str.as_deref().unwrap_or_default()),
                regulatory_bump: regulatory_bump.unwrap_or(0) != 0,
                all_nds: all_nds.unwrap_or(0) != 0,
                afr: afr.unwrap_or(0.0),
                afr_note,
                gfe_tyco: gfe_tyco.unwrap_or(0.0),
                gfe_basf: gfe_basf.unwrap_or(0.0),
                gfe_total: gfe_total.unwrap_or(0.0),
                computed_at,
            })
        }
        None => None,
    };

    Ok(Source {
        pwsid: PwsId(pwsid),
        source_name: SourceName(source_name),
        water_source_id,
        source_type,
        source_status,
        metrics,
    })
}

const SOURCE_COLUMNS: &str = "id, pwsid, source_name, source_type, source_status,
                              pfas_score, pfas_score_method, regulatory_bump, all_nds,
                              afr, afr_note, gfe_tyco, gfe_basf, gfe_total, computed_at";

#[async_trait::async_trait]
impl SourceRepository for SqlSourceRepository {
    async fn find(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Option<Source>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM source WHERE pwsid = ? AND source_name = ?"
        ))
        .bind(&pwsid.0)
        .bind(&source_name.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_source(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_pws(&self, pwsid: &PwsId) -> Result<Vec<Source>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM source WHERE pwsid = ? ORDER BY source_name"
        ))
        .bind(&pwsid.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_source).collect()
    }

    async fn save(&self, source: Source) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO source (pwsid, source_name, source_type, source_status)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(pwsid, source_name) DO UPDATE SET
                 source_type = excluded.source_type,
                 source_status = excluded.source_status",
        )
        .bind(&source.pwsid.0)
        .bind(&source.source_name.0)
        .bind(&source.source_type)
        .bind(&source.source_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_metrics(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        metrics: &SourceMetrics,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE source SET
                 pfas_score = ?,
                 pfas_score_method = ?,
                 regulatory_bump = ?,
                 all_nds = ?,
                 afr = ?,
                 afr_note = ?,
                 gfe_tyco = ?,
                 gfe_basf = ?,
                 gfe_total = ?,
                 computed_at = ?
             WHERE pwsid = ? AND source_name = ?",
        )
        .bind(metrics.pfas_score)
        .bind(metrics.pfas_score_method.as_str())
        .bind(metrics.regulatory_bump as i64)
        .bind(metrics.all_nds as i64)
        .bind(metrics.afr)
        .bind(&metrics.afr_note)
        .bind(metrics.gfe_tyco)
        .bind(metrics.gfe_basf)
        .bind(metrics.gfe_total)
        .bind(metrics.computed_at.to_rfc3339())
        .bind(&pwsid.0)
        .bind(&source_name.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
