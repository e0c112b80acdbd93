use chrono::{DateTime, Utc};
use sqlx::Row;

use aquaclaim_core::domain::observation::{
    FlowKind, FlowObservation, PwsId, RecordId, SourceName,
};
use aquaclaim_core::units::FlowUnit;

use super::pfas_result::parse_provenance;
use super::{FlowRateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFlowRateRepository {
    pool: DbPool,
}

impl SqlFlowRateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_flow(row: &sqlx::sqlite::SqliteRow) -> Result<FlowObservation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pwsid: String =
        row.try_get("pwsid").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let water_source_id: Option<i64> =
        row.try_get("water_source_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_name: String =
        row.try_get("source_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let variable: String =
        row.try_get("variable").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let year: Option<i32> =
        row.try_get("year").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let flow_rate: f64 =
        row.try_get("flow_rate").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_str: String =
        row.try_get("unit").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let flow_rate_gpm: f64 =
        row.try_get("flow_rate_gpm").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let flow_rate_reduced: Option<i64> =
        row.try_get("flow_rate_reduced").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let filename: Option<String> =
        row.try_get("filename").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comments: Option<String> =
        row.try_get("comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitted_by_provider: i64 = row
        .try_get("submitted_by_provider")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submit_date_str: String =
        row.try_get("submit_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let provenance_str: String =
        row.try_get("provenance").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = FlowKind::from_variable(&variable, year)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit = unit_str.parse::<FlowUnit>().unwrap_or(FlowUnit::Gpm);
    let submit_date = DateTime::parse_from_rfc3339(&submit_date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(FlowObservation {
        id: RecordId(id),
        pwsid: PwsId(pwsid),
        water_source_id,
        source_name: SourceName(source_name),
        kind,
        flow_rate,
        unit,
        flow_rate_gpm,
        flow_rate_reduced: flow_rate_reduced.map(|v| v != 0),
        filename,
        comments,
        submitted_by_provider: submitted_by_provider != 0,
        submit_date,
        provenance: parse_provenance(&provenance_str),
    })
}

#[async_trait::async_trait]
impl FlowRateRepository for SqlFlowRateRepository {
    async fn insert(&self, record: FlowObservation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO flow_rate (id, pwsid, water_source_id, source_name, variable, year,
                                    flow_rate, unit, flow_rate_gpm, flow_rate_reduced,
                                    filename, comments, submitted_by_provider, submit_date,
                                    provenance)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.pwsid.0)
        .bind(record.water_source_id)
        .bind(&record.source_name.0)
        .bind(record.kind.variable())
        .bind(record.kind.year())
        .bind(record.flow_rate)
        .bind(record.unit.as_str())
        .bind(record.flow_rate_gpm)
        .bind(record.flow_rate_reduced.map(|v| v as i64))
        .bind(&record.filename)
        .bind(&record.comments)
        .bind(record.submitted_by_provider as i64)
        .bind(record.submit_date.to_rfc3339())
        .bind(record.provenance.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Vec<FlowObservation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, pwsid, water_source_id, source_name, variable, year, flow_rate, unit,
                    flow_rate_gpm, flow_rate_reduced, filename, comments,
                    submitted_by_provider, submit_date, provenance
             FROM flow_rate
             WHERE pwsid = ? AND source_name = ?
             ORDER BY submit_date ASC",
        )
        .bind(&pwsid.0)
        .bind(&source_name.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_flow).collect()
    }
}
