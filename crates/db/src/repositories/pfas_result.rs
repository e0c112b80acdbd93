use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use aquaclaim_core::domain::observation::{
    Analyte, PfasObservation, Provenance, PwsId, RecordId, SourceName,
};
use aquaclaim_core::units::ConcentrationUnit;

use super::{PfasResultRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPfasResultRepository {
    pool: DbPool,
}

impl SqlPfasResultRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_provenance(s: &str) -> Provenance {
    match s {
        "update portal" => Provenance::ProviderUpdate,
        "placeholder" => Provenance::Placeholder,
        "not available" => Provenance::NotAvailable,
        _ => Provenance::Claim,
    }
}

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<PfasObservation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pwsid: String =
        row.try_get("pwsid").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let water_source_id: Option<i64> =
        row.try_get("water_source_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_name: String =
        row.try_get("source_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let analyte: String =
        row.try_get("analyte").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let result: f64 =
        row.try_get("result").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_str: String =
        row.try_get("unit").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let result_ppt: f64 =
        row.try_get("result_ppt").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sampling_date: Option<String> =
        row.try_get("sampling_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let analysis_date: Option<String> =
        row.try_get("analysis_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lab: Option<String> =
        row.try_get("lab").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let analysis_method: Option<String> =
        row.try_get("analysis_method").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lab_sample_id: Option<String> =
        row.try_get("lab_sample_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
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

    let unit = unit_str.parse::<ConcentrationUnit>().unwrap_or(ConcentrationUnit::Ppt);
    let submit_date = DateTime::parse_from_rfc3339(&submit_date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(PfasObservation {
        id: RecordId(id),
        pwsid: PwsId(pwsid),
        water_source_id,
        source_name: SourceName(source_name),
        analyte: Analyte(analyte),
        result,
        unit,
        result_ppt,
        sampling_date: sampling_date.and_then(|s| s.parse::<NaiveDate>().ok()),
        analysis_date: analysis_date.and_then(|s| s.parse::<NaiveDate>().ok()),
        lab,
        analysis_method,
        lab_sample_id,
        filename,
        comments,
        submitted_by_provider: submitted_by_provider != 0,
        submit_date,
        provenance: parse_provenance(&provenance_str),
    })
}

#[async_trait::async_trait]
impl PfasResultRepository for SqlPfasResultRepository {
    async fn insert(&self, record: PfasObservation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pfas_result (id, pwsid, water_source_id, source_name, analyte,
                                      result, unit, result_ppt, sampling_date, analysis_date,
                                      lab, analysis_method, lab_sample_id, filename, comments,
                                      submitted_by_provider, submit_date, provenance)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.pwsid.0)
        .bind(record.water_source_id)
        .bind(&record.source_name.0)
        .bind(&record.analyte.0)
        .bind(record.result)
        .bind(record.unit.as_str())
        .bind(record.result_ppt)
        .bind(record.sampling_date.map(|d| d.to_string()))
        .bind(record.analysis_date.map(|d| d.to_string()))
        .bind(&record.lab)
        .bind(&record.analysis_method)
        .bind(&record.lab_sample_id)
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
    ) -> Result<Vec<PfasObservation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, pwsid, water_source_id, source_name, analyte, result, unit, result_ppt,
                    sampling_date, analysis_date, lab, analysis_method, lab_sample_id,
                    filename, comments, submitted_by_provider, submit_date, provenance
             FROM pfas_result
             WHERE pwsid = ? AND source_name = ?
             ORDER BY submit_date ASC",
        )
        .bind(&pwsid.0)
        .bind(&source_name.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_result).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use aquaclaim_core::domain::observation::{
        Analyte, PfasObservation, Provenance, PwsId, RecordId, SourceName,
    };
    use aquaclaim_core::domain::source::Pws;
    use aquaclaim_core::units::ConcentrationUnit;

    use super::SqlPfasResultRepository;
    use crate::repositories::{PfasResultRepository, PwsRepository, SqlPwsRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPwsRepository::new(pool.clone())
            .save(Pws {
                pwsid: PwsId("CA0000001".to_string()),
                pws_name: None,
                totals: None,
                submit_date: None,
            })
            .await
            .expect("seed pws");
        pool
    }

    fn sample_result(id: &str, analyte: &str, provenance: Provenance) -> PfasObservation {
        PfasObservation {
            id: RecordId(id.to_string()),
            pwsid: PwsId("CA0000001".to_string()),
            water_source_id: Some(1),
            source_name: SourceName("Well 01".to_string()),
            analyte: Analyte(analyte.to_string()),
            result: 2.5,
            unit: ConcentrationUnit::Ppb,
            result_ppt: 2_500.0,
            sampling_date: NaiveDate::from_ymd_opt(2023, 5, 1),
            analysis_date: NaiveDate::from_ymd_opt(2023, 5, 12),
            lab: Some("Eurofins".to_string()),
            analysis_method: Some("EPA 537.1".to_string()),
            lab_sample_id: Some("S-9912".to_string()),
            filename: Some("lab-report.pdf".to_string()),
            comments: None,
            submitted_by_provider: provenance == Provenance::ProviderUpdate,
            submit_date: Utc::now(),
            provenance,
        }
    }

    #[tokio::test]
    async fn insert_and_list_round_trip() {
        let pool = setup().await;
        let repo = SqlPfasResultRepository::new(pool);

        let record = sample_result("R-1", "PFOA", Provenance::ProviderUpdate);
        repo.insert(record.clone()).await.expect("insert");

        let listed = repo
            .list_for_source(
                &PwsId("CA0000001".to_string()),
                &SourceName("Well 01".to_string()),
            )
            .await
            .expect("list");

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].analyte, record.analyte);
        assert_eq!(listed[0].unit, ConcentrationUnit::Ppb);
        assert_eq!(listed[0].result_ppt, 2_500.0);
        assert_eq!(listed[0].sampling_date, record.sampling_date);
        assert_eq!(listed[0].provenance, Provenance::ProviderUpdate);
    }

    #[tokio::test]
    async fn claims_and_updates_share_the_table() {
        let pool = setup().await;
        let repo = SqlPfasResultRepository::new(pool);

        repo.insert(sample_result("R-1", "PFOA", Provenance::Claim)).await.expect("claim");
        repo.insert(sample_result("R-2", "PFOA", Provenance::ProviderUpdate))
            .await
            .expect("update");

        let listed = repo
            .list_for_source(
                &PwsId("CA0000001".to_string()),
                &SourceName("Well 01".to_string()),
            )
            .await
            .expect("list");

        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|r| r.provenance == Provenance::Claim));
        assert!(listed.iter().any(|r| r.provenance == Provenance::ProviderUpdate));
    }

    #[tokio::test]
    async fn unknown_pws_is_rejected_by_foreign_key() {
        let pool = setup().await;
        let repo = SqlPfasResultRepository::new(pool);

        let mut record = sample_result("R-1", "PFOA", Provenance::Claim);
        record.pwsid = PwsId("CA9999999".to_string());

        let error = repo.insert(record).await.expect_err("fk violation");
        assert!(error.to_string().contains("FOREIGN KEY"));
    }
}
