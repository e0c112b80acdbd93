use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use aquaclaim_core::domain::observation::{
    FlowObservation, PfasObservation, PwsId, SourceName,
};
use aquaclaim_core::domain::source::{Pws, PwsTotals, Source, SourceMetrics};

use super::{
    FlowRateRepository, PfasResultRepository, PwsRepository, RepositoryError, SourceRepository,
};

#[derive(Default)]
pub struct InMemoryPwsRepository {
    systems: RwLock<HashMap<String, Pws>>,
    sources: std::sync::Arc<InMemorySourceRepository>,
}

impl InMemoryPwsRepository {
    /// Shares the source store so aggregation can see saved metrics.
    pub fn with_sources(sources: std::sync::Arc<InMemorySourceRepository>) -> Self {
        Self { systems: RwLock::default(), sources }
    }
}

#[async_trait::async_trait]
impl PwsRepository for InMemoryPwsRepository {
    async fn find(&self, pwsid: &PwsId) -> Result<Option<Pws>, RepositoryError> {
        let systems = self.systems.read().await;
        Ok(systems.get(&pwsid.0).cloned())
    }

    async fn save(&self, pws: Pws) -> Result<(), RepositoryError> {
        let mut systems = self.systems.write().await;
        systems.insert(pws.pwsid.0.clone(), pws);
        Ok(())
    }

    async fn aggregate_totals(&self, pwsid: &PwsId) -> Result<(), RepositoryError> {
        let sources = self.sources.list_for_pws(pwsid).await?;
        let mut totals = PwsTotals { gfe_tyco: 0.0, gfe_basf: 0.0, gfe_total: 0.0 };
        for source in sources {
            if let Some(metrics) = source.metrics {
                totals.gfe_tyco += metrics.gfe_tyco;
                totals.gfe_basf += metrics.gfe_basf;
                totals.gfe_total += metrics.gfe_total;
            }
        }

        let mut systems = self.systems.write().await;
        if let Some(pws) = systems.get_mut(&pwsid.0) {
            pws.totals = Some(totals);
            pws.submit_date = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySourceRepository {
    sources: RwLock<HashMap<(String, String), Source>>,
}

#[async_trait::async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn find(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Option<Source>, RepositoryError> {
        let sources = self.sources.read().await;
        Ok(sources.get(&(pwsid.0.clone(), source_name.0.clone())).cloned())
    }

    async fn list_for_pws(&self, pwsid: &PwsId) -> Result<Vec<Source>, RepositoryError> {
        let sources = self.sources.read().await;
        let mut matched: Vec<Source> =
            sources.values().filter(|s| s.pwsid == *pwsid).cloned().collect();
        matched.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        Ok(matched)
    }

    async fn save(&self, source: Source) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().await;
        let key = (source.pwsid.0.clone(), source.source_name.0.clone());
        match sources.get_mut(&key) {
            // Metrics are orchestrator-owned; a plain save never clears them.
            Some(existing) => {
                existing.source_type = source.source_type;
                existing.source_status = source.source_status;
            }
            None => {
                sources.insert(key, source);
            }
        }
        Ok(())
    }

    async fn save_metrics(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        metrics: &SourceMetrics,
    ) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().await;
        if let Some(source) = sources.get_mut(&(pwsid.0.clone(), source_name.0.clone())) {
            source.metrics = Some(metrics.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPfasResultRepository {
    records: RwLock<Vec<PfasObservation>>,
}

#[async_trait::async_trait]
impl PfasResultRepository for InMemoryPfasResultRepository {
    async fn insert(&self, record: PfasObservation) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn list_for_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Vec<PfasObservation>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.pwsid == *pwsid && r.source_name == *source_name)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryFlowRateRepository {
    records: RwLock<Vec<FlowObservation>>,
}

#[async_trait::async_trait]
impl FlowRateRepository for InMemoryFlowRateRepository {
    async fn insert(&self, record: FlowObservation) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn list_for_source(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
    ) -> Result<Vec<FlowObservation>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.pwsid == *pwsid && r.source_name == *source_name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use aquaclaim_core::domain::observation::{PwsId, SourceName};
    use aquaclaim_core::domain::source::{Pws, ScoreMethod, Source, SourceMetrics};

    use crate::repositories::{
        InMemoryPwsRepository, InMemorySourceRepository, PwsRepository, SourceRepository,
    };

    fn sample_metrics(gfe_tyco: f64, gfe_basf: f64) -> SourceMetrics {
        SourceMetrics {
            pfas_score: 10.0,
            pfas_score_method: ScoreMethod::MaxPfoaPfos,
            regulatory_bump: true,
            all_nds: false,
            afr: 50.0,
            afr_note: None,
            gfe_tyco,
            gfe_basf,
            gfe_total: gfe_tyco + gfe_basf,
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn aggregate_totals_sums_in_memory_sources() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let systems = InMemoryPwsRepository::with_sources(sources.clone());

        let pwsid = PwsId("CA0000001".to_string());
        systems
            .save(Pws { pwsid: pwsid.clone(), pws_name: None, totals: None, submit_date: None })
            .await
            .expect("save pws");

        for name in ["Well 01", "Well 02"] {
            sources
                .save(Source {
                    pwsid: pwsid.clone(),
                    source_name: SourceName(name.to_string()),
                    water_source_id: None,
                    source_type: None,
                    source_status: None,
                    metrics: None,
                })
                .await
                .expect("save source");
        }
        sources
            .save_metrics(&pwsid, &SourceName("Well 01".to_string()), &sample_metrics(10.0, 4.0))
            .await
            .expect("metrics 1");
        sources
            .save_metrics(&pwsid, &SourceName("Well 02".to_string()), &sample_metrics(6.0, 2.0))
            .await
            .expect("metrics 2");

        systems.aggregate_totals(&pwsid).await.expect("aggregate");

        let totals = systems
            .find(&pwsid)
            .await
            .expect("find")
            .expect("exists")
            .totals
            .expect("totals populated");
        assert_eq!(totals.gfe_tyco, 16.0);
        assert_eq!(totals.gfe_basf, 6.0);
        assert_eq!(totals.gfe_total, 22.0);
    }

    #[tokio::test]
    async fn source_save_never_clears_metrics() {
        let sources = InMemorySourceRepository::default();
        let pwsid = PwsId("CA0000001".to_string());
        let name = SourceName("Well 01".to_string());

        sources
            .save(Source {
                pwsid: pwsid.clone(),
                source_name: name.clone(),
                water_source_id: None,
                source_type: Some("Well".to_string()),
                source_status: None,
                metrics: None,
            })
            .await
            .expect("save");
        sources.save_metrics(&pwsid, &name, &sample_metrics(1.0, 1.0)).await.expect("metrics");

        sources
            .save(Source {
                pwsid: pwsid.clone(),
                source_name: name.clone(),
                water_source_id: None,
                source_type: Some("Well".to_string()),
                source_status: Some("Inactive".to_string()),
                metrics: None,
            })
            .await
            .expect("re-save");

        let found = sources.find(&pwsid, &name).await.expect("find").expect("exists");
        assert!(found.metrics.is_some());
        assert_eq!(found.source_status.as_deref(), Some("Inactive"));
    }
}
