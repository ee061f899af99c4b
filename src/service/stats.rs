//! Stats flow: load counters and derive the ratio

use crate::error::DetectorResult;
use crate::stats::Stat;
use crate::storage::DnaStore;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn DnaStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn DnaStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> DetectorResult<Stat> {
        match self.store.load_stats().await {
            Ok(stat) => {
                debug!(
                    mutant = stat.mutant,
                    human = stat.human,
                    ratio = stat.ratio,
                    "Loaded stats"
                );
                Ok(stat)
            }
            Err(e) => {
                error!(backend = self.store.backend_name(), error = %e, "Failed to load stats");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::DnaKind;
    use crate::error::DetectorError;
    use crate::testing::mocks::MockStore;

    #[tokio::test]
    async fn test_empty_store_reports_zero_ratio() {
        let service = StatsService::new(Arc::new(MockStore::new()));
        let stat = service.stats().await.unwrap();
        assert_eq!(stat, Stat::default());
        assert_eq!(stat.ratio, 0.0);
    }

    #[tokio::test]
    async fn test_ratio_from_counters() {
        let store = Arc::new(MockStore::new());
        store.increment_stat(DnaKind::Mutant).await.unwrap();
        for _ in 0..3 {
            store.increment_stat(DnaKind::Human).await.unwrap();
        }

        let stat = StatsService::new(store).stats().await.unwrap();
        assert_eq!(stat.mutant, 1);
        assert_eq!(stat.human, 3);
        assert_eq!(stat.ratio, 0.33);
    }

    #[tokio::test]
    async fn test_mutants_without_humans() {
        let store = Arc::new(MockStore::new());
        store.increment_stat(DnaKind::Mutant).await.unwrap();
        store.increment_stat(DnaKind::Mutant).await.unwrap();

        let stat = StatsService::new(store).stats().await.unwrap();
        assert_eq!(stat.ratio, 2.0);
    }

    #[tokio::test]
    async fn test_store_failure() {
        let service = StatsService::new(Arc::new(MockStore::with_failure()));
        let error = service.stats().await.unwrap_err();
        assert!(matches!(error, DetectorError::Storage(_)));
        assert_eq!(error.status_code(), 500);
    }
}
