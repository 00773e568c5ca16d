//! Network service
//!
//! Owns the shared store, the published metrics and the recompute
//! coordinator, and exposes the query surface over them.

use crate::algo::CancelToken;
use crate::config::NetworkConfig;
use crate::graph::{snapshot, GraphFilter, GraphStore, NodeKey, OrgId, SnapshotInfo};
use crate::ingest::{parse_records, BatchSummary, IngestRecord, OrganizationDirectory, RelationshipExtractor};
use crate::metrics::{funder_similarity, InfluenceReport, MetricsEngine, SharedMetrics, SimilarityReport};
use crate::query::{bundle, BundledGrantees, GraphHandle, GraphStats, PathSearch, QueryError, QueryResult};
use crate::recompute::{CoordinatorStatus, CycleReport, RecomputeCoordinator};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct GrantNetwork {
    config: NetworkConfig,
    store: Arc<RwLock<GraphStore>>,
    metrics: SharedMetrics,
    extractor: RelationshipExtractor,
    coordinator: Arc<RecomputeCoordinator>,
}

impl GrantNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let store = GraphStore::with_fuzzy_threshold(config.identity.fuzzy_threshold);
        Self::from_store(store, config)
    }

    /// Wrap an existing store; its mutations feed this network's coordinator
    pub fn from_store(mut store: GraphStore, config: NetworkConfig) -> Self {
        let (tx, rx) = unbounded_channel();
        store.invalidation_sender = Some(tx);
        let store = Arc::new(RwLock::new(store));
        let metrics = SharedMetrics::new();
        let coordinator = Arc::new(RecomputeCoordinator::new(
            store.clone(),
            rx,
            metrics.clone(),
            Arc::new(MetricsEngine::new(config.metrics.clone())),
            config.recompute.clone(),
        ));
        let extractor = RelationshipExtractor::new().with_default_confidence(config.identity.default_confidence);

        GrantNetwork {
            config,
            store,
            metrics,
            extractor,
            coordinator,
        }
    }

    /// Load a snapshot; every organization starts Stale
    pub async fn open(path: impl AsRef<Path>, config: NetworkConfig) -> Result<Self> {
        let store = snapshot::load(path)?;
        let network = Self::from_store(store, config);
        network.coordinator.invalidate_all().await;
        Ok(network)
    }

    pub fn with_directory(mut self, directory: Arc<dyn OrganizationDirectory>) -> Self {
        self.extractor = self.extractor.with_directory(directory);
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RwLock<GraphStore>> {
        &self.store
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn coordinator(&self) -> &Arc<RecomputeCoordinator> {
        &self.coordinator
    }

    pub async fn ingest(&self, records: Vec<IngestRecord>) -> BatchSummary {
        let mut store = self.store.write().await;
        self.extractor.ingest_batch(&mut store, records)
    }

    pub async fn ingest_json(&self, json: &str) -> Result<BatchSummary> {
        let records = parse_records(json)?;
        Ok(self.ingest(records).await)
    }

    /// Run one recompute cycle over everything invalidated since the last
    pub async fn recompute(&self) -> CycleReport {
        self.coordinator.run_cycle().await
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub async fn build_graph(&self, filter: &GraphFilter) -> GraphHandle {
        let store = self.store.read().await;
        GraphHandle::build(&store, filter, self.metrics.clone(), self.config.pathfinder.clone())
    }

    pub async fn bundle(
        &self,
        funder_ids: &[OrgId],
        min_funders: usize,
        tax_years: Option<&[i32]>,
    ) -> QueryResult<BundledGrantees> {
        let store = self.store.read().await;
        bundle(&store, funder_ids, min_funders, tax_years)
    }

    /// Funder similarity at `threshold` (the configured default when `None`)
    pub async fn similarity(&self, funder_ids: &[OrgId], threshold: Option<f64>) -> QueryResult<SimilarityReport> {
        let threshold = threshold.unwrap_or(self.config.metrics.similarity_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(QueryError::InvalidQuery(format!(
                "similarity threshold {} is outside [0, 1]",
                threshold
            )));
        }
        let store = self.store.read().await;
        Ok(funder_similarity(&store, funder_ids, threshold, &self.config.metrics))
    }

    pub async fn stats(&self) -> GraphStats {
        self.build_graph(&GraphFilter::default()).await.stats()
    }

    pub async fn influence(&self, key: &NodeKey) -> QueryResult<InfluenceReport> {
        self.build_graph(&GraphFilter::default()).await.influence(key)
    }

    /// Bounded path search under the configured time budget. On timeout the
    /// search is cancelled and whatever it found so far is returned, flagged
    /// truncated.
    pub async fn find_paths(
        &self,
        handle: &GraphHandle,
        source: &NodeKey,
        target: &NodeKey,
        max_hops: Option<usize>,
        require_role_hop: bool,
    ) -> QueryResult<PathSearch> {
        let cancel = CancelToken::new();
        let budget = Duration::from_millis(self.config.pathfinder.timeout_ms);
        let mut task = {
            let (handle, source, target, cancel) = (handle.clone(), source.clone(), target.clone(), cancel.clone());
            tokio::task::spawn_blocking(move || {
                handle.find_paths_cancellable(&source, &target, max_hops, require_role_hop, &cancel)
            })
        };

        let joined = match tokio::time::timeout(budget, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Path search {} -> {} exceeded {:?}, cancelling", source, target, budget);
                cancel.cancel();
                task.await
            }
        };
        joined.map_err(|e| QueryError::InvalidQuery(format!("path search failed: {}", e)))?
    }

    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<SnapshotInfo> {
        let store = self.store.read().await;
        let info = snapshot::save(&store, path)?;
        info!(
            "Snapshot saved: {} organizations, {} persons, {} roles, {} grants",
            info.organizations, info.persons, info.roles, info.grants
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PersonId;
    use tempfile::TempDir;

    const RECORDS: &str = r#"[
        {"type": "grant", "funder_id": "F1", "recipient_id": "R", "recipient_name": "Food Bank", "amount": 500000, "year": 2021},
        {"type": "grant", "funder_id": "F2", "recipient_id": "R", "amount": 600000, "year": 2022},
        {"type": "role", "person_name": "Ann Lee", "organization_id": "F1", "title": "Board Chair", "source": "990", "filing_year": 2022},
        {"type": "role", "person_name": "Ann Lee", "organization_id": "F2", "title": "Director", "source": "990", "filing_year": 2022}
    ]"#;

    #[tokio::test]
    async fn test_ingest_recompute_and_query() {
        let network = GrantNetwork::new(NetworkConfig::default());
        let summary = network.ingest_json(RECORDS).await.unwrap();
        assert_eq!(summary.grants_inserted, 2);
        assert_eq!(summary.roles_inserted, 2);

        let report = network.recompute().await;
        assert_eq!(report.recomputed.len(), 1);

        let bundled = network.bundle(&["F1".into(), "F2".into()], 2, None).await.unwrap();
        assert_eq!(bundled.grantees.len(), 1);
        assert_eq!(bundled.grantees[0].name, "Food Bank");

        let stats = network.stats().await;
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.top_connectors[0].organizations, 2);

        let influence = network.influence(&NodeKey::Organization("R".into())).await.unwrap();
        assert!(!influence.degraded);
        assert!(network.influence(&NodeKey::Person(PersonId(999))).await.is_err());
    }

    #[tokio::test]
    async fn test_find_paths_through_board_member() {
        let network = GrantNetwork::new(NetworkConfig::default());
        network.ingest_json(RECORDS).await.unwrap();
        let handle = network.build_graph(&GraphFilter::default()).await;

        let search = network
            .find_paths(
                &handle,
                &NodeKey::Organization("F1".into()),
                &NodeKey::Organization("F2".into()),
                Some(2),
                true,
            )
            .await
            .unwrap();
        assert!(!search.truncated);
        assert_eq!(search.paths.len(), 1);
        assert_eq!(search.paths[0].role_hops(), 2);

        let too_far = network
            .find_paths(&handle, &NodeKey::Organization("F1".into()), &NodeKey::Organization("R".into()), Some(0), false)
            .await;
        assert!(matches!(too_far, Err(QueryError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_similarity_threshold_validation() {
        let network = GrantNetwork::new(NetworkConfig::default());
        network.ingest_json(RECORDS).await.unwrap();

        let report = network.similarity(&[], None).await.unwrap();
        assert_eq!(report.graph.funders.len(), 2);
        assert!(matches!(
            network.similarity(&[], Some(1.5)).await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_reopen_recomputes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("network.snapshot");

        let network = GrantNetwork::new(NetworkConfig::default());
        network.ingest_json(RECORDS).await.unwrap();
        let info = network.save_snapshot(&path).await.unwrap();
        assert_eq!(info.organizations, 3);

        let reopened = GrantNetwork::open(&path, NetworkConfig::default()).await.unwrap();
        assert_eq!(reopened.status().stale, 3);
        let report = reopened.recompute().await;
        assert_eq!(report.recomputed.len(), 1);
        assert_eq!(reopened.status().fresh, 3);
    }
}
