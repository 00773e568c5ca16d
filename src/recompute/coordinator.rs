//! Recompute coordinator
//!
//! Drains invalidation events, rebuilds the network view and recomputes the
//! affected components concurrently. Each component computes on a blocking
//! thread under a hard timeout; at most one recompute per component runs at a
//! time.

use super::state::{NodeState, StateTable};
use super::RecomputeError;
use crate::algo::CancelToken;
use crate::config::RecomputeConfig;
use crate::graph::{Component, ComponentKey, GraphFilter, GraphStore, InvalidationCause, InvalidationEvent, Network, OrgId};
use crate::metrics::{ComputeMode, MetricRun, MetricsEngine, SharedMetrics};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Computes the full metric run of one component. Implementations must poll
/// `cancel` and return early once it is set.
pub trait ComponentCompute: Send + Sync + 'static {
    fn compute(&self, network: &Network, component: &Component, cancel: &CancelToken) -> MetricRun;
}

impl ComponentCompute for MetricsEngine {
    fn compute(&self, network: &Network, component: &Component, cancel: &CancelToken) -> MetricRun {
        self.compute_component(network, component, ComputeMode::Full, cancel)
    }
}

/// Outcome of one `run_cycle`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub events: usize,
    pub stale_organizations: usize,
    /// Stale organizations of failed components, left alone until invalidated again
    pub parked_organizations: usize,
    /// Components published from a full run
    pub recomputed: Vec<ComponentKey>,
    /// Components whose full run fell back to proxy values
    pub degraded: Vec<ComponentKey>,
    /// Components that exhausted their retries
    pub failed: Vec<ComponentKey>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.recomputed.is_empty() && self.degraded.is_empty() && self.failed.is_empty()
    }
}

/// Operator view of the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub cycles: u64,
    pub fresh: usize,
    pub stale: usize,
    pub recomputing: usize,
    pub parked: usize,
    pub failed_components: BTreeMap<ComponentKey, RecomputeError>,
}

enum ComponentOutcome {
    Published,
    Degraded,
    Failed,
    /// Nothing stale left; a concurrent cycle got there first
    Current,
}

pub struct RecomputeCoordinator {
    store: Arc<RwLock<GraphStore>>,
    metrics: SharedMetrics,
    compute: Arc<dyn ComponentCompute>,
    config: RecomputeConfig,
    events: tokio::sync::Mutex<UnboundedReceiver<InvalidationEvent>>,
    states: Mutex<StateTable>,
    component_locks: Mutex<HashMap<ComponentKey, Arc<tokio::sync::Mutex<()>>>>,
    failed: Mutex<BTreeMap<ComponentKey, RecomputeError>>,
    /// Organizations of failed components; skipped until touched again
    parked: Mutex<BTreeSet<OrgId>>,
    cycles: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecomputeCoordinator {
    pub fn new(
        store: Arc<RwLock<GraphStore>>,
        events: UnboundedReceiver<InvalidationEvent>,
        metrics: SharedMetrics,
        compute: Arc<dyn ComponentCompute>,
        config: RecomputeConfig,
    ) -> Self {
        RecomputeCoordinator {
            store,
            metrics,
            compute,
            config,
            events: tokio::sync::Mutex::new(events),
            states: Mutex::new(StateTable::new()),
            component_locks: Mutex::new(HashMap::new()),
            failed: Mutex::new(BTreeMap::new()),
            parked: Mutex::new(BTreeSet::new()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn state(&self, org: &OrgId) -> NodeState {
        lock(&self.states).state(org)
    }

    pub fn status(&self) -> CoordinatorStatus {
        let states = lock(&self.states);
        CoordinatorStatus {
            cycles: self.cycles.load(Ordering::Relaxed),
            fresh: states.count(NodeState::Fresh),
            stale: states.count(NodeState::Stale),
            recomputing: states.count(NodeState::Recomputing),
            parked: lock(&self.parked).len(),
            failed_components: lock(&self.failed).clone(),
        }
    }

    /// Mark one organization Stale outside of the event channel
    pub fn invalidate(&self, org: &OrgId) {
        lock(&self.parked).remove(org);
        lock(&self.states).mark_stale(org);
    }

    /// Mark every stored organization Stale, e.g. after loading a snapshot
    pub async fn invalidate_all(&self) {
        let store = self.store.read().await;
        lock(&self.parked).clear();
        let mut states = lock(&self.states);
        for org in store.organizations() {
            states.mark_stale(&org.id);
        }
    }

    /// Let the next cycle retry every failed component. Returns the number of
    /// organizations released.
    pub fn retry_failed(&self) -> usize {
        let mut parked = lock(&self.parked);
        let released = parked.len();
        parked.clear();
        if released > 0 {
            info!("Released {} organizations of failed components for retry", released);
        }
        released
    }

    async fn drain_events(&self) -> usize {
        let mut receiver = self.events.lock().await;
        let mut drained = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    drained += 1;
                    self.apply_event(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Invalidation channel closed");
                    break;
                }
            }
        }
        drained
    }

    fn apply_event(&self, event: InvalidationEvent) {
        lock(&self.parked).remove(&event.organization);
        if event.cause == InvalidationCause::OrganizationDeleted {
            lock(&self.states).forget(&event.organization);
            self.metrics.write().remove_organization(&event.organization);
        } else {
            lock(&self.states).mark_stale(&event.organization);
        }
    }

    /// One batch cycle: drain events, rebuild the view, recompute every
    /// component holding a stale organization that is not parked.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let events = self.drain_events().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let stale = lock(&self.states).in_state(NodeState::Stale);
        let due: BTreeSet<OrgId> = {
            let parked = lock(&self.parked);
            stale.iter().filter(|org| !parked.contains(*org)).cloned().collect()
        };
        let mut report = CycleReport {
            events,
            stale_organizations: stale.len(),
            parked_organizations: stale.len() - due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            report.elapsed = started.elapsed();
            return report;
        }

        let network = {
            let store = self.store.read().await;
            Arc::new(Network::rebuild(&store, &GraphFilter::default()))
        };

        let all_components = network.organization_components();
        self.prune_component_locks(&all_components);

        // Stale organizations no longer in the store
        let present: BTreeSet<&OrgId> = all_components.iter().flat_map(|c| c.organizations.iter()).collect();
        {
            let mut states = lock(&self.states);
            let mut parked = lock(&self.parked);
            for org in stale.iter().filter(|org| !present.contains(org)) {
                states.forget(org);
                parked.remove(org);
            }
        }

        let components: Vec<Component> = all_components
            .iter()
            .filter(|c| c.organizations.iter().any(|org| due.contains(org)))
            .cloned()
            .collect();

        info!(
            "Recompute cycle {}: {} events, {} stale organizations ({} parked) in {} components",
            cycle,
            events,
            stale.len(),
            report.parked_organizations,
            components.len()
        );

        let outcomes = join_all(
            components
                .into_iter()
                .map(|component| self.recompute_component(network.clone(), component)),
        )
        .await;

        for (key, outcome) in outcomes {
            match outcome {
                ComponentOutcome::Published => report.recomputed.push(key),
                ComponentOutcome::Degraded => report.degraded.push(key),
                ComponentOutcome::Failed => report.failed.push(key),
                ComponentOutcome::Current => {}
            }
        }
        report.elapsed = started.elapsed();
        info!(
            "Recompute cycle {} finished in {:?}: {} recomputed, {} degraded, {} failed",
            cycle,
            report.elapsed,
            report.recomputed.len(),
            report.degraded.len(),
            report.failed.len()
        );
        report
    }

    fn component_lock(&self, key: &ComponentKey) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.component_locks).entry(key.clone()).or_default().clone()
    }

    /// Drop locks of components that no longer exist and nobody holds
    fn prune_component_locks(&self, live: &[Component]) {
        let keys: BTreeSet<&ComponentKey> = live.iter().map(|c| &c.key).collect();
        lock(&self.component_locks).retain(|key, held| keys.contains(key) || Arc::strong_count(held) > 1);
    }

    async fn compute_blocking(
        &self,
        network: Arc<Network>,
        component: Component,
        cancel: CancelToken,
    ) -> Result<MetricRun, RecomputeError> {
        let compute = self.compute.clone();
        tokio::task::spawn_blocking(move || compute.compute(&network, &component, &cancel))
            .await
            .map_err(|e| RecomputeError::TaskFailed(e.to_string()))
    }

    async fn recompute_component(&self, network: Arc<Network>, component: Component) -> (ComponentKey, ComponentOutcome) {
        let key = component.key.clone();
        let component_lock = self.component_lock(&key);
        let _guard = component_lock.lock().await;
        let budget = Duration::from_millis(self.config.timeout_ms);

        let mut attempt: u32 = 0;
        loop {
            if lock(&self.states).begin(&component.organizations).is_empty() {
                debug!("{} has nothing stale left", key);
                return (key, ComponentOutcome::Current);
            }
            let cancel = CancelToken::new();
            let task = self.compute_blocking(network.clone(), component.clone(), cancel.clone());

            match tokio::time::timeout(budget, task).await {
                Ok(Ok(run)) => {
                    let degraded = run.degraded;
                    self.metrics.write().publish(run);
                    lock(&self.states).complete(&component.organizations);
                    self.release(&component);
                    debug!("Published {} (degraded: {})", key, degraded);
                    let outcome = if degraded {
                        ComponentOutcome::Degraded
                    } else {
                        ComponentOutcome::Published
                    };
                    return (key, outcome);
                }
                Ok(Err(e)) => {
                    error!("Recompute of {} failed: {}", key, e);
                    lock(&self.states).revert(&component.organizations);
                    self.park(&component, e);
                    return (key, ComponentOutcome::Failed);
                }
                Err(_) => {
                    cancel.cancel();
                    attempt += 1;
                    warn!("Recompute of {} timed out after {:?} (attempt {})", key, budget, attempt);
                    self.flag_degraded(&component);
                    lock(&self.states).revert(&component.organizations);

                    if attempt > self.config.max_retries {
                        error!("Giving up on {} after {} attempts", key, attempt);
                        self.park(
                            &component,
                            RecomputeError::Timeout {
                                component: key.clone(),
                                attempts: attempt,
                            },
                        );
                        return (key, ComponentOutcome::Failed);
                    }
                    tokio::time::sleep(self.backoff(attempt - 1)).await;
                }
            }
        }
    }

    /// `backoff_base_ms * 2^retry`
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(factor))
    }

    /// Prior runs stay readable, flagged degraded. Organizations without one
    /// have no metrics until a full run lands.
    fn flag_degraded(&self, component: &Component) {
        let flagged = self.metrics.write().mark_degraded(&component.organizations);
        if flagged.is_empty() {
            debug!("No prior metrics for {}; nothing to flag", component.key);
        } else {
            debug!("Flagged {} prior run(s) of {} degraded", flagged.len(), component.key);
        }
    }

    fn park(&self, component: &Component, error: RecomputeError) {
        lock(&self.failed).insert(component.key.clone(), error);
        lock(&self.parked).extend(component.organizations.iter().cloned());
    }

    fn release(&self, component: &Component) {
        lock(&self.failed).retain(|key, _| !component.organizations.contains(&key.0));
        lock(&self.parked).retain(|org| !component.organizations.contains(org));
    }

    /// Run cycles every `interval` until the returned handle is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run_cycle().await;
            }
        })
    }
}
