//! Invariants checked over generated networks

use grantgraph::algo::CancelToken;
use grantgraph::config::{MetricsConfig, PathfinderConfig, RecomputeConfig};
use grantgraph::graph::{Component, GrantDraft, GraphFilter, GraphStore, Network, NodeKey, OrgId, OrgPair};
use grantgraph::identity::{PersonCandidate, PersonRegistry};
use grantgraph::ingest::{parse_records, IngestRecord, RelationshipExtractor};
use grantgraph::metrics::{funder_similarity, ComputeMode, MetricRun, MetricsEngine, SharedMetrics};
use grantgraph::query::{bundle, Pathfinder};
use grantgraph::recompute::{ComponentCompute, NodeState, RecomputeCoordinator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

fn generated_records(seed: u64, funders: u64, recipients: u64, grants: usize) -> Vec<IngestRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut json = Vec::new();
    for _ in 0..grants {
        json.push(format!(
            r#"{{"type": "grant", "funder_id": "F{}", "recipient_id": "R{}", "amount": {}, "year": {}}}"#,
            rng.gen_range(0..funders),
            rng.gen_range(0..recipients),
            1_000 * rng.gen_range(1..=50u64),
            rng.gen_range(2018..2024)
        ));
    }
    let people = ["Ann Lee", "Bob Park", "Cy Young", "Dee Moss", "Eve Hart"];
    let titles = ["Director", "Trustee", "Executive Director", "Board Chair", "Advisor"];
    for i in 0..people.len() * 3 {
        let org = if rng.gen_bool(0.5) {
            format!("F{}", rng.gen_range(0..funders))
        } else {
            format!("R{}", rng.gen_range(0..recipients))
        };
        json.push(format!(
            r#"{{"type": "role", "person_name": "{}", "organization_id": "{}", "title": "{}", "source": "990", "filing_year": {}}}"#,
            people[i % people.len()],
            org,
            titles[rng.gen_range(0..titles.len())],
            rng.gen_range(2019..2023)
        ));
    }
    parse_records(&format!("[{}]", json.join(","))).unwrap()
}

fn generated_store(seed: u64) -> GraphStore {
    let mut store = GraphStore::new();
    RelationshipExtractor::new().ingest_batch(&mut store, generated_records(seed, 6, 12, 60));
    store
}

#[test]
fn reingesting_a_batch_changes_nothing() {
    let records = generated_records(7, 5, 10, 40);
    let extractor = RelationshipExtractor::new();
    let mut store = GraphStore::new();
    extractor.ingest_batch(&mut store, records.clone());

    let totals = |store: &GraphStore| -> BTreeMap<(OrgId, OrgId), f64> {
        store
            .grants()
            .map(|g| ((g.funder.clone(), g.recipient.clone()), g.amount_in(None)))
            .collect()
    };
    let before = (store.role_count(), store.grant_count(), store.connection_count(), totals(&store));

    let replay = extractor.ingest_batch(&mut store, records);
    assert_eq!(replay.roles_inserted + replay.roles_updated, 0);
    assert_eq!(replay.grants_inserted + replay.grants_updated, 0);
    assert_eq!(replay.connections_changed, 0);
    assert_eq!(before, (store.role_count(), store.grant_count(), store.connection_count(), totals(&store)));
}

#[test]
fn person_merge_is_associative() {
    let mut registry = PersonRegistry::default();
    let people: Vec<_> = [("Ann Lee", "990", 0.4, "Chair"), ("Bob Park", "web", 0.8, "Long serving chair"), ("Cy Young", "990", 0.6, "")]
        .iter()
        .enumerate()
        .map(|(i, (name, source, confidence, bio))| {
            let candidate = PersonCandidate::new(name, *source, format!("rec-{}", i))
                .unwrap()
                .with_confidence(*confidence)
                .with_biography((!bio.is_empty()).then_some(*bio));
            let id = registry.resolve(&candidate).person_id();
            registry.get(id).unwrap().clone()
        })
        .collect();
    let (a, b, c) = (&people[0], &people[1], &people[2]);

    let left = a.merge(b).merge(c);
    let right = a.merge(&b.merge(c));
    assert_eq!(left.sources, right.sources);
    assert_eq!(left.biography, right.biography);
    assert_eq!(left.confidence, right.confidence);
    assert_eq!(left.source_count, right.source_count);
    assert_eq!(a.merge(b).sources, b.merge(a).sources);
}

#[test]
fn connection_pairs_are_canonical() {
    let store = generated_store(11);
    let mut seen = HashSet::new();
    for edge in store.connections() {
        assert!(edge.pair.low() < edge.pair.high());
        assert!(seen.insert(edge.pair.clone()));
        assert_eq!(
            store.connection(edge.pair.low(), edge.pair.high()),
            store.connection(edge.pair.high(), edge.pair.low())
        );
        assert!(edge.weight() >= 1);
    }
    assert_eq!(OrgPair::new("B".into(), "A".into()), OrgPair::new("A".into(), "B".into()));
}

#[test]
fn bundle_membership_matches_distinct_funder_count() {
    let store = generated_store(23);
    let funders: Vec<OrgId> = (0..4).map(|f| OrgId::new(format!("F{}", f))).collect();
    let funders: Vec<OrgId> = funders.into_iter().filter(|f| store.has_organization(f)).collect();
    let years = [2019, 2020, 2021];

    for min_funders in 1..=funders.len() {
        for tax_years in [None, Some(&years[..])] {
            let result = bundle(&store, &funders, min_funders, tax_years).unwrap();
            let mut expected: BTreeMap<OrgId, BTreeSet<OrgId>> = BTreeMap::new();
            for grant in store.grants().filter(|g| funders.contains(&g.funder)) {
                let funded = grant
                    .contributions
                    .iter()
                    .any(|c| tax_years.map_or(true, |ys| ys.contains(&c.year)));
                if funded {
                    expected.entry(grant.recipient.clone()).or_default().insert(grant.funder.clone());
                }
            }
            let expected: BTreeSet<OrgId> = expected
                .into_iter()
                .filter(|(_, f)| f.len() >= min_funders)
                .map(|(r, _)| r)
                .collect();
            let actual: BTreeSet<OrgId> = result.grantees.iter().map(|g| g.recipient.clone()).collect();
            assert_eq!(actual, expected, "min_funders={} years={:?}", min_funders, tax_years);
        }
    }
}

#[test]
fn similarity_is_bounded_and_symmetric() {
    let store = generated_store(31);
    let report = funder_similarity(&store, &[], 0.0, &MetricsConfig::default());
    let funders = &report.graph.funders;
    assert!(funders.len() >= 2);

    for edge in &report.graph.edges {
        assert!(edge.a < edge.b, "self or unordered pair {} {}", edge.a, edge.b);
        assert!((0.0..=1.0).contains(&edge.score));
        assert!((0.0..=1.0).contains(&edge.jaccard));
        assert!(edge.recent_shared <= edge.shared_recipients);
    }
    for x in funders {
        assert_eq!(report.graph.score(x, x), None);
        for y in funders {
            assert_eq!(report.graph.score(x, y), report.graph.score(y, x));
        }
    }
}

#[test]
fn paths_respect_hop_bound_and_never_revisit() {
    let store = generated_store(47);
    let network = Network::rebuild(&store, &GraphFilter::default());
    let pathfinder = Pathfinder::new(PathfinderConfig {
        top_n: 50,
        ..PathfinderConfig::default()
    });
    let orgs: Vec<NodeKey> = store.organizations().map(|o| NodeKey::Organization(o.id.clone())).take(6).collect();

    for max_hops in 1..=4 {
        for source in &orgs {
            for target in orgs.iter().filter(|t| *t != source) {
                let search = pathfinder
                    .find_paths(&network, source, target, Some(max_hops), false, &CancelToken::new())
                    .unwrap();
                for path in &search.paths {
                    assert!(path.hop_count() <= max_hops);
                    assert_eq!(path.steps.len(), path.hop_count() + 1);
                    let distinct: HashSet<&NodeKey> = path.steps.iter().map(|s| &s.key).collect();
                    assert_eq!(distinct.len(), path.steps.len());
                    assert!(path.strength > 0.0 && path.strength <= 1.0);
                }
            }
        }
    }
}

/// Full runs block until cancelled while `stuck` is set
#[derive(Default)]
struct Stuck {
    stuck: AtomicBool,
}

impl ComponentCompute for Stuck {
    fn compute(&self, network: &Network, component: &Component, cancel: &CancelToken) -> MetricRun {
        while self.stuck.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(1));
        }
        MetricsEngine::default().compute_component(network, component, ComputeMode::Full, cancel)
    }
}

fn grant(store: &mut GraphStore, funder: &str, recipient: &str) {
    store.ensure_organization(&funder.into(), None);
    store.ensure_organization(&recipient.into(), None);
    store
        .upsert_grant(GrantDraft {
            funder: funder.into(),
            recipient: recipient.into(),
            recipient_name: None,
            amount: 5_000.0,
            year: 2022,
            purpose: None,
        })
        .unwrap();
}

#[tokio::test]
async fn timed_out_recompute_is_flagged_degraded() {
    let (mut store, rx) = GraphStore::with_invalidations();
    grant(&mut store, "F", "R1");
    grant(&mut store, "F", "R2");
    let store = Arc::new(RwLock::new(store));
    let compute = Arc::new(Stuck::default());
    let coordinator = RecomputeCoordinator::new(
        store.clone(),
        rx,
        SharedMetrics::new(),
        compute.clone(),
        RecomputeConfig {
            timeout_ms: 10,
            max_retries: 1,
            backoff_base_ms: 1,
        },
    );
    assert_eq!(coordinator.run_cycle().await.recomputed.len(), 1);
    let published = coordinator.metrics().read().run_for_organization(&"F".into()).unwrap();
    assert!(!published.degraded);

    compute.stuck.store(true, Ordering::SeqCst);
    grant(&mut *store.write().await, "F", "R3");
    let report = coordinator.run_cycle().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(coordinator.state(&"F".into()), NodeState::Stale);

    let metrics = coordinator.metrics().read();
    for org in ["F", "R1", "R2"] {
        let influence = metrics.influence(&NodeKey::Organization(org.into())).unwrap();
        assert!(influence.degraded, "{} not flagged", org);
        assert_eq!(influence.version, published.version);
    }
    let run = metrics.run_for_organization(&"F".into()).unwrap();
    assert!(run.degraded);
    assert_eq!(run.organizations, published.organizations);
    // Never computed: no metrics rather than made-up ones
    assert!(metrics.influence(&NodeKey::Organization("R3".into())).is_none());
}
