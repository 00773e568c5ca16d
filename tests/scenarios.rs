//! End-to-end scenarios over ingestion, the store and the query layer

use grantgraph::config::{MetricsConfig, PathfinderConfig};
use grantgraph::graph::{GraphFilter, GraphStore, NodeKey, OrgId};
use grantgraph::identity::{MatchReason, PersonCandidate, Resolution};
use grantgraph::ingest::{parse_records, RelationshipExtractor};
use grantgraph::metrics::{funder_similarity, SharedMetrics};
use grantgraph::query::{bundle, GraphHandle};

fn ingest(store: &mut GraphStore, json: &str) {
    let summary = RelationshipExtractor::new().ingest_batch(store, parse_records(json).unwrap());
    assert_eq!(summary.errors, 0, "unexpected errors: {:?}", summary.error_examples);
}

#[test]
fn bundle_returns_recipient_shared_by_two_funders() {
    let mut store = GraphStore::new();
    ingest(
        &mut store,
        r#"[
            {"type": "grant", "funder_id": "F1", "recipient_id": "R", "amount": 500000, "year": 2020},
            {"type": "grant", "funder_id": "F2", "recipient_id": "R", "amount": 600000, "year": 2022}
        ]"#,
    );

    let result = bundle(&store, &["F1".into(), "F2".into()], 2, None).unwrap();
    assert_eq!(result.grantees.len(), 1);
    let r = &result.grantees[0];
    assert_eq!(r.recipient, OrgId::from("R"));
    assert_eq!(r.funder_count, 2);
    assert_eq!(r.total_funding, 1_100_000.0);
}

#[test]
fn similar_names_are_queued_for_review() {
    let mut store = GraphStore::new();
    let first = store.resolve_person(&PersonCandidate::new("Dr. Jane A. Smith Jr.", "990-2021", "r1").unwrap());
    let second = store.resolve_person(&PersonCandidate::new("Jane Smith", "990-2022", "r2").unwrap());

    let first_key = &store.person(first.person_id()).unwrap().name.key;
    let second_key = &store.person(second.person_id()).unwrap().name.key;
    assert_ne!(first_key, second_key);

    match second {
        Resolution::Ambiguous { existing, reason, .. } => {
            assert_eq!(existing, first.person_id());
            assert_eq!(reason, MatchReason::FuzzyName);
        }
        other => panic!("expected an ambiguous match, got {:?}", other),
    }
    assert_eq!(store.person_count(), 2);
    assert_eq!(store.pending_reviews().len(), 1);
}

#[test]
fn connection_weight_counts_people_not_roles() {
    let mut store = GraphStore::new();
    ingest(
        &mut store,
        r#"[
            {"type": "role", "person_name": "Ann Lee", "organization_id": "A", "title": "Director", "source": "990", "filing_year": 2022},
            {"type": "role", "person_name": "Ann Lee", "organization_id": "A", "title": "Treasurer", "source": "990",
             "start_date": "2010-01-01", "end_date": "2015-06-30", "filing_year": 2015},
            {"type": "role", "person_name": "Ann Lee", "organization_id": "B", "title": "Director", "source": "990", "filing_year": 2022},
            {"type": "role", "person_name": "Bob Park", "organization_id": "A", "title": "Trustee", "source": "990", "filing_year": 2022},
            {"type": "role", "person_name": "Bob Park", "organization_id": "B", "title": "Trustee", "source": "990", "filing_year": 2022}
        ]"#,
    );

    assert_eq!(store.roles_for_organization(&"A".into()).len(), 3);
    let edge = store.connection(&"A".into(), &"B".into()).unwrap();
    assert_eq!(edge.weight(), 2);
    assert_eq!(store.connection_count(), 1);
}

#[test]
fn grant_only_link_has_no_role_path() {
    let mut store = GraphStore::new();
    ingest(
        &mut store,
        r#"[{"type": "grant", "funder_id": "X", "recipient_id": "Y", "amount": 25000, "year": 2022}]"#,
    );
    let handle = GraphHandle::build(&store, &GraphFilter::default(), SharedMetrics::new(), PathfinderConfig::default());
    let x = NodeKey::Organization("X".into());
    let y = NodeKey::Organization("Y".into());

    let search = handle.find_paths(&x, &y, Some(3), true).unwrap();
    assert!(search.paths.is_empty());

    // The direct grant is found once role hops are optional
    let search = handle.find_paths(&x, &y, Some(3), false).unwrap();
    assert_eq!(search.paths.len(), 1);
    assert_eq!(search.paths[0].hop_count(), 1);
}

#[test]
fn identical_portfolios_form_one_peer_group() {
    let mut store = GraphStore::new();
    let mut records = Vec::new();
    for funder in ["F1", "F2", "F3"] {
        for r in 1..=5 {
            records.push(format!(
                r#"{{"type": "grant", "funder_id": "{}", "recipient_id": "R{}", "amount": 10000, "year": 2022}}"#,
                funder, r
            ));
        }
    }
    for r in 1..=5 {
        records.push(format!(
            r#"{{"type": "grant", "funder_id": "F4", "recipient_id": "S{}", "amount": 10000, "year": 2022}}"#,
            r
        ));
    }
    ingest(&mut store, &format!("[{}]", records.join(",")));

    let report = funder_similarity(&store, &[], 0.5, &MetricsConfig::default());
    assert_eq!(report.peer_groups.len(), 1);
    let group: Vec<&str> = report.peer_groups[0].funders.iter().map(|f| f.as_str()).collect();
    assert_eq!(group, vec!["F1", "F2", "F3"]);
    assert!(report
        .peer_groups
        .iter()
        .all(|g| !g.funders.contains(&OrgId::from("F4"))));
    assert_eq!(report.graph.score(&"F1".into(), &"F4".into()), None);
}
