//! Integration tests for PgStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests share one database, so each works only with ids it created.

use sqlx::PgPool;
use uuid::Uuid;

use talentgraph_common::types::{
    AffiliationFact, ContentItem, EdgeKey, ExternalId, InfluenceSignals, OrgType, Organization,
    Person, PersonMetrics, RelationEdge, RelationType,
};
use talentgraph_common::{LinkType, TalentGraphError};
use talentgraph_graph::{
    run_migrations, ContentRepository, EntityRepository, OrgMergePlan, OrganizationRepository,
    PersonIngestPlan, PgStore, RelationChanges, RelationRepository,
};

async fn test_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    run_migrations(&pool).await.ok()?;
    Some(PgStore::new(pool))
}

fn unique_qid() -> ExternalId {
    // Random but well-formed.
    let n = (Uuid::new_v4().as_u128() % 1_000_000_000) + 1_000_000_000;
    ExternalId::new(format!("Q{n}"))
}

async fn person(store: &PgStore, name: &str) -> Uuid {
    let p = Person::new(name);
    store.create_person(&p).await.unwrap();
    p.id
}

#[tokio::test]
async fn person_round_trip() {
    let Some(store) = test_store().await else {
        return;
    };

    let qid = unique_qid();
    let p = Person::new("Fei-Fei Li")
        .with_external_id(qid.clone())
        .with_aliases(["Li Feifei"])
        .with_topics(["vision"]);
    store.create_person(&p).await.unwrap();

    let loaded = store.find_person_by_external_id(&qid).await.unwrap().unwrap();
    assert_eq!(loaded.id, p.id);
    assert_eq!(loaded.aliases, vec!["Li Feifei".to_string()]);
    assert!(loaded.topics.contains("vision"));
}

#[tokio::test]
async fn duplicate_external_id_is_identifier_conflict() {
    let Some(store) = test_store().await else {
        return;
    };

    let qid = unique_qid();
    let first = Person::new("Andrew Ng").with_external_id(qid.clone());
    store.create_person(&first).await.unwrap();

    let err = store
        .create_person(&Person::new("Andrew Y. Ng").with_external_id(qid))
        .await
        .unwrap_err();
    match TalentGraphError::from_store(err) {
        TalentGraphError::IdentifierConflict { existing_id, .. } => {
            assert_eq!(existing_id, first.id)
        }
        other => panic!("expected IdentifierConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn set_external_id_fills_only_empty_and_free_ids() {
    let Some(store) = test_store().await else {
        return;
    };

    let qid = unique_qid();
    let hinton = person(&store, "Geoffrey Hinton").await;
    let other = person(&store, "Geoffrey E. Hinton").await;

    store.set_external_id(hinton, &qid).await.unwrap();
    let loaded = store.get_person(hinton).await.unwrap().unwrap();
    assert_eq!(loaded.external_id, Some(qid.clone()));
    assert!(store.set_external_id(hinton, &unique_qid()).await.is_err());

    let err = store.set_external_id(other, &qid).await.unwrap_err();
    match TalentGraphError::from_store(err) {
        TalentGraphError::IdentifierConflict { existing_id, .. } => assert_eq!(existing_id, hinton),
        other => panic!("expected IdentifierConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn ingest_plan_applies_all_or_nothing() {
    let Some(store) = test_store().await else {
        return;
    };

    let p = Person::new("Demis Hassabis").with_external_id(unique_qid());
    let org = Organization::new("DeepMind", OrgType::Company);
    let link = ContentItem::new(
        p.id,
        LinkType::Official {
            url: "https://deepmind.google".to_string(),
        },
    );
    let good = PersonIngestPlan {
        person: Some(p.clone()),
        organizations: vec![org.clone()],
        affiliations: vec![AffiliationFact::new(p.id, org.id, "CEO")],
        content: vec![link],
    };
    store.apply_ingest(&good).await.unwrap();
    assert!(store.get_person(p.id).await.unwrap().is_some());
    let facts = store.list_affiliations().await.unwrap();
    assert!(facts.iter().any(|a| a.person_id == p.id && a.organization_id == org.id));

    // The second affiliation points at an organization nobody created.
    let q = Person::new("Shane Legg").with_external_id(unique_qid());
    let orphan_org = Organization::new("DeepMind Technologies", OrgType::Company);
    let bad = PersonIngestPlan {
        person: Some(q.clone()),
        organizations: vec![orphan_org.clone()],
        affiliations: vec![
            AffiliationFact::new(q.id, orphan_org.id, "Cofounder"),
            AffiliationFact::new(q.id, Uuid::new_v4(), "Chief Scientist"),
        ],
        content: Vec::new(),
    };
    assert!(store.apply_ingest(&bad).await.is_err());
    assert!(store.get_person(q.id).await.unwrap().is_none());
    let orgs = store.list_organizations().await.unwrap();
    assert!(orgs.iter().all(|o| o.id != orphan_org.id));
}

#[tokio::test]
async fn aliases_are_merged_case_insensitively() {
    let Some(store) = test_store().await else {
        return;
    };

    let id = person(&store, "Ilya Sutskever").await;
    let added = store
        .add_aliases(id, &["ilya sutskever".to_string(), "Ilya".to_string(), "ILYA".to_string()])
        .await
        .unwrap();

    assert_eq!(added, 1);
    let loaded = store.get_person(id).await.unwrap().unwrap();
    assert_eq!(loaded.aliases, vec!["Ilya".to_string()]);
}

#[tokio::test]
async fn signals_count_content_items() {
    let Some(store) = test_store().await else {
        return;
    };

    let id = person(&store, "Chris Olah").await;
    store
        .upsert_signals(
            id,
            &InfluenceSignals {
                popularity: 1200,
                citations: 40_000,
                h_index: 30,
                qualitative_rating: Some(8.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    for _ in 0..2 {
        let item = ContentItem::new(
            id,
            LinkType::Official {
                url: "https://colah.github.io".to_string(),
            },
        );
        store.add_content(&item).await.unwrap();
    }

    let signals = store.influence_signals(id).await.unwrap();
    assert_eq!(signals.content_items, 2);
    assert_eq!(signals.popularity, 1200);
    assert_eq!(signals.h_index, 30);

    store
        .save_metrics(&[PersonMetrics {
            person_id: id,
            influence_score: 42.5,
            topic_ranks: [("interpretability".to_string(), 1)].into(),
        }])
        .await
        .unwrap();
    let loaded = store.get_person(id).await.unwrap().unwrap();
    assert_eq!(loaded.influence_score, 42.5);
    assert_eq!(loaded.topic_ranks["interpretability"], 1);
}

#[tokio::test]
async fn save_metrics_for_unknown_person_changes_nothing() {
    let Some(store) = test_store().await else {
        return;
    };

    let id = person(&store, "Demis Hassabis").await;
    let result = store
        .save_metrics(&[
            PersonMetrics {
                person_id: id,
                influence_score: 90.0,
                topic_ranks: Default::default(),
            },
            PersonMetrics {
                person_id: Uuid::new_v4(),
                influence_score: 10.0,
                topic_ranks: Default::default(),
            },
        ])
        .await;

    assert!(result.is_err());
    assert_eq!(store.get_person(id).await.unwrap().unwrap().influence_score, 0.0);
}

#[tokio::test]
async fn merge_moves_facts_and_deletes_losers() {
    let Some(store) = test_store().await else {
        return;
    };

    let survivor = Organization::new("Anthropic", OrgType::Company).with_external_id(unique_qid());
    let loser =
        Organization::new("anthropic", OrgType::Company).with_localized_name("Anthropic 公司");
    store.create_organization(&survivor).await.unwrap();
    store.create_organization(&loser).await.unwrap();

    let pid = person(&store, "Dario Amodei").await;
    let kept = AffiliationFact::new(pid, survivor.id, "CEO");
    let dup = AffiliationFact::new(pid, loser.id, "ceo");
    let moved = AffiliationFact::new(pid, loser.id, "Cofounder");
    for fact in [&kept, &dup, &moved] {
        store.add_affiliation(fact).await.unwrap();
    }

    store
        .apply_merge(&OrgMergePlan {
            survivor_id: survivor.id,
            loser_ids: vec![loser.id],
            repoint_affiliations: vec![moved.id],
            drop_affiliations: vec![dup.id],
            repoint_content: vec![],
            adopt_localized_name: Some("Anthropic 公司".to_string()),
        })
        .await
        .unwrap();

    let orgs = store.list_organizations().await.unwrap();
    assert!(!orgs.iter().any(|o| o.id == loser.id));
    let kept_org = orgs.iter().find(|o| o.id == survivor.id).unwrap();
    assert_eq!(kept_org.localized_name.as_deref(), Some("Anthropic 公司"));

    let facts: Vec<_> = store
        .list_affiliations()
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.person_id == pid)
        .collect();
    assert_eq!(facts.len(), 2);
    assert!(facts.iter().all(|a| a.organization_id == survivor.id));
}

#[tokio::test]
async fn merge_with_dangling_reference_rolls_back() {
    let Some(store) = test_store().await else {
        return;
    };

    let survivor = Organization::new("Mila", OrgType::University);
    let loser = Organization::new("MILA", OrgType::University);
    store.create_organization(&survivor).await.unwrap();
    store.create_organization(&loser).await.unwrap();
    let pid = person(&store, "Yoshua Bengio").await;
    let fact = AffiliationFact::new(pid, loser.id, "Founder");
    store.add_affiliation(&fact).await.unwrap();

    // The plan forgets the affiliation, so deleting the loser violates the FK.
    let result = store
        .apply_merge(&OrgMergePlan {
            survivor_id: survivor.id,
            loser_ids: vec![loser.id],
            ..Default::default()
        })
        .await;

    assert!(result.is_err());
    let orgs = store.list_organizations().await.unwrap();
    assert!(orgs.iter().any(|o| o.id == loser.id));
}

#[tokio::test]
async fn relation_changes_apply_once() {
    let Some(store) = test_store().await else {
        return;
    };

    let (a, b, c) = (
        person(&store, "Student").await,
        person(&store, "Advisor").await,
        person(&store, "Peer").await,
    );
    let flip = RelationEdge::new(b, a, RelationType::Advisor, "legacy-source");
    let drop = RelationEdge::new(a, c, RelationType::Colleague, "legacy-source");
    store.insert_relation(&flip).await.unwrap();
    store.insert_relation(&drop).await.unwrap();

    let migration = format!("reverse-source:test-{}", Uuid::new_v4());
    let changes = RelationChanges {
        reverse: vec![flip.id],
        delete: vec![drop.id],
        migration: Some(migration.clone()),
    };
    store.apply_changes(&changes).await.unwrap();

    let found = store
        .find_relation(&EdgeKey::new(a, b, RelationType::Advisor))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, flip.id);
    assert!(store.get_relation(drop.id).await.unwrap().is_none());
    assert!(store.migration_applied(&migration).await.unwrap());

    let again = RelationChanges {
        reverse: vec![flip.id],
        delete: vec![],
        migration: Some(migration),
    };
    assert!(store.apply_changes(&again).await.is_err());
    let still = store.get_relation(flip.id).await.unwrap().unwrap();
    assert_eq!((still.source_id, still.target_id), (a, b));
}

#[tokio::test]
async fn content_links_round_trip_as_tagged_json() {
    let Some(store) = test_store().await else {
        return;
    };

    let pid = person(&store, "Andrej Karpathy").await;
    let mut item = ContentItem::new(
        pid,
        LinkType::Repository {
            url: "https://github.com/karpathy/nanoGPT".to_string(),
            stars: Some(30_000),
        },
    );
    item.first_party = true;
    store.add_content(&item).await.unwrap();

    let loaded = store
        .list_content()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.id == item.id)
        .unwrap();
    assert_eq!(loaded.link, item.link);
    assert!(loaded.first_party);

    assert_eq!(store.delete_content(&[item.id, Uuid::new_v4()]).await.unwrap(), 1);
}
