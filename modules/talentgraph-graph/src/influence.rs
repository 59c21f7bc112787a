use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use talentgraph_common::config::InfluenceConfig;
use talentgraph_common::types::{InfluenceSignals, Person, PersonMetrics};
use talentgraph_common::TalentGraphError;

use crate::store::EntityRepository;

/// The four normalized factors behind one influence score, each in `[0, cap]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfluenceBreakdown {
    pub content: f64,
    pub popularity: f64,
    pub academic: f64,
    pub qualitative: f64,
    pub total: f64,
}

/// Weighted influence score from heterogeneous signals.
///
/// Every factor is a non-decreasing function of its input and is capped, so
/// raising one signal never lowers the total and no single heavy-tailed
/// count can dominate the ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfluenceScorer {
    config: InfluenceConfig,
}

impl InfluenceScorer {
    pub fn new(config: InfluenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InfluenceConfig {
        &self.config
    }

    /// Saturating linear function of the number of content items.
    pub fn content_factor(&self, items: u64) -> f64 {
        self.cap(items as f64 * self.config.content_points_per_item)
    }

    /// `min(cap, scale * log10(count + 1))`.
    pub fn popularity_factor(&self, count: u64) -> f64 {
        self.log_scaled(count, self.config.popularity_log_scale)
    }

    /// Log-scaled citations and linear h-index, blended by `citation_share`.
    pub fn academic_factor(&self, citations: u64, h_index: u32) -> f64 {
        let share = self.config.citation_share;
        let cites = self.log_scaled(citations, self.config.citation_log_scale);
        let h = self.cap(h_index as f64 * self.config.h_index_points);
        share * cites + (1.0 - share) * h
    }

    /// 0–10 rating rescaled; missing ratings count as zero.
    pub fn qualitative_factor(&self, rating: Option<f64>) -> f64 {
        let rating = rating.filter(|r| r.is_finite()).unwrap_or(0.0).clamp(0.0, 10.0);
        self.cap(rating * self.config.qualitative_scale)
    }

    pub fn breakdown(&self, signals: &InfluenceSignals) -> InfluenceBreakdown {
        let w = &self.config.weights;
        let content = self.content_factor(signals.content_items);
        let popularity = self.popularity_factor(signals.popularity);
        let academic = self.academic_factor(signals.citations, signals.h_index);
        let qualitative = self.qualitative_factor(signals.qualitative_rating);
        let total = w.content * content
            + w.popularity * popularity
            + w.academic * academic
            + w.qualitative * qualitative;

        InfluenceBreakdown {
            content,
            popularity,
            academic,
            qualitative,
            total,
        }
    }

    pub fn score(&self, signals: &InfluenceSignals) -> f64 {
        self.breakdown(signals).total
    }

    fn log_scaled(&self, count: u64, scale: f64) -> f64 {
        self.cap(scale * (count as f64 + 1.0).log10())
    }

    fn cap(&self, value: f64) -> f64 {
        value.clamp(0.0, self.config.factor_cap)
    }
}

/// Per-topic ranks. For each topic, people carrying it are sorted by score
/// descending (ties by id) and numbered from 1. A person's map only holds the
/// topics they carry.
pub fn compute_topic_ranks(
    people: &[(Uuid, f64, &BTreeSet<String>)],
) -> BTreeMap<Uuid, BTreeMap<String, u32>> {
    let mut by_topic: BTreeMap<&str, Vec<(Uuid, f64)>> = BTreeMap::new();
    for (id, score, topics) in people {
        for topic in topics.iter() {
            by_topic.entry(topic.as_str()).or_default().push((*id, *score));
        }
    }

    let mut ranks: BTreeMap<Uuid, BTreeMap<String, u32>> = BTreeMap::new();
    for (id, _, _) in people {
        ranks.entry(*id).or_default();
    }
    for (topic, mut members) in by_topic {
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for (position, (id, _)) in members.into_iter().enumerate() {
            ranks
                .entry(id)
                .or_default()
                .insert(topic.to_string(), position as u32 + 1);
        }
    }
    ranks
}

/// Reads signals for every person, scores them, ranks them per topic, and
/// writes all metrics back in one unit.
pub struct MetricsAggregator {
    entities: Arc<dyn EntityRepository>,
    scorer: InfluenceScorer,
}

impl MetricsAggregator {
    pub fn new(entities: Arc<dyn EntityRepository>, scorer: InfluenceScorer) -> Self {
        Self { entities, scorer }
    }

    pub async fn compute_influence(&self, person: &Person) -> Result<f64, TalentGraphError> {
        let signals = self.entities.influence_signals(person.id).await?;
        Ok(self.scorer.score(&signals))
    }

    pub fn compute_topic_ranks(
        &self,
        people: &[Person],
        scores: &BTreeMap<Uuid, f64>,
    ) -> BTreeMap<Uuid, BTreeMap<String, u32>> {
        let rows: Vec<(Uuid, f64, &BTreeSet<String>)> = people
            .iter()
            .map(|p| (p.id, scores.get(&p.id).copied().unwrap_or(0.0), &p.topics))
            .collect();
        compute_topic_ranks(&rows)
    }

    pub async fn run(&self) -> Result<Vec<PersonMetrics>, TalentGraphError> {
        let people = self.entities.list_people().await?;
        info!(people = people.len(), "Computing influence scores");

        let mut scores = BTreeMap::new();
        for person in &people {
            scores.insert(person.id, self.compute_influence(person).await?);
        }

        let mut ranks = self.compute_topic_ranks(&people, &scores);
        let metrics: Vec<PersonMetrics> = people
            .iter()
            .map(|p| PersonMetrics {
                person_id: p.id,
                influence_score: scores.get(&p.id).copied().unwrap_or(0.0),
                topic_ranks: ranks.remove(&p.id).unwrap_or_default(),
            })
            .collect();

        self.entities.save_metrics(&metrics).await?;

        let topics: BTreeSet<&String> = people.iter().flat_map(|p| p.topics.iter()).collect();
        info!(
            people = metrics.len(),
            topics = topics.len(),
            "Influence scores and topic ranks saved"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use talentgraph_common::config::InfluenceWeights;

    fn scorer() -> InfluenceScorer {
        InfluenceScorer::default()
    }

    fn signals(
        content: u64,
        popularity: u64,
        citations: u64,
        h: u32,
        rating: Option<f64>,
    ) -> InfluenceSignals {
        InfluenceSignals {
            content_items: content,
            popularity,
            citations,
            h_index: h,
            qualitative_rating: rating,
        }
    }

    #[test]
    fn zero_signals_score_zero() {
        assert_eq!(scorer().score(&InfluenceSignals::default()), 0.0);
    }

    #[test]
    fn content_saturates_at_cap() {
        let s = scorer();
        assert_eq!(s.content_factor(3), 30.0);
        assert_eq!(s.content_factor(10), 100.0);
        assert_eq!(s.content_factor(10_000), 100.0);
    }

    #[test]
    fn popularity_is_log_scaled() {
        let s = scorer();
        assert!((s.popularity_factor(9) - 20.0).abs() < 1e-9);
        assert!((s.popularity_factor(99_999) - 100.0).abs() < 1e-9);
        assert_eq!(s.popularity_factor(u64::MAX), 100.0);
    }

    #[test]
    fn academic_blends_citations_and_h_index() {
        let s = scorer();
        // 999 citations -> 60, h-index 25 -> 50
        let expected = 0.6 * 60.0 + 0.4 * 50.0;
        assert!((s.academic_factor(999, 25) - expected).abs() < 1e-9);
        assert_eq!(s.academic_factor(u64::MAX, u32::MAX), 100.0);
    }

    #[test]
    fn qualitative_rating_is_rescaled_and_clamped() {
        let s = scorer();
        assert_eq!(s.qualitative_factor(Some(7.5)), 75.0);
        assert_eq!(s.qualitative_factor(Some(14.0)), 100.0);
        assert_eq!(s.qualitative_factor(Some(-3.0)), 0.0);
        assert_eq!(s.qualitative_factor(Some(f64::NAN)), 0.0);
        assert_eq!(s.qualitative_factor(None), 0.0);
    }

    #[test]
    fn total_uses_configured_weights() {
        let all_max = signals(100, u64::MAX, u64::MAX, u32::MAX, Some(10.0));
        assert!((scorer().score(&all_max) - 100.0).abs() < 1e-9);

        let content_only = InfluenceScorer::new(InfluenceConfig {
            weights: InfluenceWeights {
                content: 1.0,
                popularity: 0.0,
                academic: 0.0,
                qualitative: 0.0,
            },
            ..Default::default()
        });
        assert_eq!(content_only.score(&signals(5, 1_000, 1_000, 10, Some(9.0))), 50.0);
    }

    #[test]
    fn raising_any_signal_never_lowers_score() {
        let s = scorer();
        let base = signals(4, 120, 800, 12, Some(6.0));
        let before = s.score(&base);

        let bumps = [
            signals(5, 120, 800, 12, Some(6.0)),
            signals(4, 121, 800, 12, Some(6.0)),
            signals(4, 120, 801, 12, Some(6.0)),
            signals(4, 120, 800, 13, Some(6.0)),
            signals(4, 120, 800, 12, Some(6.5)),
            signals(400, 120, 800, 12, Some(6.0)),
        ];
        for bumped in bumps {
            assert!(s.score(&bumped) >= before, "{bumped:?} lowered the score");
        }
    }

    #[test]
    fn ranks_are_contiguous_from_one() {
        let ml: BTreeSet<String> = ["ml".to_string()].into();
        let both: BTreeSet<String> = ["ml".to_string(), "robotics".to_string()].into();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let rows = vec![
            (ids[0], 40.0, &ml),
            (ids[1], 90.0, &both),
            (ids[2], 65.0, &ml),
            (ids[3], 10.0, &both),
        ];

        let ranks = compute_topic_ranks(&rows);

        assert_eq!(ranks[&ids[1]]["ml"], 1);
        assert_eq!(ranks[&ids[2]]["ml"], 2);
        assert_eq!(ranks[&ids[0]]["ml"], 3);
        assert_eq!(ranks[&ids[3]]["ml"], 4);
        assert_eq!(ranks[&ids[1]]["robotics"], 1);
        assert_eq!(ranks[&ids[3]]["robotics"], 2);
        assert!(!ranks[&ids[0]].contains_key("robotics"));
    }

    #[test]
    fn rank_ties_break_by_id() {
        let topics: BTreeSet<String> = ["nlp".to_string()].into();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let ranks = compute_topic_ranks(&[(high, 50.0, &topics), (low, 50.0, &topics)]);
        assert_eq!(ranks[&low]["nlp"], 1);
        assert_eq!(ranks[&high]["nlp"], 2);
    }

    #[test]
    fn person_without_topics_gets_empty_ranks() {
        let none = BTreeSet::new();
        let id = Uuid::new_v4();
        let ranks = compute_topic_ranks(&[(id, 99.0, &none)]);
        assert!(ranks[&id].is_empty());
    }

    #[tokio::test]
    async fn aggregator_writes_scores_and_ranks() {
        let store = Arc::new(MemoryStore::new());
        let hinton =
            store.seed_person(Person::new("Geoffrey Hinton").with_topics(["deep-learning"]));
        let lecun =
            store.seed_person(Person::new("Yann LeCun").with_topics(["deep-learning", "vision"]));
        store.seed_signals(hinton, signals(0, 0, 500_000, 190, Some(10.0)));
        store.seed_signals(lecun, signals(0, 50_000, 300_000, 150, Some(9.0)));

        let aggregator = MetricsAggregator::new(store.clone(), scorer());
        let metrics = aggregator.run().await.unwrap();
        assert_eq!(metrics.len(), 2);

        let people = store.people();
        let h = people.iter().find(|p| p.id == hinton).unwrap();
        let l = people.iter().find(|p| p.id == lecun).unwrap();
        assert!(h.influence_score > 0.0);
        assert!(l.influence_score > 0.0);

        let top = if h.influence_score > l.influence_score { h } else { l };
        assert_eq!(top.topic_ranks["deep-learning"], 1);
        assert_eq!(l.topic_ranks["vision"], 1);
        assert!(!h.topic_ranks.contains_key("vision"));
    }
}
