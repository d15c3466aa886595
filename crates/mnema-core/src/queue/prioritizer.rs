//! Queue prioritizer.
//!
//! Orders concepts by urgency: ascending retrievability, with
//! never-reviewed material mapped into a priority band strictly below
//! every reviewed score, and a randomized tie-break within the band of
//! most-urgent entries so repeated queue reads do not always surface the
//! same concept first.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::QueueConfig;
use crate::scheduler::{ReviewScheduler, UNSEEN_RETRIEVABILITY};
use crate::types::Concept;

/// A prioritized queue entry.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub concept: Concept,
    /// The priority score used for ordering. For reviewed material this
    /// is the retrievability in [0, 1]; never-reviewed material carries a
    /// negative band value.
    pub retrievability: f32,
}

/// Compute the priority score for one concept.
///
/// Reviewed material scores its retrievability (cached snapshot when
/// present, engine otherwise). Never-reviewed material created within
/// the freshness window scores `-1 - 2^(-age / half_life)`: -2 at
/// creation, decaying toward -1, clamped at -1 once the window passes.
/// Fresh material therefore sorts before stale unseen material, and all
/// unseen material sorts before anything reviewed, without permanently
/// starving the review queue.
pub fn priority_score(
    concept: &Concept,
    now: DateTime<Utc>,
    scheduler: &ReviewScheduler,
    config: &QueueConfig,
) -> f32 {
    if concept.memory.reps == 0 {
        let age = now.signed_duration_since(concept.created_at);
        let age_hours = age.num_minutes() as f32 / 60.0;
        if age_hours >= 0.0 && age_hours < config.fresh_window_hours as f32 {
            return UNSEEN_RETRIEVABILITY - (2.0_f32).powf(-age_hours / config.fresh_half_life_hours);
        }
        return UNSEEN_RETRIEVABILITY;
    }

    concept
        .memory
        .retrievability
        .unwrap_or_else(|| scheduler.retrievability(Some(&concept.memory), now))
}

/// Order concepts by urgency.
///
/// Concepts with zero active phrasings are excluded (nothing to present).
/// After the ascending sort, the maximal prefix of entries within
/// `tie_epsilon` of the minimum score is Fisher-Yates shuffled; the
/// remainder keeps strict sorted order.
pub fn prioritize<R: Rng + ?Sized>(
    concepts: Vec<Concept>,
    now: DateTime<Utc>,
    scheduler: &ReviewScheduler,
    config: &QueueConfig,
    rng: &mut R,
) -> Vec<QueueEntry> {
    let mut entries: Vec<QueueEntry> = concepts
        .into_iter()
        .filter(|c| c.is_active() && c.phrasing_count > 0)
        .map(|concept| {
            let retrievability = priority_score(&concept, now, scheduler, config);
            QueueEntry {
                concept,
                retrievability,
            }
        })
        .collect();

    entries.sort_by(|a, b| a.retrievability.total_cmp(&b.retrievability));

    if let Some(min_score) = entries.first().map(|e| e.retrievability) {
        let band_len = entries
            .iter()
            .take_while(|e| e.retrievability - min_score <= config.tie_epsilon)
            .count();
        if band_len > 1 {
            entries[..band_len].shuffle(rng);
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::types::{CardState, MemoryState};

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn concept_with_retrievability(title: &str, retrievability: f32, now: DateTime<Utc>) -> Concept {
        let mut concept = Concept::new("user1", title, None, now - Duration::days(30));
        concept.phrasing_count = 1;
        concept.memory = MemoryState {
            stability: 10.0,
            difficulty: 5.0,
            last_review: Some(now - Duration::days(5)),
            next_review: now,
            elapsed_days: 5,
            scheduled_days: 10,
            reps: 3,
            lapses: 0,
            state: CardState::Review,
            retrievability: Some(retrievability),
        };
        concept
    }

    fn fresh_concept(title: &str, age_hours: i64, now: DateTime<Utc>) -> Concept {
        let mut concept = Concept::new("user1", title, None, now - Duration::hours(age_hours));
        concept.phrasing_count = 1;
        concept
    }

    #[test]
    fn test_orders_by_ascending_retrievability() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        let concepts = vec![
            concept_with_retrievability("c1", 0.9, now),
            concept_with_retrievability("c2", 0.6, now),
            concept_with_retrievability("c3", 0.4, now),
        ];

        let queue = prioritize(concepts, now, &scheduler, &config, &mut rng);
        let titles: Vec<&str> = queue.iter().map(|e| e.concept.title.as_str()).collect();
        assert_eq!(titles, vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn test_excludes_zero_phrasing_concepts() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        let mut bare = concept_with_retrievability("bare", 0.01, now);
        bare.phrasing_count = 0;
        let concepts = vec![bare, concept_with_retrievability("covered", 0.9, now)];

        let queue = prioritize(concepts, now, &scheduler, &config, &mut rng);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].concept.title, "covered");
    }

    #[test]
    fn test_excludes_archived_and_deleted() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        let mut archived = concept_with_retrievability("archived", 0.1, now);
        archived.archived_at = Some(now);
        let mut deleted = concept_with_retrievability("deleted", 0.1, now);
        deleted.deleted_at = Some(now);

        let queue = prioritize(vec![archived, deleted], now, &scheduler, &config, &mut rng);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unseen_sorts_before_reviewed() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        // Stale unseen concept, older than the freshness window.
        let mut unseen = Concept::new("user1", "unseen", None, now - Duration::days(10));
        unseen.phrasing_count = 1;

        let concepts = vec![concept_with_retrievability("reviewed", 0.02, now), unseen];
        let queue = prioritize(concepts, now, &scheduler, &config, &mut rng);

        assert_eq!(queue[0].concept.title, "unseen");
        assert_eq!(queue[0].retrievability, UNSEEN_RETRIEVABILITY);
        assert_eq!(queue[1].concept.title, "reviewed");
    }

    #[test]
    fn test_freshness_band_decays_toward_sentinel() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();

        let brand_new = priority_score(&fresh_concept("a", 0, now), now, &scheduler, &config);
        let one_half_life = priority_score(&fresh_concept("b", 24, now), now, &scheduler, &config);
        let two_half_lives = priority_score(&fresh_concept("c", 48, now), now, &scheduler, &config);
        let past_window = priority_score(&fresh_concept("d", 80, now), now, &scheduler, &config);

        assert!((brand_new - -2.0).abs() < 0.01);
        assert!((one_half_life - -1.5).abs() < 0.01);
        assert!((two_half_lives - -1.25).abs() < 0.01);
        assert_eq!(past_window, UNSEEN_RETRIEVABILITY);

        // Monotonic decay: newer material is always more urgent.
        assert!(brand_new < one_half_life);
        assert!(one_half_life < two_half_lives);
        assert!(two_half_lives < past_window);
        // The whole band sits strictly below any reviewed score.
        assert!(past_window <= UNSEEN_RETRIEVABILITY);
    }

    #[test]
    fn test_tie_band_is_shuffled_but_tail_is_stable() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();

        // Four entries within epsilon of the minimum, two clearly above.
        let make = |seed: u64| {
            let concepts = vec![
                concept_with_retrievability("t1", 0.40, now),
                concept_with_retrievability("t2", 0.41, now),
                concept_with_retrievability("t3", 0.42, now),
                concept_with_retrievability("t4", 0.44, now),
                concept_with_retrievability("far1", 0.70, now),
                concept_with_retrievability("far2", 0.90, now),
            ];
            let mut rng = StdRng::seed_from_u64(seed);
            prioritize(concepts, now, &scheduler, &config, &mut rng)
        };

        // The tail outside the band keeps strict sorted order.
        for seed in 0..20 {
            let queue = make(seed);
            assert_eq!(queue[4].concept.title, "far1");
            assert_eq!(queue[5].concept.title, "far2");
            // Band membership is preserved even when shuffled.
            let mut band: Vec<&str> = queue[..4].iter().map(|e| e.concept.title.as_str()).collect();
            band.sort();
            assert_eq!(band, vec!["t1", "t2", "t3", "t4"]);
        }

        // Different seeds produce different band orderings.
        let orderings: std::collections::HashSet<Vec<String>> = (0..20)
            .map(|seed| {
                make(seed)[..4]
                    .iter()
                    .map(|e| e.concept.title.clone())
                    .collect()
            })
            .collect();
        assert!(orderings.len() > 1, "tie band should not be deterministic");
    }

    #[test]
    fn test_cached_snapshot_preferred_over_engine() {
        let now = epoch();
        let scheduler = ReviewScheduler::new();
        let config = QueueConfig::default();

        let mut concept = concept_with_retrievability("cached", 0.123, now);
        let cached = priority_score(&concept, now, &scheduler, &config);
        assert!((cached - 0.123).abs() < f32::EPSILON);

        concept.memory.retrievability = None;
        let live = priority_score(&concept, now, &scheduler, &config);
        assert!((0.0..=1.0).contains(&live));
        assert!((live - 0.123).abs() > 0.01);
    }
}
