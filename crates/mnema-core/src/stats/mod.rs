//! Incremental maintenance of the per-user aggregate counters.
//!
//! Every mutation path that can change a concept's card state or move it
//! across the due boundary computes a delta here and applies it to the
//! user's single stats row in the same transaction as the triggering
//! mutation. Aggregate reads never scan the full concept set.

use chrono::{DateTime, Utc};

use crate::types::{CardState, StatsDelta};

/// Counter category a card state maps to.
///
/// Relearning sits on the learning side, so review <-> relearning is a
/// learning/mature boundary crossing, not a net-zero no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    New,
    Learning,
    Mature,
}

fn category(state: CardState) -> Category {
    match state {
        CardState::New => Category::New,
        CardState::Learning | CardState::Relearning => Category::Learning,
        CardState::Review => Category::Mature,
    }
}

fn bump(delta: &mut StatsDelta, cat: Category, amount: i64) {
    match cat {
        Category::New => delta.new_count += amount,
        Category::Learning => delta.learning_count += amount,
        Category::Mature => delta.mature_count += amount,
    }
}

/// Compute the counter delta for a concept transition.
///
/// `None` on either side of the state pair models creation (`None ->
/// Some`) and removal from active scheduling (`Some -> None`, i.e.
/// archive or delete). The due boundary is inclusive: exactly at `now`
/// counts as due, matching `is_due`.
///
/// Returns `None` when neither the mapped state category nor the
/// due-status changed; callers must skip the stats write entirely in
/// that case.
pub fn compute_delta(
    old_state: Option<CardState>,
    new_state: Option<CardState>,
    old_next_review: Option<DateTime<Utc>>,
    new_next_review: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<StatsDelta> {
    let mut delta = StatsDelta::default();

    match (old_state, new_state) {
        (None, None) => {}
        (None, Some(new)) => {
            delta.total_cards += 1;
            bump(&mut delta, category(new), 1);
            // New cards with no explicit due date count as due.
            if new_next_review.map_or(true, |t| t <= now) {
                delta.due_now_count += 1;
            }
        }
        (Some(old), None) => {
            delta.total_cards -= 1;
            bump(&mut delta, category(old), -1);
            if old_next_review.map_or(false, |t| t <= now) {
                delta.due_now_count -= 1;
            }
        }
        (Some(old), Some(new)) => {
            let (old_cat, new_cat) = (category(old), category(new));
            if old_cat != new_cat {
                bump(&mut delta, old_cat, -1);
                bump(&mut delta, new_cat, 1);
            }
            // The due-status delta needs both boundaries to be known.
            if let (Some(old_due), Some(new_due)) = (old_next_review, new_next_review) {
                let was_due = old_due <= now;
                let is_due_now = new_due <= now;
                if was_due && !is_due_now {
                    delta.due_now_count -= 1;
                } else if !was_due && is_due_now {
                    delta.due_now_count += 1;
                }
            }
        }
    }

    if delta.is_empty() {
        None
    } else {
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_no_change_returns_none() {
        // Still due on both sides, same category: skip the write.
        let delta = compute_delta(
            Some(CardState::Review),
            Some(CardState::Review),
            Some(at(500)),
            Some(at(800)),
            at(1000),
        );
        assert!(delta.is_none());
    }

    #[test]
    fn test_not_due_to_exactly_due() {
        // Exactly at `now` counts as due.
        let delta = compute_delta(
            Some(CardState::Review),
            Some(CardState::Review),
            Some(at(2000)),
            Some(at(1000)),
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.due_now_count, 1);
        assert_eq!(delta.new_count, 0);
        assert_eq!(delta.mature_count, 0);
    }

    #[test]
    fn test_due_to_not_due_after_review() {
        let delta = compute_delta(
            Some(CardState::Review),
            Some(CardState::Review),
            Some(at(900)),
            Some(at(5000)),
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.due_now_count, -1);
    }

    #[test]
    fn test_new_to_learning_transition() {
        let delta = compute_delta(
            Some(CardState::New),
            Some(CardState::Learning),
            Some(at(900)),
            Some(at(900)),
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.new_count, -1);
        assert_eq!(delta.learning_count, 1);
        assert_eq!(delta.mature_count, 0);
        assert_eq!(delta.due_now_count, 0);
    }

    #[test]
    fn test_review_to_relearning_crosses_mature_boundary() {
        let delta = compute_delta(
            Some(CardState::Review),
            Some(CardState::Relearning),
            Some(at(900)),
            Some(at(950)),
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.mature_count, -1);
        assert_eq!(delta.learning_count, 1);
    }

    #[test]
    fn test_relearning_to_review_crosses_back() {
        let delta = compute_delta(
            Some(CardState::Relearning),
            Some(CardState::Review),
            Some(at(900)),
            Some(at(5000)),
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.learning_count, -1);
        assert_eq!(delta.mature_count, 1);
        assert_eq!(delta.due_now_count, -1);
    }

    #[test]
    fn test_learning_to_relearning_is_same_category() {
        let delta = compute_delta(
            Some(CardState::Learning),
            Some(CardState::Relearning),
            Some(at(900)),
            Some(at(900)),
            at(1000),
        );
        assert!(delta.is_none());
    }

    #[test]
    fn test_creation_counts_as_due() {
        let delta = compute_delta(None, Some(CardState::New), None, Some(at(1000)), at(1000)).unwrap();
        assert_eq!(delta.total_cards, 1);
        assert_eq!(delta.new_count, 1);
        assert_eq!(delta.due_now_count, 1);
    }

    #[test]
    fn test_removal_reverses_creation() {
        let delta = compute_delta(
            Some(CardState::Review),
            None,
            Some(at(900)),
            None,
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.total_cards, -1);
        assert_eq!(delta.mature_count, -1);
        assert_eq!(delta.due_now_count, -1);
    }

    #[test]
    fn test_removal_of_not_due_card_keeps_due_count() {
        let delta = compute_delta(
            Some(CardState::Review),
            None,
            Some(at(5000)),
            None,
            at(1000),
        )
        .unwrap();
        assert_eq!(delta.total_cards, -1);
        assert_eq!(delta.due_now_count, 0);
    }
}
