//! Phrasing selection.
//!
//! Picks which phrasing variant of a concept to present next: the
//! canonical phrasing when one is set and active, otherwise the
//! least-recently-attempted variant so exposure spreads across variants
//! instead of drilling a single wording.

use strum::{Display, EnumString};

use crate::types::{Concept, Phrasing};

/// Why a phrasing was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SelectionReason {
    Canonical,
    LeastSeen,
}

/// A selected phrasing with presentation context.
#[derive(Debug, Clone)]
pub struct PhrasingSelection {
    pub phrasing: Phrasing,
    pub total_phrasings: usize,
    pub phrasing_index: usize,
    pub reason: SelectionReason,
}

/// Select the phrasing to present for a concept.
///
/// Returns None when the concept has no active phrasing. Never-attempted
/// phrasings rank before any attempted one in the least-seen ordering.
pub fn select_active_phrasing(
    concept: &Concept,
    phrasings: &[Phrasing],
) -> Option<PhrasingSelection> {
    let active: Vec<&Phrasing> = phrasings.iter().filter(|p| p.is_active()).collect();
    if active.is_empty() {
        return None;
    }

    if let Some(canonical_id) = concept.canonical_phrasing_id {
        if let Some(index) = active.iter().position(|p| p.id == canonical_id) {
            return Some(PhrasingSelection {
                phrasing: active[index].clone(),
                total_phrasings: active.len(),
                phrasing_index: index,
                reason: SelectionReason::Canonical,
            });
        }
    }

    let index = active
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.last_attempted_at, p.created_at))
        .map(|(i, _)| i)?;

    Some(PhrasingSelection {
        phrasing: active[index].clone(),
        total_phrasings: active.len(),
        phrasing_index: index,
        reason: SelectionReason::LeastSeen,
    })
}
