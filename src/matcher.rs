use std::collections::HashMap;

use stashface_ann::Neighbour;

use crate::error::ResolveError;
use crate::identity::SlotMap;

/// Per-identity accumulator for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identity_key: String,
    /// Rounded distance of the first hit, lowered by the repeat bonus for
    /// every further hit. May go negative.
    pub distance: f64,
    pub hits: u32,
}

/// Fold raw hits into one candidate per identity, preserving first-seen order.
///
/// Hits must be in the index's ascending-distance order: the first hit of an
/// identity seeds its distance (rounded to two decimals), later hits only
/// count and subtract `repeat_bonus`.
pub fn aggregate(
    hits: &[Neighbour],
    slots: &SlotMap,
    repeat_bonus: f64,
) -> Result<Vec<Candidate>, ResolveError> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for hit in hits {
        let key = slots.identity_of(hit.slot)?;
        match seen.get(key) {
            Some(&i) => {
                let c = &mut candidates[i];
                c.hits += 1;
                c.distance -= repeat_bonus;
            }
            None => {
                seen.insert(key, candidates.len());
                candidates.push(Candidate {
                    identity_key: key.to_string(),
                    distance: round2(hit.distance),
                    hits: 1,
                });
            }
        }
    }

    Ok(candidates)
}

/// Stable sort by ascending adjusted distance, keep the first `limit`.
pub fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates.truncate(limit);
    candidates
}

fn round2(distance: f32) -> f64 {
    (distance as f64 * 100.0).round_ties_even() / 100.0
}
