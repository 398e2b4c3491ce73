use std::collections::HashMap;
use std::hash::Hash;

/// Fuse several independently-ranked candidate lists into one score per id,
/// using Reciprocal Rank Fusion: `score(id) = sum(1 / (k + rank))` over every
/// list the id appears in, 1-indexed rank. Ids absent from a list simply
/// don't contribute from it. The result is sorted by descending fused score.
pub fn reciprocal_rank_fusion<Id>(ranked_lists: &[Vec<Id>], k: f32) -> Vec<(Id, f32)>
where
    Id: Eq + Hash + Clone,
{
    let mut scores: HashMap<Id, f32> = HashMap::new();

    for list in ranked_lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank as f32 + 1.0));
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
        }
    }

    let mut fused: Vec<(Id, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Boost fused scores for ids belonging to an anchored set (e.g. documents the
/// user explicitly attached to the session), without letting the boost alone
/// promote something above every non-anchored candidate that ranked highly on
/// its own merit in multiple lists.
pub fn apply_anchor_boost<Id>(fused: &mut [(Id, f32)], anchors: &[Id], boost: f32)
where
    Id: Eq + Hash,
{
    for (id, score) in fused.iter_mut() {
        if anchors.iter().any(|a| a == id) {
            *score += boost;
        }
    }
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuses_overlapping_lists() {
        let dense = vec![1, 2, 3, 4];
        let sparse = vec![3, 1, 5, 2];
        let fused = reciprocal_rank_fusion(&[dense, sparse], 60.0);

        // id 1 ranks #1 dense, #2 sparse -> highest combined score
        assert_eq!(fused[0].0, 1);
        let ids: Vec<i32> = fused.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&5));
    }

    #[test]
    fn monotonic_in_rank() {
        let list = vec![10, 20, 30];
        let fused = reciprocal_rank_fusion(&[list], 60.0);
        assert!(fused[0].1 > fused[1].1);
        assert!(fused[1].1 > fused[2].1);
    }

    #[test]
    fn empty_lists_yield_no_scores() {
        let fused: Vec<(i32, f32)> = reciprocal_rank_fusion(&Vec::<Vec<i32>>::new(), 60.0);
        assert!(fused.is_empty());
    }

    #[test]
    fn anchor_boost_reorders_without_erasing_consensus() {
        let dense = vec![1, 2, 3];
        let sparse = vec![1, 2, 3];
        let mut fused = reciprocal_rank_fusion(&[dense, sparse], 60.0);
        apply_anchor_boost(&mut fused, &[3], 0.05);
        assert_eq!(fused[0].0, 3);
    }
}
