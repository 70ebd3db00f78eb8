//! Fuzzy title ranking.
//!
//! A title matches when every character of the term appears in it in order
//! (case-insensitive). Matches are ranked by Levenshtein distance between
//! the folded term and the folded title; closer titles rank higher and
//! equal distances keep their input order.

use strsim::levenshtein;

/// One matching target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    /// Index into the ranked input
    pub index: usize,

    /// Edit distance between term and target (lower is better)
    pub distance: usize,
}

/// Case-insensitive subsequence test
pub fn matches_fold(term: &str, target: &str) -> bool {
    let mut target_chars = target.chars().flat_map(char::to_lowercase);

    term.chars()
        .flat_map(char::to_lowercase)
        .all(|wanted| target_chars.any(|c| c == wanted))
}

/// Rank `targets` against `term`, best match first.
pub fn rank_fold<S: AsRef<str>>(term: &str, targets: &[S]) -> Vec<Rank> {
    let folded_term = term.to_lowercase();

    let mut ranks: Vec<Rank> = targets
        .iter()
        .enumerate()
        .filter(|(_, target)| matches_fold(term, target.as_ref()))
        .map(|(index, target)| Rank {
            index,
            distance: levenshtein(&folded_term, &target.as_ref().to_lowercase()),
        })
        .collect();

    // sort_by_key is stable
    ranks.sort_by_key(|rank| rank.distance);
    ranks
}
