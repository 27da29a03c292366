//! Trigram similarity, matching the semantics of PostgreSQL's `pg_trgm`.
//!
//! A string is lower-cased and split into words on non-alphanumeric
//! characters. Each word is padded with two spaces in front and one behind,
//! and every run of three characters becomes a trigram. Similarity is the
//! number of shared trigrams over the number of distinct trigrams in both.

use std::collections::BTreeSet;

/// Minimum similarity for a name to count as a fuzzy match.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

pub fn trigrams(text: &str) -> BTreeSet<String> {
    let mut set = BTreeSet::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }

    set
}

pub fn similarity(a: &str, b: &str) -> f32 {
    let left = trigrams(a);
    let right = trigrams(b);

    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();

    shared as f32 / total as f32
}

pub fn is_similar(a: &str, b: &str) -> bool {
    similarity(a, b) >= SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_trigrams_are_padded() {
        let set = trigrams("Cat");
        let expected: BTreeSet<String> = ["  c", " ca", "cat", "at "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn identical_strings_are_fully_similar() {
        assert_eq!(similarity("umap", "UMAP"), 1.0);
    }

    #[test]
    fn disjoint_strings_have_zero_similarity() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", "xyz"), 0.0);
    }

    #[test]
    fn small_typos_still_match() {
        assert!(is_similar("scatter_matrix", "scater matrix"));
        assert!(is_similar("NetMUG", "netmug"));
        assert!(!is_similar("pca_2D", "gradient boosting"));
    }
}
