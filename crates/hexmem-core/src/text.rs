//! Trigram similarity for the lexical retrieval arm and syntactic dedup.
//!
//! Follows the pg_trgm construction: each word is lowercased, padded with two
//! leading and one trailing space, and split into overlapping 3-grams.
//! Similarity is shared-trigram count over union size, normalized to [0, 1].

use std::collections::HashSet;

/// Extract the padded trigram set of a text.
pub fn trigrams(text: &str) -> HashSet<[u8; 3]> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let lowered = word.to_lowercase();
        let mut padded = Vec::with_capacity(lowered.len() + 3);
        padded.extend_from_slice(b"  ");
        // Non-ASCII bytes participate as-is; pg_trgm does the same for
        // multibyte input at the byte level.
        padded.extend_from_slice(lowered.as_bytes());
        padded.push(b' ');
        for window in padded.windows(3) {
            set.insert([window[0], window[1], window[2]]);
        }
    }
    set
}

/// Normalized trigram similarity in [0, 1].
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_similarity_one() {
        let s = "TypeScript is the primary language used in this project";
        assert!((trigram_similarity(s, s) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn case_insensitive() {
        assert!((trigram_similarity("PostgreSQL", "postgresql") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_text_is_zero() {
        assert_eq!(trigram_similarity("alpha", "zzzz"), 0.0);
        assert_eq!(trigram_similarity("", "anything"), 0.0);
    }

    #[test]
    fn near_duplicates_clear_dedup_threshold() {
        let a = "TypeScript is the primary language used in this project";
        let b = "TypeScript is the primary language used in this project.";
        assert!(trigram_similarity(a, b) >= 0.6);
    }

    #[test]
    fn unrelated_sentences_stay_below_threshold() {
        let a = "deploy the staging cluster on Friday";
        let b = "quarterly revenue exceeded projections";
        assert!(trigram_similarity(a, b) < 0.6);
    }

    #[test]
    fn word_order_is_irrelevant() {
        let a = "red green blue";
        let b = "blue red green";
        assert!((trigram_similarity(a, b) - 1.0).abs() < f64::EPSILON);
    }
}
