// src/clustering/similarity.rs
//
// Pairwise name scoring for the clustering pass. Clustering names are
// compared with an insertion/deletion edit ratio on a 0..=100 scale; names
// carrying digits never match so that numbered or versioned variants of one
// base name ("project x v1", "project x v2") stay distinct.

use std::collections::HashSet;

use crate::config::SIMILARITY_SCALE;

/// True if any character of `name` is a numeric digit.
pub fn contains_digit(name: &str) -> bool {
    name.chars().any(char::is_numeric)
}

/// Normalized indel similarity in `0.0..=100.0`.
///
/// `100 * (1 - indel_distance / (len_a + len_b))`, where the indel distance
/// counts the insertions and deletions needed to turn one string into the
/// other. Two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return SIMILARITY_SCALE;
    }
    let lcs = longest_common_subsequence(&a, &b);
    SIMILARITY_SCALE * (2 * lcs) as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut previous = vec![0usize; shorter.len() + 1];
    let mut current = vec![0usize; shorter.len() + 1];

    for &long_char in longer {
        for (j, &short_char) in shorter.iter().enumerate() {
            current[j + 1] = if long_char == short_char {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[shorter.len()]
}

/// Scores a candidate clustering name against a staged one.
///
/// Returns the score only when it reaches `min_score` and neither name
/// contains a digit.
pub fn accepted_score(candidate: &str, staged: &str, min_score: f64) -> Option<f64> {
    if contains_digit(candidate) || contains_digit(staged) {
        return None;
    }
    let score = ratio(candidate, staged);
    (score >= min_score).then_some(score)
}

/// Trigram similarity with `pg_trgm` semantics.
///
/// Each alphanumeric word is lowercased and padded with two leading and one
/// trailing blank before being cut into trigrams; the score is the Jaccard
/// index of the two trigram sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut grams = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_bounds() {
        assert_eq!(ratio("acme corp", "acme corp"), 100.0);
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn ratio_is_indel_based() {
        // lcs("acme corporation", "acme corp") = 9 over 25 characters
        assert!((ratio("acme corporation", "acme corp") - 72.0).abs() < 1e-9);
        // a substitution costs one deletion plus one insertion
        assert!((ratio("abcd", "abce") - 75.0).abs() < 1e-9);
        assert_eq!(ratio("kitten", "sitting"), ratio("sitting", "kitten"));
    }

    #[test]
    fn digit_guard_blocks_any_score() {
        assert!(contains_digit("project x v1"));
        assert!(!contains_digit("project x"));
        assert_eq!(accepted_score("project x v1", "project x v1", 0.0), None);
        assert_eq!(accepted_score("project x", "project x 2", 0.0), None);
    }

    #[test]
    fn acceptance_threshold_is_inclusive() {
        assert_eq!(accepted_score("abcd", "abce", 75.0), Some(75.0));
        assert_eq!(accepted_score("abcd", "abce", 75.1), None);
    }

    #[test]
    fn trigram_similarity_matches_pg_trgm() {
        assert_eq!(trigram_similarity("word", "word"), 1.0);
        assert_eq!(trigram_similarity("", "word"), 0.0);
        // 9 shared trigrams out of 18 distinct ones
        assert!((trigram_similarity("acme corp", "acme corporation") - 0.5).abs() < 1e-9);
        assert_eq!(
            trigram_similarity("Acme, Corp.", "acme corp"),
            trigram_similarity("acme corp", "acme corp")
        );
    }
}
