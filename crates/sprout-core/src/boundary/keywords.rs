//! Keyword extraction and ordered keyword-list matching.
//!
//! Tokens are lowercased, stripped of leading/trailing `.,!?`, filtered
//! against a fixed stopword set, and kept only when longer than two
//! characters. List matching is case-insensitive substring search evaluated
//! in list order, so configuration order is evaluation order.

use std::collections::HashSet;

/// Fixed stopword set applied to keyword extraction.
const STOPWORDS: &[&str] = &[
    "the", "and", "a", "is", "in", "it", "to", "of", "for", "on", "with", "as", "at", "by",
];

/// Characters trimmed from token edges before filtering.
const PUNCTUATION: &[char] = &['.', ',', '!', '?'];

fn is_keyword(token: &str) -> bool {
    token.len() > 2 && !STOPWORDS.contains(&token)
}

/// Extract the topic-keyword set from a message.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(PUNCTUATION).to_lowercase())
        .filter(|token| is_keyword(token))
        .collect()
}

/// Extract up to `max` topic keywords, ordered by first appearance.
///
/// Unlike [`extract_keywords`] this preserves message order so the topics
/// attached to a record are stable across runs.
pub fn topics(text: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for word in text.split_whitespace() {
        let token = word.trim_matches(PUNCTUATION).to_lowercase();
        if is_keyword(&token) && seen.insert(token.clone()) {
            out.push(token);
            if out.len() == max {
                break;
            }
        }
    }
    out
}

/// Overlap ratio between a new keyword set and the previous one:
/// `|new ∩ previous| / max(|previous|, 1)`.
pub fn overlap_ratio(new: &HashSet<String>, previous: &HashSet<String>) -> f64 {
    let overlap = new.intersection(previous).count();
    overlap as f64 / previous.len().max(1) as f64
}

/// First keyword from the ordered list contained in the message,
/// case-insensitively. List order breaks ties.
pub fn first_match<'a>(text: &str, list: &'a [String]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    list.iter()
        .find(|keyword| lower.contains(&keyword.to_lowercase()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn extraction_lowercases_strips_punctuation_and_stopwords() {
        let keys = extract_keywords("The Dinosaurs, roamed... at night!");
        assert_eq!(keys, set(&["dinosaurs", "roamed", "night"]));
    }

    #[test]
    fn extraction_drops_short_tokens() {
        let keys = extract_keywords("I am ok no to go");
        assert!(keys.is_empty());
    }

    #[test]
    fn topics_preserve_order_and_cap() {
        let t = topics("rockets and planets and rockets and stars and moons", 3);
        assert_eq!(t, vec!["rockets", "planets", "stars"]);
    }

    #[test]
    fn overlap_ratio_disjoint_sets_is_zero() {
        let previous = set(&["dinosaur", "fossil"]);
        let new = set(&["rocket", "space"]);
        assert_eq!(overlap_ratio(&new, &previous), 0.0);
    }

    #[test]
    fn overlap_ratio_half_shared() {
        let previous = set(&["dinosaur", "fossil"]);
        let new = set(&["dinosaur", "teeth"]);
        assert_eq!(overlap_ratio(&new, &previous), 0.5);
    }

    #[test]
    fn overlap_ratio_empty_previous_is_zero() {
        let previous = HashSet::new();
        let new = set(&["anything"]);
        assert_eq!(overlap_ratio(&new, &previous), 0.0);
    }

    #[test]
    fn first_match_is_case_insensitive_and_ordered() {
        let list: Vec<String> = ["hello", "hi"].map(String::from).to_vec();
        assert_eq!(first_match("well HI there", &list), Some("hi"));
        // Both present: list order wins, not position in the message
        assert_eq!(first_match("hi, hello!", &list), Some("hello"));
        assert_eq!(first_match("nothing here", &list), None);
    }
}
