use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    // Unicode-aware: letters, marks, digits and connector punctuation.
    static ref RE: Regex = Regex::new(r"\w+").expect("valid regex");
}

/// Tokenize text into (term, position): maximal runs of word characters,
/// lowercased, with positions counted over the emitted tokens.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    RE.find_iter(text)
        .enumerate()
        .map(|(pos, mat)| (mat.as_str().to_lowercase(), pos))
        .collect()
}

/// The distinct terms of `text`; repeated words count once.
pub fn distinct_terms(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().map(|(term, _)| term).collect()
}
