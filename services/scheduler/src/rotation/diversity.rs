//! Repetition guards for generated content.

use std::collections::BTreeSet;

use crate::collaborators::Signal;

/// Words shorter than this are ignored when comparing titles.
const MIN_WORD_LEN: usize = 3;

/// Lower-cased alphanumeric words of a title.
pub fn title_words(title: &str) -> BTreeSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Shared words over the size of the smaller word set, in `[0, 1]`.
///
/// Zero when either title has no significant words.
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let a = title_words(a);
    let b = title_words(b);
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    shared as f64 / smaller as f64
}

/// Whether `title` overlaps any recent title at or above `threshold`.
pub fn is_repetitive(title: &str, recent_titles: &[String], threshold: f64) -> bool {
    recent_titles
        .iter()
        .any(|recent| overlap_ratio(title, recent) >= threshold)
}

/// Categories to ask the signal source for: every configured category not
/// used recently, or all of them when each was used.
pub fn fresh_categories(all: &[String], recent: &BTreeSet<String>) -> Vec<String> {
    let fresh: Vec<String> = all
        .iter()
        .filter(|c| !recent.contains(*c))
        .cloned()
        .collect();
    if fresh.is_empty() {
        all.to_vec()
    } else {
        fresh
    }
}

/// Drops signals whose title repeats a recent one.
pub fn filter_signals(signals: Vec<Signal>, recent_titles: &[String], threshold: f64) -> Vec<Signal> {
    signals
        .into_iter()
        .filter(|s| !is_repetitive(&s.title, recent_titles, threshold))
        .collect()
}
