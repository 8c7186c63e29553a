use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use unicode_width::UnicodeWidthStr;

use crate::ELLIPSIS;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    #[error("no font metrics available for '{0}'")]
    MissingMetrics(String),
    #[error("text measurement failed: {0}")]
    Backend(String),
}

/// Width of a candidate line in pixels, as rendered by some font backend.
///
/// Implementations must be pure: the same text always measures the same.
/// Any `Fn(&str) -> f32` closure can be used directly.
pub trait TextMeasure {
    fn measure(&self, candidate: &str) -> Result<f32, MeasureError>;
}

impl<F> TextMeasure for F
where
    F: Fn(&str) -> f32,
{
    fn measure(&self, candidate: &str) -> Result<f32, MeasureError> {
        Ok(self(candidate))
    }
}

/// Monospace-style estimate: display cells times a fixed cell width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharWidthMeasure {
    pub char_width: f32,
}

impl CharWidthMeasure {
    pub fn new(char_width: f32) -> Self {
        Self { char_width }
    }
}

impl TextMeasure for CharWidthMeasure {
    fn measure(&self, candidate: &str) -> Result<f32, MeasureError> {
        Ok(candidate.width() as f32 * self.char_width)
    }
}

/// Caches widths of an inner measurer for the lifetime of one layout pass.
pub struct MemoizedMeasure<M> {
    inner: M,
    cache: RefCell<HashMap<String, Result<f32, MeasureError>>>,
}

impl<M: TextMeasure> MemoizedMeasure<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl<M: TextMeasure> TextMeasure for MemoizedMeasure<M> {
    fn measure(&self, candidate: &str) -> Result<f32, MeasureError> {
        if let Some(hit) = self.cache.borrow().get(candidate) {
            return hit.clone();
        }
        let measured = self.inner.measure(candidate);
        self.cache
            .borrow_mut()
            .insert(candidate.to_string(), measured.clone());
        measured
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WrappedLabel {
    pub lines: Vec<String>,
    pub truncated: bool,
}

impl WrappedLabel {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Greedy word wrap against measured widths.
///
/// Words are never split; a word wider than `max_width` gets a line of its
/// own. Once `max_lines - 1` lines are closed, every remaining word goes on
/// the final line followed by an ellipsis.
pub fn wrap<M>(text: &str, max_width: f32, max_lines: usize, measure: &M) -> WrappedLabel
where
    M: TextMeasure + ?Sized,
{
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || max_lines == 0 {
        return WrappedLabel::default();
    }

    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (index, &word) in words.iter().enumerate() {
        current.push(word);
        if current.len() == 1 || fits(measure, &current.join(" "), max_width) {
            continue;
        }

        current.pop();
        if max_lines == 1 {
            return truncated_line(lines, &words);
        }
        lines.push(current.join(" "));

        if lines.len() >= max_lines - 1 {
            return truncated_line(lines, &words[index..]);
        }
        current = vec![word];
    }

    lines.push(current.join(" "));
    WrappedLabel {
        lines,
        truncated: false,
    }
}

fn truncated_line(mut lines: Vec<String>, rest: &[&str]) -> WrappedLabel {
    let mut last = rest.join(" ");
    last.push(ELLIPSIS);
    lines.push(last);
    WrappedLabel {
        lines,
        truncated: true,
    }
}

fn fits<M>(measure: &M, candidate: &str, max_width: f32) -> bool
where
    M: TextMeasure + ?Sized,
{
    match measure.measure(candidate) {
        Ok(width) if width.is_finite() => width <= max_width,
        Ok(width) => {
            warn!(candidate, width, "non-finite text width; breaking line");
            false
        }
        Err(err) => {
            warn!(candidate, error = %err, "text measurement failed; breaking line");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn per_char(candidate: &str) -> f32 {
        candidate.chars().count() as f32 * 10.0
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let label = wrap("File Form 300", 200.0, 3, &per_char);
        assert_eq!(label.lines, vec!["File Form 300"]);
        assert!(!label.truncated);
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_lines() {
        assert!(wrap("", 100.0, 3, &per_char).is_empty());
        assert!(wrap("   \t\n ", 100.0, 3, &per_char).is_empty());
    }

    #[test]
    fn breaks_at_width_budget() {
        let label = wrap("aaa bbb ccc", 70.0, 3, &per_char);
        assert_eq!(label.lines, vec!["aaa bbb", "ccc"]);
        assert!(!label.truncated);
    }

    #[test]
    fn final_line_collects_remaining_words_with_ellipsis() {
        let label = wrap("one two three four five six", 30.0, 3, &per_char);
        assert_eq!(label.lines, vec!["one", "two", "three four five six…"]);
        assert!(label.truncated);
    }

    #[test]
    fn overlong_word_is_not_split() {
        let label = wrap("supercalifragilistic is long", 80.0, 3, &per_char);
        assert_eq!(label.lines, vec!["supercalifragilistic", "is long"]);
        for line in &label.lines[..label.lines.len() - 1] {
            assert!(line.split_whitespace().count() == 1 || per_char(line) <= 80.0);
        }
    }

    #[test]
    fn single_line_budget_truncates_everything_into_one_line() {
        let label = wrap("alpha beta gamma", 60.0, 1, &per_char);
        assert_eq!(label.lines, vec!["alpha beta gamma…"]);
        assert!(label.truncated);
        assert!(wrap("alpha", 60.0, 0, &per_char).is_empty());
    }

    #[test]
    fn failing_measure_over_wraps() {
        struct Broken;
        impl TextMeasure for Broken {
            fn measure(&self, candidate: &str) -> Result<f32, MeasureError> {
                Err(MeasureError::MissingMetrics(candidate.to_string()))
            }
        }

        let label = wrap("a b c d", 1000.0, 5, &Broken);
        assert_eq!(label.lines, vec!["a", "b", "c", "d"]);

        let nan = |_: &str| f32::NAN;
        let label = wrap("a b c", 1000.0, 2, &nan);
        assert_eq!(label.lines, vec!["a", "b c…"]);
    }

    #[test]
    fn char_width_measure_counts_display_cells() -> Result<(), MeasureError> {
        let measure = CharWidthMeasure::new(6.0);
        assert_eq!(measure.measure("abcd")?, 24.0);
        assert_eq!(measure.measure("日本")?, 24.0);
        Ok(())
    }

    #[test]
    fn memoized_measure_hits_inner_once_per_candidate() {
        let calls = Cell::new(0);
        let counting = |candidate: &str| {
            calls.set(calls.get() + 1);
            per_char(candidate)
        };
        let memo = MemoizedMeasure::new(counting);

        let first = wrap("one two three four", 80.0, 3, &memo);
        let after_first = calls.get();
        let second = wrap("one two three four", 80.0, 3, &memo);

        assert_eq!(first, second);
        assert_eq!(calls.get(), after_first);
        assert_eq!(memo.cached_entries(), after_first);
    }
}
