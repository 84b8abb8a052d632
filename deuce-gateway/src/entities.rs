//! Entity extraction from free text onto a tool's input schema.
//!
//! Pure functions over text: ISO dates, numbers labelled by a field's cue
//! words ("creatinine 1.1", "5-day duration"), vocabulary keywords and
//! choice values.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::tools::schema::DATE_FORMAT;
use crate::tools::{FieldKind, ToolSchema};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})\b").expect("date regex is valid")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex is valid"));

/// Max chars between a cue and a value that follows it.
const CUE_THEN_VALUE_GAP: usize = 20;
/// Max chars between a value and a cue that follows it.
const VALUE_THEN_CUE_GAP: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
struct NumberMention {
    value: f64,
    start: usize,
    end: usize,
}

/// Extract every schema field that can be read from `text`.
pub fn extract_fields(schema: &ToolSchema, text: &str) -> Map<String, Value> {
    let lower = text.to_lowercase();
    let (dates, masked) = find_dates(&lower);
    let numbers = find_numbers(&masked);

    let mut out = Map::new();
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut dates = dates.into_iter();

    for field in &schema.fields {
        let value = match field.kind {
            FieldKind::Date => dates
                .next()
                .map(|d| Value::from(d.format(DATE_FORMAT).to_string())),
            FieldKind::Integer { min, max } => {
                pick_number(&masked, &numbers, field.cues, &mut claimed, |v| {
                    v.fract() == 0.0 && (min as f64..=max as f64).contains(&v)
                })
                .map(|v| Value::from(v as i64))
            }
            FieldKind::Number { min, max } => {
                pick_number(&masked, &numbers, field.cues, &mut claimed, |v| {
                    (min..=max).contains(&v)
                })
                .map(Value::from)
            }
            FieldKind::Keywords(vocabulary) => {
                let found: Vec<Value> = vocabulary
                    .iter()
                    .filter(|term| contains_term(&lower, term))
                    .map(|term| Value::from(*term))
                    .collect();
                (!found.is_empty()).then_some(Value::Array(found))
            }
            FieldKind::Choice(options) => options
                .iter()
                .filter_map(|option| {
                    std::iter::once(option.value)
                        .chain(option.aliases.iter().copied())
                        .filter_map(|word| find_term(&lower, word).first().map(|(s, _)| *s))
                        .min()
                        .map(|pos| (pos, option.value))
                })
                .min_by_key(|(pos, _)| *pos)
                .map(|(_, value)| Value::from(value)),
        };
        if let Some(value) = value {
            out.insert(field.name.to_string(), value);
        }
    }

    out
}

/// Dates in order of appearance, plus the text with their spans blanked so
/// their digits are not read as numbers.
fn find_dates(lower: &str) -> (Vec<NaiveDate>, String) {
    let mut dates = Vec::new();
    let mut masked = lower.to_string();
    for caps in DATE_RE.captures_iter(lower) {
        let (Some(whole), Some(y), Some(m), Some(d)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let parsed = (|| {
            NaiveDate::from_ymd_opt(
                y.as_str().parse().ok()?,
                m.as_str().parse().ok()?,
                d.as_str().parse().ok()?,
            )
        })();
        if let Some(date) = parsed {
            dates.push(date);
        }
        masked.replace_range(whole.range(), &" ".repeat(whole.len()));
    }
    (dates, masked)
}

fn find_numbers(masked: &str) -> Vec<NumberMention> {
    NUMBER_RE
        .find_iter(masked)
        .filter(|m| {
            // Skip digits glued to a word, like "spo2" or "o2".
            !masked[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphabetic())
        })
        .filter_map(|m| {
            m.as_str().parse::<f64>().ok().map(|value| NumberMention {
                value,
                start: m.start(),
                end: m.end(),
            })
        })
        .collect()
}

fn gap_is_label(gap: &str) -> bool {
    !gap.chars()
        .any(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ';' | '!' | '?' | '\n'))
}

/// Closest number to any cue occurrence that `accept` allows.
fn pick_number(
    text: &str,
    numbers: &[NumberMention],
    cues: &[&str],
    claimed: &mut HashSet<usize>,
    accept: impl Fn(f64) -> bool,
) -> Option<f64> {
    let mut best: Option<(usize, usize)> = None;
    for cue in cues {
        for (cue_start, cue_end) in find_term(text, cue) {
            for (idx, number) in numbers.iter().enumerate() {
                if claimed.contains(&idx) || !accept(number.value) {
                    continue;
                }
                let distance = if number.start >= cue_end {
                    let gap = &text[cue_end..number.start];
                    (gap.len() <= CUE_THEN_VALUE_GAP && gap_is_label(gap)).then_some(gap.len() * 2)
                } else if number.end <= cue_start {
                    let gap = &text[number.end..cue_start];
                    (gap.len() <= VALUE_THEN_CUE_GAP && gap_is_label(gap))
                        .then_some(gap.len() * 2 + 1)
                } else {
                    None
                };
                if let Some(distance) = distance
                    && best.is_none_or(|(d, _)| distance < d)
                {
                    best = Some((distance, idx));
                }
            }
        }
    }
    let (_, idx) = best?;
    claimed.insert(idx);
    Some(numbers[idx].value)
}

/// Byte spans where `term` occurs as a whole word or phrase.
///
/// A trailing `*` on `term` matches any word starting with the prefix; a
/// plural `s` is otherwise tolerated.
pub fn find_term(haystack: &str, term: &str) -> Vec<(usize, usize)> {
    let (needle, prefix) = match term.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (term, false),
    };
    if needle.is_empty() {
        return Vec::new();
    }

    let is_word = |c: char| c.is_alphanumeric();
    let mut spans = Vec::new();
    for (start, _) in haystack.match_indices(needle) {
        let before_ok = !haystack[..start].chars().next_back().is_some_and(is_word);
        if !before_ok {
            continue;
        }
        let mut end = start + needle.len();
        if prefix {
            end += haystack[end..]
                .chars()
                .take_while(|c| is_word(*c))
                .map(char::len_utf8)
                .sum::<usize>();
        } else {
            let mut rest = haystack[end..].chars();
            let (next, after) = (rest.next(), rest.next());
            match next {
                None => {}
                Some(c) if !is_word(c) => {}
                Some('s') if !after.is_some_and(is_word) => end += 1,
                Some(_) => continue,
            }
        }
        spans.push((start, end));
    }
    spans
}

pub fn contains_term(haystack: &str, term: &str) -> bool {
    !find_term(haystack, term).is_empty()
}
