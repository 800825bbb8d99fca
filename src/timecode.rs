//! Timecode normalization.
//!
//! Asset documents carry offsets in whatever shape the enrichment pipeline
//! emitted them: plain seconds, `MM:SS`, `HH:MM:SS`, or `MM:SS:fraction`.
//! Everything downstream (seeking, chapter tables, clip previews) works on
//! seconds, so the conversions live here.

use serde::{Deserialize, Serialize};

/// Label shown whenever there is nothing sensible to render.
pub const ZERO_LABEL: &str = "00:00";

/// A raw offset as found in stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Text(String),
}

impl Default for TimeValue {
    fn default() -> Self {
        TimeValue::Text(String::new())
    }
}

impl From<f64> for TimeValue {
    fn from(value: f64) -> Self {
        TimeValue::Seconds(value)
    }
}

impl From<&str> for TimeValue {
    fn from(value: &str) -> Self {
        TimeValue::Text(value.to_owned())
    }
}

impl From<String> for TimeValue {
    fn from(value: String) -> Self {
        TimeValue::Text(value)
    }
}

impl TimeValue {
    pub fn seconds(&self) -> f64 {
        parse_timecode(self)
    }

    pub fn short_label(&self) -> String {
        format_short(self)
    }
}

/// Converts a timecode into seconds.
///
/// Strings are split on `:` and `.`. Two parts read as `MM:SS`. With three or
/// more parts the first two decide the layout: when both are at most 59 the
/// value is taken as `MM:SS:fraction` and the fraction is dropped, otherwise
/// it is `HH:MM:SS`. A genuine `HH:MM:SS` whose hours and minutes are both
/// below 60 therefore parses as minutes and seconds; stored data has not been
/// confirmed either way, so the heuristic stays as is.
pub fn parse_timecode(value: &TimeValue) -> f64 {
    match value {
        TimeValue::Seconds(seconds) => *seconds,
        TimeValue::Text(text) => parse_timecode_str(text),
    }
}

pub fn parse_timecode_str(text: &str) -> f64 {
    let parts = numeric_parts(text);
    let seconds = match parts.as_slice() {
        [] | [_] => 0.0,
        [minutes, seconds] => minutes * 60.0 + seconds,
        [first, second, third, ..] => {
            if *first <= 59.0 && *second <= 59.0 {
                first * 60.0 + second
            } else {
                first * 3600.0 + second * 60.0 + third
            }
        }
    };
    clamp_seconds(seconds)
}

/// Keeps parsed offsets finite and non-negative.
fn clamp_seconds(seconds: f64) -> f64 {
    if seconds.is_finite() { seconds.max(0.0) } else { 0.0 }
}

fn numeric_parts(text: &str) -> Vec<f64> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split([':', '.'])
        .map(|part| leading_integer(part).unwrap_or(0.0))
        .collect()
}

/// Reads the integer prefix of `part`, ignoring surrounding whitespace, so
/// `"07s"` yields 7 and `"x"` yields `None`. Digits are read as `f64` so
/// arbitrarily long runs cannot overflow.
fn leading_integer(part: &str) -> Option<f64> {
    let trimmed = part.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok().map(|value| sign * value)
}

/// Renders seconds as zero-padded `MM:SS`. Minutes are not folded into hours.
pub fn format_seconds(seconds: f64) -> String {
    if seconds.is_nan() || seconds < 0.0 {
        return ZERO_LABEL.to_owned();
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{minutes:02}:{secs:02}")
}

/// Short display form: numbers go through [`format_seconds`], colon strings
/// keep their first two components verbatim.
pub fn format_short(value: &TimeValue) -> String {
    match value {
        TimeValue::Seconds(seconds) => format_seconds(*seconds),
        TimeValue::Text(text) if text.is_empty() => ZERO_LABEL.to_owned(),
        TimeValue::Text(text) => {
            let mut parts = text.split(':');
            match (parts.next(), parts.next()) {
                (Some(first), Some(second)) => format!("{first}:{second}"),
                _ => text.clone(),
            }
        }
    }
}

/// Clip previews only look at the leading `MM:SS` of a timecode.
pub fn parse_clip_time(value: &TimeValue) -> Option<f64> {
    match value {
        TimeValue::Seconds(seconds) => Some(*seconds),
        TimeValue::Text(text) => {
            let mut parts = text.split(':');
            let minutes = parts.next()?;
            let seconds = parts.next()?;
            let minutes = leading_integer(minutes).unwrap_or(0.0);
            let seconds = leading_integer(seconds).unwrap_or(0.0);
            Some(clamp_seconds(minutes * 60.0 + seconds))
        }
    }
}
