//! Transcript search and word-level seeking.

use serde::Serialize;

use crate::catalog::TranscriptionWord;
use crate::seek::SeekRequest;
use crate::timecode::format_seconds;

pub fn word_time(word: &TranscriptionWord) -> f64 {
    word.start_time.as_seconds()
}

/// Clicking a word seeks to it without chapter context.
pub fn word_seek_request(word: &TranscriptionWord) -> SeekRequest {
    SeekRequest::at_seconds(word_time(word))
}

#[derive(Debug, Clone, Serialize)]
pub struct HighlightedWord<'a> {
    pub word: &'a str,
    pub seconds: f64,
    pub highlighted: bool,
}

impl HighlightedWord<'_> {
    pub fn label(&self) -> String {
        format_seconds(self.seconds)
    }
}

pub fn highlight<'a>(words: &'a [TranscriptionWord], query: &str) -> Vec<HighlightedWord<'a>> {
    let query = query.to_lowercase();
    words
        .iter()
        .map(|word| HighlightedWord {
            word: &word.word,
            seconds: word_time(word),
            highlighted: !query.is_empty() && word.word.to_lowercase().contains(&query),
        })
        .collect()
}

pub fn matches<'a>(words: &'a [TranscriptionWord], query: &str) -> Vec<HighlightedWord<'a>> {
    highlight(words, query)
        .into_iter()
        .filter(|word| word.highlighted)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WordOffset;

    fn word(text: &str, seconds: i64, nanos: i64) -> TranscriptionWord {
        TranscriptionWord {
            word: text.into(),
            start_time: WordOffset { seconds, nanos },
            end_time: WordOffset {
                seconds: seconds + 1,
                nanos: 0,
            },
        }
    }

    #[test]
    fn empty_query_highlights_nothing() {
        let words = vec![word("Hello", 0, 0), word("world", 1, 0)];
        assert!(highlight(&words, "").iter().all(|w| !w.highlighted));
        assert!(matches(&words, "").is_empty());
    }

    #[test]
    fn substring_matches_ignore_case() {
        let words = vec![
            word("Train", 3, 0),
            word("station", 4, 0),
            word("trainee", 65, 250_000_000),
        ];
        let found = matches(&words, "TRAIN");
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].seconds, 65.25);
        assert_eq!(found[1].label(), "01:05");
    }

    #[test]
    fn word_seek_has_no_segment() {
        let request = word_seek_request(&word("go", 90, 500_000_000));
        assert_eq!(request.target_seconds, 90.5);
        assert_eq!(request.label, "01:30");
        assert_eq!(request.segment, 0);
    }
}
