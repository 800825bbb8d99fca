//! Chapter table helpers: type facets, free-text filtering and seekable rows.

use serde::Serialize;

use crate::catalog::Section;
use crate::seek::SeekRequest;
use crate::timecode::format_short;

/// Distinct section types in first-seen order.
pub fn chapter_types(sections: &[Section]) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for section in sections {
        if !types.iter().any(|kind| kind == &section.kind) {
            types.push(section.kind.clone());
        }
    }
    types
}

/// Button label for a type facet (`ad_break` -> `ad break`).
pub fn display_type(kind: &str) -> String {
    kind.replace('_', " ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterFilter {
    pub kind: Option<String>,
    pub query: String,
}

impl ChapterFilter {
    /// Selecting the active type again clears the type filter.
    pub fn toggle_type(&mut self, kind: &str) {
        if self.kind.as_deref() == Some(kind) {
            self.kind = None;
        } else {
            self.kind = Some(kind.to_owned());
        }
    }

    pub fn matches(&self, section: &Section) -> bool {
        if let Some(kind) = &self.kind {
            if &section.kind != kind {
                return false;
            }
        }
        if self.query.is_empty() {
            return true;
        }
        section
            .description()
            .to_lowercase()
            .contains(&self.query.to_lowercase())
    }
}

pub fn filter_sections<'a>(sections: &'a [Section], filter: &ChapterFilter) -> Vec<&'a Section> {
    sections
        .iter()
        .filter(|section| filter.matches(section))
        .collect()
}

/// One rendered row of the chapter table.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRow<'a> {
    /// Position within the filtered list, starting at 1.
    pub index: u32,
    pub start: String,
    pub end: String,
    pub kind: &'a str,
    pub description: &'a str,
    #[serde(skip)]
    section: &'a Section,
}

impl ChapterRow<'_> {
    pub fn seek_request(&self) -> SeekRequest {
        SeekRequest::at(&self.section.start_time, self.index)
    }
}

pub fn chapter_rows<'a>(sections: &'a [Section], filter: &ChapterFilter) -> Vec<ChapterRow<'a>> {
    filter_sections(sections, filter)
        .into_iter()
        .enumerate()
        .map(|(position, section)| ChapterRow {
            index: position as u32 + 1,
            start: format_short(&section.start_time),
            end: format_short(&section.end_time),
            kind: &section.kind,
            description: section.description(),
            section,
        })
        .collect()
}
