//! Shorts derived from an asset's preview clips, plus the hover-preview loop.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::Asset;
use crate::timecode::{TimeValue, parse_clip_time};

fn youtube_regex() -> &'static Regex {
    static YOUTUBE_REGEX: OnceLock<Regex> = OnceLock::new();
    YOUTUBE_REGEX.get_or_init(|| {
        Regex::new(r"^.*(youtu.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*")
            .expect("Failed to compile YouTube id regex")
    })
}

/// Extracts the 11 character video id from the usual YouTube URL shapes.
pub fn youtube_id(url: &str) -> Option<String> {
    let captures = youtube_regex().captures(url)?;
    let id = captures.get(2)?.as_str();
    (id.len() == 11).then(|| id.to_owned())
}

/// Whether the URL points at YouTube, in which case previews show the poster
/// instead of an inline video.
pub fn is_external_video(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Short {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub start_time: TimeValue,
    pub end_time: TimeValue,
    pub categories: Vec<String>,
}

impl Short {
    pub fn preview_window(&self) -> PreviewWindow {
        PreviewWindow::new(&self.start_time, &self.end_time)
    }

    pub fn is_external(&self) -> bool {
        is_external_video(&self.video_url)
    }
}

/// Turns every preview clip of `asset` into a short. Clips have no artwork of
/// their own so the asset poster stands in.
pub fn shorts_for(asset: &Asset) -> Vec<Short> {
    asset
        .previews
        .clips
        .iter()
        .enumerate()
        .map(|(index, clip)| Short {
            id: format!("{}-short-{}", asset.id, index),
            title: clip.summary.clone(),
            description: clip.user_description.clone(),
            video_url: asset.public_url().to_owned(),
            thumbnail_url: asset.poster_url.clone(),
            start_time: clip.start_timecode.clone(),
            end_time: clip.end_timecode.clone(),
            categories: clip.emotions_triggered.clone(),
        })
        .collect()
}

/// Playback range of a hover preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewWindow {
    pub start: f64,
    pub end: Option<f64>,
}

impl PreviewWindow {
    pub fn new(start: &TimeValue, end: &TimeValue) -> Self {
        Self {
            start: parse_clip_time(start).unwrap_or(0.0),
            end: parse_clip_time(end).filter(|end| *end > 0.0),
        }
    }

    /// Without an end the element's own looping takes care of repeats.
    pub fn loops_natively(&self) -> bool {
        self.end.is_none()
    }

    fn past_end(&self, current: f64) -> bool {
        self.end.is_some_and(|end| current >= end)
    }

    /// Position to jump to when the pointer enters the preview, if the
    /// current position lies outside the window.
    pub fn on_hover(&self, current: f64) -> Option<f64> {
        (current < self.start || self.past_end(current)).then_some(self.start)
    }

    /// Position to rewind to on a playback tick once the end is reached.
    pub fn on_time_update(&self, current: f64) -> Option<f64> {
        self.past_end(current).then_some(self.start)
    }
}
