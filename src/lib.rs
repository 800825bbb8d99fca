#![forbid(unsafe_code)]

//! Shared core of the reelview media catalog.
//!
//! The backend binary serves the catalog and its delegates over HTTP; the
//! CLI and the player-side modules (chapters, transcript, clips, seek) reuse
//! the same document types and timecode helpers.

pub mod api;
pub mod assistant;
pub mod catalog;
pub mod chapters;
pub mod chat;
pub mod client;
pub mod clips;
pub mod config;
pub mod search;
pub mod seek;
pub mod signing;
pub mod timecode;
pub mod transcript;
