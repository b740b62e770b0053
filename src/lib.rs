//! Ramiel Music: a Discord music bot that plays YouTube tracks and
//! playlists in voice channels.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
