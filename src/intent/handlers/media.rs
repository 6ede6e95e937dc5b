//! Media handlers: music playback, transport control, volume

use std::sync::Arc;

use super::{Handler, MEDIA_UNAVAILABLE};
use crate::Result;
use crate::capabilities::{MediaPlayer, MusicQuery};
use crate::intent::Params;

/// Default volume step in percent
const VOLUME_STEP: f64 = 10.0;

/// Starts music by artist, album, track, playlist or genre
pub struct PlayMusic {
    media: Option<Arc<dyn MediaPlayer>>,
}

impl PlayMusic {
    #[must_use]
    pub const fn new(media: Option<Arc<dyn MediaPlayer>>) -> Self {
        Self { media }
    }
}

/// What is about to play, phrased for the reply
fn describe(query: &MusicQuery) -> String {
    let MusicQuery {
        artist,
        album,
        track,
        playlist,
        genre,
        ..
    } = query;

    if !track.is_empty() && !artist.is_empty() {
        format!("Playing {track} by {artist}")
    } else if !album.is_empty() && !artist.is_empty() {
        format!("Playing album {album} by {artist}")
    } else if !artist.is_empty() {
        format!("Playing music by {artist}")
    } else if !track.is_empty() {
        format!("Playing {track}")
    } else if !album.is_empty() {
        format!("Playing album {album}")
    } else if !playlist.is_empty() {
        format!("Playing playlist {playlist}")
    } else if !genre.is_empty() {
        format!("Playing {genre} music")
    } else {
        "Playing music".to_string()
    }
}

impl Handler for PlayMusic {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(media) = &self.media else {
            return Ok(MEDIA_UNAVAILABLE.to_string());
        };

        let query = MusicQuery {
            artist: params.text("artist"),
            album: params.text("album"),
            track: params.text("track"),
            playlist: params.text("playlist"),
            genre: params.text("genre"),
            source: params.text("source"),
        };

        if !media.supports_source(&query.source) {
            return Ok(format!(
                "Sorry, I don't support playing music from {}",
                query.source
            ));
        }

        let named_source = !query.source.is_empty();
        if named_source && query.is_empty() {
            return Ok(format!(
                "Please specify what you'd like to play on {}",
                query.source
            ));
        }

        if let Err(e) = media.play_music(&query) {
            tracing::warn!(error = %e, "music playback failed");
            return Ok("Sorry, I couldn't play that music".to_string());
        }

        let reply = describe(&query);
        if named_source {
            Ok(format!("{reply} on {}", query.source))
        } else {
            Ok(reply)
        }
    }
}

/// Pause, resume, skip, shuffle and repeat
pub struct MediaControl {
    media: Option<Arc<dyn MediaPlayer>>,
}

impl MediaControl {
    #[must_use]
    pub const fn new(media: Option<Arc<dyn MediaPlayer>>) -> Self {
        Self { media }
    }
}

impl Handler for MediaControl {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(media) = &self.media else {
            return Ok(MEDIA_UNAVAILABLE.to_string());
        };

        let action = params.action();
        let (result, done, failed) = match action.as_str() {
            "pause" | "stop" => (media.pause(), "Paused", "Failed to pause"),
            "play" | "resume" => (
                media.play(),
                "Resumed playback",
                "Failed to resume playback",
            ),
            "next" | "skip" => (
                media.next(),
                "Skipped to next track",
                "Failed to skip to next track",
            ),
            "previous" | "back" => (
                media.previous(),
                "Went back to previous track",
                "Failed to go back",
            ),
            "shuffle" | "shuffle_on" => (
                media.set_shuffle(true),
                "Shuffle mode enabled",
                "Failed to enable shuffle mode",
            ),
            "shuffle_off" => (
                media.set_shuffle(false),
                "Shuffle mode disabled",
                "Failed to disable shuffle mode",
            ),
            "repeat" | "repeat_on" => (
                media.set_repeat(true),
                "Repeat mode enabled",
                "Failed to enable repeat mode",
            ),
            "repeat_off" => (
                media.set_repeat(false),
                "Repeat mode disabled",
                "Failed to disable repeat mode",
            ),
            _ => return Ok(format!("Unknown media control action: {action}")),
        };

        Ok(match result {
            Ok(()) => done.to_string(),
            Err(e) => {
                tracing::warn!(action, error = %e, "media control failed");
                failed.to_string()
            }
        })
    }
}

/// Absolute and relative volume, mute and unmute
pub struct VolumeControl {
    media: Option<Arc<dyn MediaPlayer>>,
}

impl VolumeControl {
    #[must_use]
    pub const fn new(media: Option<Arc<dyn MediaPlayer>>) -> Self {
        Self { media }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn step(media: &dyn MediaPlayer, delta: f64, verb: &str) -> String {
        let Some(current) = media.get_volume() else {
            return "Failed to get current volume".to_string();
        };
        let level = (f64::from(current) + delta).clamp(0.0, 100.0).round() as u8;
        match media.set_volume(level) {
            Ok(()) => format!("Volume {verb} to {level}%"),
            Err(e) => {
                tracing::warn!(error = %e, "volume change failed");
                let action = if delta >= 0.0 { "increase" } else { "decrease" };
                format!("Failed to {action} volume")
            }
        }
    }
}

impl Handler for VolumeControl {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(media) = &self.media else {
            return Ok(MEDIA_UNAVAILABLE.to_string());
        };

        let action = params.action();
        let step = params.number("step").unwrap_or(VOLUME_STEP).abs();

        let reply = match action.as_str() {
            "set" | "set_volume" => match params.number("level") {
                Some(level) => {
                    let level = level.clamp(0.0, 100.0).round() as u8;
                    match media.set_volume(level) {
                        Ok(()) => format!("Volume set to {level}%"),
                        Err(e) => {
                            tracing::warn!(error = %e, "volume set failed");
                            "Failed to set volume".to_string()
                        }
                    }
                }
                None => "Please specify the volume level".to_string(),
            },
            "up" | "increase" => Self::step(media.as_ref(), step, "increased"),
            "down" | "decrease" => Self::step(media.as_ref(), -step, "decreased"),
            "mute" | "mute_on" => match media.set_mute(true) {
                Ok(()) => "Muted".to_string(),
                Err(_) => "Failed to mute".to_string(),
            },
            "unmute" | "mute_off" => match media.set_mute(false) {
                Ok(()) => "Unmuted".to_string(),
                Err(_) => "Failed to unmute".to_string(),
            },
            _ => format!("Unknown volume control action: {action}"),
        };

        Ok(reply)
    }
}
