//! Media playback over a Home Assistant `media_player` entity

use std::sync::Arc;

use serde_json::{Value, json};

use super::{HomeAutomation, MediaPlayer, MusicQuery};
use crate::{Error, Result};

const DOMAIN: &str = "media_player";

/// [`MediaPlayer`] backed by one Home Assistant media player
pub struct HomeAssistantMedia {
    home: Arc<dyn HomeAutomation>,
    entity_id: Option<String>,
}

impl HomeAssistantMedia {
    /// Control `entity_id`, or the first `media_player.*` entity when `None`
    #[must_use]
    pub fn new(home: Arc<dyn HomeAutomation>, entity_id: Option<String>) -> Self {
        Self { home, entity_id }
    }

    fn player(&self) -> Result<String> {
        if let Some(id) = &self.entity_id {
            return Ok(id.clone());
        }
        self.home
            .find_entities(DOMAIN, "")
            .into_iter()
            .next()
            .map(|e| e.entity_id)
            .ok_or_else(|| Error::Integration("no media player found".to_string()))
    }

    fn call(&self, service: &str, extra: Value) -> Result<()> {
        let mut payload = json!({ "entity_id": self.player()? });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            target.extend(extra);
        }
        self.home.call_service(DOMAIN, service, payload)
    }

    fn source_list(&self) -> Vec<String> {
        let Ok(player) = self.player() else {
            return Vec::new();
        };
        self.home
            .get_attributes(&player)
            .and_then(|attrs| attrs.get("source_list").cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

fn is_default_source(source: &str) -> bool {
    source.is_empty() || source.eq_ignore_ascii_case("default")
}

impl MediaPlayer for HomeAssistantMedia {
    fn play(&self) -> Result<()> {
        self.call("media_play", Value::Null)
    }

    fn pause(&self) -> Result<()> {
        self.call("media_pause", Value::Null)
    }

    fn next(&self) -> Result<()> {
        self.call("media_next_track", Value::Null)
    }

    fn previous(&self) -> Result<()> {
        self.call("media_previous_track", Value::Null)
    }

    fn set_volume(&self, level: u8) -> Result<()> {
        let level = f64::from(level.min(100)) / 100.0;
        self.call("volume_set", json!({ "volume_level": level }))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn get_volume(&self) -> Option<u8> {
        let player = self.player().ok()?;
        let level = self
            .home
            .get_attributes(&player)?
            .get("volume_level")
            .and_then(Value::as_f64)?;
        Some((level.clamp(0.0, 1.0) * 100.0).round() as u8)
    }

    fn set_mute(&self, muted: bool) -> Result<()> {
        self.call("volume_mute", json!({ "is_volume_muted": muted }))
    }

    fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.call("shuffle_set", json!({ "shuffle": enabled }))
    }

    fn set_repeat(&self, enabled: bool) -> Result<()> {
        let mode = if enabled { "all" } else { "off" };
        self.call("repeat_set", json!({ "repeat": mode }))
    }

    fn play_music(&self, query: &MusicQuery) -> Result<()> {
        if !is_default_source(&query.source) {
            let source = self
                .source_list()
                .into_iter()
                .find(|s| s.eq_ignore_ascii_case(&query.source))
                .unwrap_or_else(|| query.source.clone());
            self.call("select_source", json!({ "source": source }))?;
        }

        if query.is_empty() {
            return self.play();
        }

        let content_type = if query.playlist.is_empty() {
            "music"
        } else {
            "playlist"
        };
        self.call(
            "play_media",
            json!({
                "media_content_id": query.search_term(),
                "media_content_type": content_type,
            }),
        )
    }

    fn supports_source(&self, source: &str) -> bool {
        is_default_source(source)
            || self
                .source_list()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(source))
    }
}
