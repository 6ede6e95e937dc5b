//! Intent routing
//!
//! Free text becomes an [`Intent`] plus [`Params`] through the text generator,
//! the intent selects a handler from the [`HandlerTable`], and the handler's
//! reply is returned (and optionally spoken). The router is a closed failure
//! boundary: generator errors, handler errors and handler panics all end as
//! reply text.
//!
//! ```text
//! text ─▶ parse ─▶ (intent, params) ─▶ dispatch ─▶ handler ─▶ reply ─▶ sink
//! ```

pub mod handlers;
pub mod parse;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::capabilities::{HomeAutomation, MediaPlayer, SpeechSink, TextGenerator};
use handlers::Handler;

/// Reply used whenever a handler fails or the pipeline hits an internal error
pub const APOLOGY: &str = "Sorry, I encountered an error while processing your command.";

/// The closed set of intents the router understands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intent {
    LightControl,
    ClimateControl,
    SwitchControl,
    DeviceStatus,
    PlayMusic,
    MediaControl,
    VolumeControl,
    TvControl,
    Weather,
    Time,
    GeneralQuery,
    SystemControl,
    /// A tag the generator invented; answered as a general query
    Unknown(String),
}

impl Intent {
    /// Every routable intent, excluding `Unknown`
    pub const ALL: [Self; 12] = [
        Self::LightControl,
        Self::ClimateControl,
        Self::SwitchControl,
        Self::DeviceStatus,
        Self::PlayMusic,
        Self::MediaControl,
        Self::VolumeControl,
        Self::TvControl,
        Self::Weather,
        Self::Time,
        Self::GeneralQuery,
        Self::SystemControl,
    ];

    /// Map a wire tag to an intent; unrecognized tags become `Unknown`
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "light_control" => Self::LightControl,
            "climate_control" => Self::ClimateControl,
            "switch_control" => Self::SwitchControl,
            "device_status" => Self::DeviceStatus,
            "play_music" => Self::PlayMusic,
            "media_control" => Self::MediaControl,
            "volume_control" => Self::VolumeControl,
            "tv_control" => Self::TvControl,
            "weather" => Self::Weather,
            "time" => Self::Time,
            "general_query" => Self::GeneralQuery,
            "system_control" => Self::SystemControl,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_tag(&self) -> &str {
        match self {
            Self::LightControl => "light_control",
            Self::ClimateControl => "climate_control",
            Self::SwitchControl => "switch_control",
            Self::DeviceStatus => "device_status",
            Self::PlayMusic => "play_music",
            Self::MediaControl => "media_control",
            Self::VolumeControl => "volume_control",
            Self::TvControl => "tv_control",
            Self::Weather => "weather",
            Self::Time => "time",
            Self::GeneralQuery => "general_query",
            Self::SystemControl => "system_control",
            Self::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Best-effort intent parameters; no key is guaranteed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Scalar value as trimmed text; empty when missing
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Lowercased text, for action verbs
    #[must_use]
    pub fn action(&self) -> String {
        self.text("action").to_lowercase()
    }

    /// Numeric value, accepting numeric strings
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// One classification result
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub intent: Intent,
    pub params: Params,
}

/// Fixed mapping from every intent to its handler
///
/// Built once; lookup is an exhaustive match, so adding an intent without a
/// handler fails to compile.
pub struct HandlerTable {
    light: Box<dyn Handler>,
    climate: Box<dyn Handler>,
    switch: Box<dyn Handler>,
    device_status: Box<dyn Handler>,
    play_music: Box<dyn Handler>,
    media_control: Box<dyn Handler>,
    volume: Box<dyn Handler>,
    tv: Box<dyn Handler>,
    weather: Box<dyn Handler>,
    time: Box<dyn Handler>,
    general: Box<dyn Handler>,
    system: Box<dyn Handler>,
}

impl HandlerTable {
    /// Build the standard handlers over the given integrations
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        home: Option<Arc<dyn HomeAutomation>>,
        media: Option<Arc<dyn MediaPlayer>>,
    ) -> Self {
        use handlers::{home as h, info, media as m, system};

        Self {
            light: Box::new(h::EntityControl::lights(home.clone())),
            climate: Box::new(h::ClimateControl::new(home.clone())),
            switch: Box::new(h::EntityControl::switches(home.clone())),
            device_status: Box::new(h::DeviceStatus::new(home.clone())),
            play_music: Box::new(m::PlayMusic::new(media.clone())),
            media_control: Box::new(m::MediaControl::new(media.clone())),
            volume: Box::new(m::VolumeControl::new(media)),
            tv: Box::new(h::TvControl::new(home.clone())),
            weather: Box::new(info::Weather::new(home)),
            time: Box::new(info::Time),
            general: Box::new(info::GeneralQuery::new(generator)),
            system: Box::new(system::SystemControl),
        }
    }

    /// The handler for `intent`; unknown intents get the general query handler
    #[must_use]
    pub fn get(&self, intent: &Intent) -> &dyn Handler {
        match intent {
            Intent::LightControl => self.light.as_ref(),
            Intent::ClimateControl => self.climate.as_ref(),
            Intent::SwitchControl => self.switch.as_ref(),
            Intent::DeviceStatus => self.device_status.as_ref(),
            Intent::PlayMusic => self.play_music.as_ref(),
            Intent::MediaControl => self.media_control.as_ref(),
            Intent::VolumeControl => self.volume.as_ref(),
            Intent::TvControl => self.tv.as_ref(),
            Intent::Weather => self.weather.as_ref(),
            Intent::Time => self.time.as_ref(),
            Intent::GeneralQuery | Intent::Unknown(_) => self.general.as_ref(),
            Intent::SystemControl => self.system.as_ref(),
        }
    }
}

/// Parses text into intents and dispatches them to handlers
///
/// Safe to call from any number of threads at once.
pub struct IntentRouter {
    generator: Arc<dyn TextGenerator>,
    handlers: HandlerTable,
    temperature: f32,
    max_tokens: Option<u32>,
    sink: Option<Arc<dyn SpeechSink>>,
}

impl IntentRouter {
    /// Create a router with the standard handler table
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        home: Option<Arc<dyn HomeAutomation>>,
        media: Option<Arc<dyn MediaPlayer>>,
    ) -> Self {
        let handlers = HandlerTable::new(Arc::clone(&generator), home, media);
        Self {
            generator,
            handlers,
            temperature: 0.1,
            max_tokens: None,
            sink: None,
        }
    }

    /// Sampling used for classification
    #[must_use]
    pub const fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Speak every reply produced by [`IntentRouter::process`]
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SpeechSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Classify `text`; never fails
    #[must_use]
    pub fn parse(&self, text: &str) -> ParsedIntent {
        parse::classify(
            self.generator.as_ref(),
            text,
            self.temperature,
            self.max_tokens,
        )
    }

    /// Run the handler for `intent`; handler errors and panics become [`APOLOGY`]
    #[must_use]
    pub fn dispatch(&self, intent: &Intent, params: &Params) -> String {
        let handler = self.handlers.get(intent);

        let reply = match catch_unwind(AssertUnwindSafe(|| handler.handle(params))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(intent = %intent, error = %e, "handler failed");
                return APOLOGY.to_string();
            }
            Err(_) => {
                tracing::error!(intent = %intent, "handler panicked");
                return APOLOGY.to_string();
            }
        };

        if reply.trim().is_empty() {
            tracing::warn!(intent = %intent, "handler returned an empty reply");
            return APOLOGY.to_string();
        }
        reply
    }

    /// Parse and dispatch without speaking; always non-empty
    #[must_use]
    pub fn route(&self, text: &str) -> String {
        let routed = catch_unwind(AssertUnwindSafe(|| {
            let parsed = self.parse(text);
            tracing::info!(intent = %parsed.intent, params = %parsed.params, "detected intent");
            self.dispatch(&parsed.intent, &parsed.params)
        }));

        routed.unwrap_or_else(|_| {
            tracing::error!("command pipeline panicked");
            APOLOGY.to_string()
        })
    }

    /// Route `text` and speak the reply through the attached sink
    #[must_use]
    pub fn process(&self, text: &str) -> String {
        tracing::info!(command = %text, "processing command");
        let reply = self.route(text);

        if let Some(sink) = &self.sink
            && catch_unwind(AssertUnwindSafe(|| sink.speak(&reply))).is_err()
        {
            tracing::error!("speech sink panicked");
        }

        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_for_all_intents() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_tag(intent.as_tag()), intent);
        }
        assert_eq!(
            Intent::from_tag("make_coffee"),
            Intent::Unknown("make_coffee".to_string())
        );
    }

    #[test]
    fn test_params_coercion() {
        let params: Params = serde_json::json!({
            "action": " Turn_On ",
            "brightness": 80,
            "level": "45%",
            "missing": null,
        })
        .as_object()
        .cloned()
        .map(Params::from)
        .unwrap();

        assert_eq!(params.action(), "turn_on");
        assert_eq!(params.text("brightness"), "80");
        assert_eq!(params.number("level"), Some(45.0));
        assert!(params.get("missing").is_none());
        assert_eq!(params.text("device"), "");
    }
}
