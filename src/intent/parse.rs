//! Parse-or-fallback classification of free text
//!
//! Model output is natural language that usually contains one JSON object.
//! Everything fragile about reading it lives here.

use serde_json::Value;

use super::{Intent, Params, ParsedIntent};
use crate::capabilities::{GenerationRequest, TextGenerator};

/// System prompt describing the intent taxonomy to the generator
pub const TAXONOMY_PROMPT: &str = r#"You are an assistant that helps parse voice commands for a home assistant system.
Extract the intent and parameters from the user's command.
Return a JSON object with "intent" and "parameters" keys.

Available intents:
- light_control: Control lights (on/off/brightness/color)
- climate_control: Control temperature, fans, etc.
- switch_control: Control switches and outlets
- device_status: Get status of devices
- play_music: Play music or audio
- media_control: Control media playback (pause/resume/next/previous)
- volume_control: Adjust volume
- tv_control: Control TV (on/off/channel/input)
- weather: Get weather information
- time: Get current time or date
- general_query: Answer general questions
- system_control: Control the assistant system (stop/restart/mute/unmute)

Example formats:
{"intent": "light_control", "parameters": {"action": "turn_on", "device": "living room lights", "brightness": 80}}
{"intent": "play_music", "parameters": {"artist": "Taylor Swift", "source": "spotify"}}"#;

/// Prompt wrapping the user's command
#[must_use]
pub fn classification_prompt(text: &str) -> String {
    format!("Parse this voice command: '{text}'\nExtract the intent and parameters as JSON.")
}

/// The fallback classification for `text`
#[must_use]
pub fn fallback(text: &str) -> ParsedIntent {
    let mut params = Params::default();
    params.insert("query", Value::String(text.to_string()));
    ParsedIntent {
        intent: Intent::GeneralQuery,
        params,
    }
}

/// Classify `text` through `generator`, falling back to a general query
///
/// Falls back when the generator fails, answers with nothing, answers
/// without a balanced JSON object, or omits the `intent` key.
pub fn classify(
    generator: &dyn TextGenerator,
    text: &str,
    temperature: f32,
    max_tokens: Option<u32>,
) -> ParsedIntent {
    let prompt = classification_prompt(text);
    let request = GenerationRequest::new(&prompt)
        .system(TAXONOMY_PROMPT)
        .temperature(temperature)
        .max_tokens(max_tokens);

    let raw = match generator.generate(&request) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "generator unavailable, treating as general query");
            return fallback(text);
        }
    };

    interpret(&raw, text)
}

/// Turn raw generator output into an intent for `text`
#[must_use]
pub fn interpret(raw: &str, text: &str) -> ParsedIntent {
    if raw.trim().is_empty() {
        tracing::warn!("empty generator response");
        return fallback(text);
    }

    let Some(object) = extract_json_object(raw) else {
        tracing::warn!(response = %raw, "could not extract JSON from generator response");
        return fallback(text);
    };

    let value: Value = match serde_json::from_str(object) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "generator JSON did not parse");
            return fallback(text);
        }
    };

    let Some(tag) = value.get("intent").and_then(Value::as_str) else {
        tracing::warn!("generator JSON has no intent");
        return fallback(text);
    };

    let params = value
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .map(Params::from)
        .unwrap_or_default();

    let mut parsed = ParsedIntent {
        intent: Intent::from_tag(tag),
        params,
    };

    // General and unknown intents answer the original question
    if matches!(parsed.intent, Intent::GeneralQuery | Intent::Unknown(_))
        && parsed.params.text("query").is_empty()
    {
        parsed.params.insert("query", Value::String(text.to_string()));
    }

    parsed
}

/// The first balanced `{...}` object in `raw`
///
/// Braces inside JSON strings, including escaped quotes, are ignored.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
