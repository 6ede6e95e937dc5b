//! Informational handlers: weather, time, general questions

use std::sync::Arc;

use chrono::Local;
use serde_json::Value;

use super::{HOME_UNAVAILABLE, Handler, display_value};
use crate::Result;
use crate::capabilities::{GenerationRequest, HomeAutomation, TextGenerator};
use crate::intent::Params;

const GENERAL_PROMPT: &str = "You are a helpful home assistant AI. Answer the user's question concisely and accurately.
If you don't know the answer, just say so without making up information.
Keep responses brief but informative.";

/// Token cap for general answers
const GENERAL_MAX_TOKENS: u32 = 200;

/// Current conditions and tomorrow's forecast from the first `weather.*` entity
pub struct Weather {
    home: Option<Arc<dyn HomeAutomation>>,
}

impl Weather {
    #[must_use]
    pub const fn new(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self { home }
    }
}

impl Handler for Weather {
    fn handle(&self, _params: &Params) -> Result<String> {
        let Some(home) = &self.home else {
            return Ok(HOME_UNAVAILABLE.to_string());
        };

        let Some(entity) = home.find_entities("weather", "").into_iter().next() else {
            return Ok("I couldn't find any weather information".to_string());
        };

        let state = home
            .get_state(&entity.entity_id)
            .unwrap_or_else(|| entity.state.clone());
        let Some(attrs) = home.get_attributes(&entity.entity_id) else {
            return Ok("I couldn't get the weather information".to_string());
        };

        let mut reply = format!("Current weather: {state}");
        if let Some(t) = attrs.get("temperature").filter(|v| !v.is_null()) {
            reply.push_str(&format!(", temperature: {}°", display_value(t)));
        }
        if let Some(h) = attrs.get("humidity").filter(|v| !v.is_null()) {
            reply.push_str(&format!(", humidity: {}%", display_value(h)));
        }
        if let Some(w) = attrs.get("wind_speed").filter(|v| !v.is_null()) {
            reply.push_str(&format!(", wind: {}", display_value(w)));
        }

        let tomorrow = attrs
            .get("forecast")
            .and_then(Value::as_array)
            .and_then(|f| f.first());
        if let Some(day) = tomorrow {
            let field = |key: &str| day.get(key).filter(|v| !v.is_null()).map(display_value);
            reply.push_str(&format!(
                "\nTomorrow: {}",
                field("condition").unwrap_or_else(|| "unknown".to_string())
            ));
            match (field("temperature_low"), field("temperature")) {
                (Some(low), Some(high)) => reply.push_str(&format!(", {low}° to {high}°")),
                (None, Some(high)) => reply.push_str(&format!(", high of {high}°")),
                _ => {}
            }
        }

        Ok(reply)
    }
}

/// Local time and date
pub struct Time;

impl Handler for Time {
    fn handle(&self, params: &Params) -> Result<String> {
        let action = params.action();
        let now = Local::now();

        Ok(match action.as_str() {
            "" | "get_time" | "current_time" => {
                format!("The current time is {}", now.format("%I:%M %p"))
            }
            "get_date" | "current_date" => format!("Today is {}", now.format("%A, %B %d, %Y")),
            "get_datetime" | "current_datetime" => format!(
                "It's {} on {}",
                now.format("%I:%M %p"),
                now.format("%A, %B %d, %Y")
            ),
            _ => format!("Unknown time action: {action}"),
        })
    }
}

/// Free-form questions answered by the text generator
pub struct GeneralQuery {
    generator: Arc<dyn TextGenerator>,
}

impl GeneralQuery {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

impl Handler for GeneralQuery {
    fn handle(&self, params: &Params) -> Result<String> {
        let query = params.text("query");
        if query.is_empty() {
            return Ok("I'm not sure what you're asking".to_string());
        }

        let request = GenerationRequest::new(&query)
            .system(GENERAL_PROMPT)
            .max_tokens(Some(GENERAL_MAX_TOKENS));

        match self.generator.generate(&request) {
            Ok(answer) if !answer.trim().is_empty() => Ok(answer.trim().to_string()),
            Ok(_) => Ok("Sorry, I couldn't answer that question".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "general query failed");
                Ok("Sorry, I couldn't answer that question".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Params {
        value.as_object().cloned().map(Params::from).unwrap()
    }

    #[test]
    fn test_time_replies() {
        assert!(
            Time.handle(&Params::default())
                .unwrap()
                .starts_with("The current time is ")
        );
        assert!(
            Time.handle(&params(json!({"action": "get_date"})))
                .unwrap()
                .starts_with("Today is ")
        );
        assert_eq!(
            Time.handle(&params(json!({"action": "set_alarm"}))).unwrap(),
            "Unknown time action: set_alarm"
        );
    }

    #[test]
    fn test_weather_without_home() {
        assert_eq!(
            Weather::new(None).handle(&Params::default()).unwrap(),
            HOME_UNAVAILABLE
        );
    }
}
