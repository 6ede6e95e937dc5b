//! Home automation handlers: lights, switches, climate, device status, TV

use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::{HOME_UNAVAILABLE, Handler, display_value, join_names};
use crate::Result;
use crate::capabilities::{Entity, HomeAutomation};
use crate::intent::Params;

/// Per-entity results of one multi-entity service call
struct Outcome {
    succeeded: Vec<String>,
    failed: usize,
}

impl Outcome {
    const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Call `domain.service` on every entity, collecting each result
fn call_each(
    home: &dyn HomeAutomation,
    entities: &[Entity],
    domain: &str,
    service: &str,
    extra: &Map<String, Value>,
) -> Outcome {
    let mut outcome = Outcome {
        succeeded: Vec::with_capacity(entities.len()),
        failed: 0,
    };

    for entity in entities {
        let mut payload = Map::new();
        payload.insert("entity_id".to_string(), json!(entity.entity_id));
        payload.extend(extra.clone());

        match home.call_service(domain, service, Value::Object(payload)) {
            Ok(()) => outcome
                .succeeded
                .push(home.entity_name(&entity.entity_id)),
            Err(e) => {
                tracing::warn!(entity_id = %entity.entity_id, domain, service, error = %e, "service call failed");
                outcome.failed += 1;
            }
        }
    }

    outcome
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

/// On/off/toggle control of `light.*` or `switch.*` entities
pub struct EntityControl {
    home: Option<Arc<dyn HomeAutomation>>,
    domain: &'static str,
    noun: &'static str,
    plural: &'static str,
}

impl EntityControl {
    #[must_use]
    pub const fn lights(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self {
            home,
            domain: "light",
            noun: "light",
            plural: "lights",
        }
    }

    #[must_use]
    pub const fn switches(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self {
            home,
            domain: "switch",
            noun: "switch",
            plural: "switches",
        }
    }
}

impl Handler for EntityControl {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(home) = &self.home else {
            return Ok(HOME_UNAVAILABLE.to_string());
        };

        let device = params.text("device");
        if device.is_empty() {
            return Ok(format!("Please specify which {} you want to control", self.noun));
        }

        let (service, verb) = match params.action().as_str() {
            "on" | "turn_on" => ("turn_on", "Turned on"),
            "off" | "turn_off" => ("turn_off", "Turned off"),
            "toggle" => ("toggle", "Toggled"),
            _ => {
                return Ok(format!(
                    "Please tell me whether to turn the {} on or off",
                    self.plural
                ));
            }
        };

        let entities = home.find_entities(self.domain, &device);
        if entities.is_empty() {
            return Ok(format!(
                "I couldn't find any {} matching '{device}'",
                self.plural
            ));
        }

        let mut extra = Map::new();
        if self.domain == "light" && service == "turn_on" {
            if let Some(brightness) = params.number("brightness") {
                extra.insert("brightness_pct".to_string(), json!(percent(brightness)));
            }
            let color = params.text("color");
            if !color.is_empty() {
                extra.insert("color_name".to_string(), json!(color));
            }
        }

        let outcome = call_each(home.as_ref(), &entities, self.domain, service, &extra);
        if outcome.all_succeeded() {
            Ok(format!("{verb} {}", join_names(&outcome.succeeded)))
        } else {
            Ok(format!(
                "I had trouble controlling some of the {}",
                self.plural
            ))
        }
    }
}

/// Temperature and HVAC mode control of `climate.*` entities
pub struct ClimateControl {
    home: Option<Arc<dyn HomeAutomation>>,
}

impl ClimateControl {
    #[must_use]
    pub const fn new(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self { home }
    }
}

enum ClimateAction {
    SetTemperature(f64, String),
    SetMode(String),
    Off,
}

impl Handler for ClimateControl {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(home) = &self.home else {
            return Ok(HOME_UNAVAILABLE.to_string());
        };

        let device = params.text("device");
        if device.is_empty() {
            return Ok("Please specify which climate device you want to control".to_string());
        }

        let action = match params.action().as_str() {
            "set_temperature" => match params.number("temperature") {
                Some(t) => ClimateAction::SetTemperature(t, params.text("temperature")),
                None => return Ok("Please specify the temperature".to_string()),
            },
            "set_mode" => match params.text("mode").to_lowercase() {
                mode if mode.is_empty() => return Ok("Please specify the mode".to_string()),
                mode => ClimateAction::SetMode(mode),
            },
            "off" | "turn_off" => ClimateAction::Off,
            _ => return Ok("I'm not sure what to do with the climate devices".to_string()),
        };

        let entities = home.find_entities("climate", &device);
        if entities.is_empty() {
            return Ok(format!(
                "I couldn't find any climate devices matching '{device}'"
            ));
        }

        let (service, extra) = match &action {
            ClimateAction::SetTemperature(t, _) => ("set_temperature", json!({ "temperature": t })),
            ClimateAction::SetMode(mode) => ("set_hvac_mode", json!({ "hvac_mode": mode })),
            ClimateAction::Off => ("set_hvac_mode", json!({ "hvac_mode": "off" })),
        };
        let extra = extra.as_object().cloned().unwrap_or_default();

        let outcome = call_each(home.as_ref(), &entities, "climate", service, &extra);
        if !outcome.all_succeeded() {
            return Ok("I had trouble controlling the climate devices".to_string());
        }

        let names = join_names(&outcome.succeeded);
        Ok(match action {
            ClimateAction::SetTemperature(_, shown) => {
                format!("Set temperature to {shown} degrees for {names}")
            }
            ClimateAction::SetMode(mode) => format!("Set {names} to {mode} mode"),
            ClimateAction::Off => format!("Turned off {names}"),
        })
    }
}

/// Status report across lights, switches, climate and sensors
pub struct DeviceStatus {
    home: Option<Arc<dyn HomeAutomation>>,
}

impl DeviceStatus {
    const DOMAINS: [&'static str; 5] = ["light", "switch", "climate", "sensor", "binary_sensor"];

    #[must_use]
    pub const fn new(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self { home }
    }

    fn describe(home: &dyn HomeAutomation, entity: &Entity) -> String {
        let name = entity.friendly_name();
        let state = home
            .get_state(&entity.entity_id)
            .unwrap_or_else(|| entity.state.clone());
        let on_off = if state == "on" { "on" } else { "off" };

        match entity.domain() {
            "climate" if state == "off" => format!("{name} is off"),
            "climate" => {
                let attrs = home
                    .get_attributes(&entity.entity_id)
                    .unwrap_or_else(|| entity.attributes.clone());
                let current = attrs
                    .get("current_temperature")
                    .map_or_else(|| "unknown".to_string(), display_value);
                let target = attrs
                    .get("temperature")
                    .map_or_else(|| "unknown".to_string(), display_value);
                format!("{name} is {state}, current temperature: {current}°, target: {target}°")
            }
            "sensor" => {
                let unit = home
                    .get_attributes(&entity.entity_id)
                    .unwrap_or_else(|| entity.attributes.clone())
                    .get("unit_of_measurement")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                format!("{name}: {state}{unit}")
            }
            _ => format!("{name} is {on_off}"),
        }
    }
}

impl Handler for DeviceStatus {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(home) = &self.home else {
            return Ok(HOME_UNAVAILABLE.to_string());
        };

        let device = params.text("device");
        if device.is_empty() {
            return Ok("Please specify which device you want to check".to_string());
        }

        let lines: Vec<String> = Self::DOMAINS
            .iter()
            .flat_map(|domain| home.find_entities(domain, &device))
            .map(|entity| Self::describe(home.as_ref(), &entity))
            .collect();

        if lines.is_empty() {
            return Ok(format!("I couldn't find any devices matching '{device}'"));
        }
        Ok(lines.join("\n"))
    }
}

/// Power and input control of TVs exposed as `media_player.*` entities
pub struct TvControl {
    home: Option<Arc<dyn HomeAutomation>>,
}

impl TvControl {
    #[must_use]
    pub const fn new(home: Option<Arc<dyn HomeAutomation>>) -> Self {
        Self { home }
    }
}

impl Handler for TvControl {
    fn handle(&self, params: &Params) -> Result<String> {
        let Some(home) = &self.home else {
            return Ok(HOME_UNAVAILABLE.to_string());
        };

        let input = [params.text("input"), params.text("source")]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        let (service, extra) = match params.action().as_str() {
            "on" | "turn_on" => ("turn_on", Map::new()),
            "off" | "turn_off" => ("turn_off", Map::new()),
            "input" | "source" | "select_source" | "change_input" => {
                if input.is_empty() {
                    return Ok("Please specify which input to switch to".to_string());
                }
                let mut extra = Map::new();
                extra.insert("source".to_string(), json!(input));
                ("select_source", extra)
            }
            _ => return Ok("I'm not sure what to do with the TV".to_string()),
        };

        let device = params.text("device");
        let filter = if device.is_empty() { "tv" } else { device.as_str() };
        let entities = home.find_entities("media_player", filter);
        if entities.is_empty() {
            return Ok(format!("I couldn't find any TVs matching '{filter}'"));
        }

        let outcome = call_each(home.as_ref(), &entities, "media_player", service, &extra);
        if !outcome.all_succeeded() {
            return Ok("I had trouble controlling the TV".to_string());
        }

        let names = join_names(&outcome.succeeded);
        Ok(match service {
            "turn_on" => format!("Turned on {names}"),
            "turn_off" => format!("Turned off {names}"),
            _ => format!("Switched {names} to {input}"),
        })
    }
}
