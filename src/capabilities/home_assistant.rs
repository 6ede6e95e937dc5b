//! Home Assistant REST client
//!
//! Entity snapshots are cached after the first `/api/states` fetch. Reads are
//! served from the cache and may be stale; a successful service call
//! re-fetches every entity it targeted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use url::Url;

use super::{Entity, HomeAutomation};
use crate::config::HomeAssistantConfig;
use crate::{Error, Result};

/// Blocking Home Assistant client with an entity cache
pub struct HomeAssistantClient {
    client: reqwest::blocking::Client,
    base: Url,
    token: SecretString,
    cache: RwLock<HashMap<String, Entity>>,
}

impl HomeAssistantClient {
    /// Create a client for `url` authenticated with a long-lived token
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built
    pub fn new(url: &str, token: SecretString) -> Result<Self> {
        let mut base = Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid Home Assistant URL '{url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
            base,
            token,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Build from configuration; `None` when no URL is configured
    ///
    /// # Errors
    ///
    /// Returns error if the URL is set but invalid
    pub fn from_config(config: &HomeAssistantConfig) -> Result<Option<Self>> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let token = config.token.as_ref().map_or("", ExposeSecret::expose_secret);
        Self::new(url, SecretString::new(token.into())).map(Some)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Integration(format!("invalid endpoint '{path}': {e}")))
    }

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(self.endpoint(path)?)
            .bearer_auth(self.token.expose_secret())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Integration(format!(
                "Home Assistant GET {path} failed: {status} - {body}"
            )));
        }
        Ok(response)
    }

    /// Probe `/api/` and warm the entity cache
    ///
    /// # Errors
    ///
    /// Returns error if Home Assistant is unreachable or rejects the token
    pub fn check_connection(&self) -> Result<()> {
        self.get("api/")?;
        let count = self.refresh()?;
        tracing::info!(entities = count, "home assistant connected");
        Ok(())
    }

    /// Replace the cache with a fresh `/api/states` snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub fn refresh(&self) -> Result<usize> {
        let entities: Vec<Entity> = self.get("api/states")?.json()?;
        let count = entities.len();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = entities
            .into_iter()
            .map(|e| (e.entity_id.clone(), e))
            .collect();

        tracing::debug!(entities = count, "entity cache refreshed");
        Ok(count)
    }

    /// Fetch one entity and update its cache entry
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub fn fetch_entity(&self, entity_id: &str) -> Result<Entity> {
        let entity: Entity = self.get(&format!("api/states/{entity_id}"))?.json()?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_id.to_string(), entity.clone());
        Ok(entity)
    }

    fn entity(&self, entity_id: &str) -> Option<Entity> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned();

        cached.or_else(|| match self.fetch_entity(entity_id) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "failed to fetch entity");
                None
            }
        })
    }

    fn ensure_loaded(&self) {
        let empty = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if empty && let Err(e) = self.refresh() {
            tracing::warn!(error = %e, "failed to load entities");
        }
    }
}

impl HomeAutomation for HomeAssistantClient {
    fn find_entities(&self, domain: &str, filter: &str) -> Vec<Entity> {
        self.ensure_loaded();

        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<Entity> = cache
            .values()
            .filter(|e| e.matches(domain, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        found
    }

    fn get_state(&self, entity_id: &str) -> Option<String> {
        self.entity(entity_id).map(|e| e.state)
    }

    fn get_attributes(&self, entity_id: &str) -> Option<Map<String, Value>> {
        self.entity(entity_id).map(|e| e.attributes)
    }

    fn call_service(&self, domain: &str, service: &str, payload: Value) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("api/services/{domain}/{service}"))?)
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Integration(format!(
                "service {domain}.{service} failed: {status} - {body}"
            )));
        }

        tracing::debug!(domain, service, "service called");

        for entity_id in targeted_entities(&payload) {
            if let Err(e) = self.fetch_entity(&entity_id) {
                tracing::warn!(entity_id, error = %e, "failed to refresh entity after service call");
            }
        }
        Ok(())
    }
}

/// `entity_id` values named in a service payload, string or list
fn targeted_entities(payload: &Value) -> Vec<String> {
    match payload.get("entity_id") {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_targeted_entities() {
        assert_eq!(
            targeted_entities(&json!({"entity_id": "light.lamp"})),
            vec!["light.lamp"]
        );
        assert_eq!(
            targeted_entities(&json!({"entity_id": ["a.b", "c.d"]})),
            vec!["a.b", "c.d"]
        );
        assert!(targeted_entities(&json!({"brightness_pct": 50})).is_empty());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client =
            HomeAssistantClient::new("http://hass.local:8123/ha", SecretString::new("t".into()))
                .unwrap();
        assert_eq!(
            client.endpoint("api/states").unwrap().as_str(),
            "http://hass.local:8123/ha/api/states"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = HomeAssistantClient::new("::nope", SecretString::new("t".into()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
