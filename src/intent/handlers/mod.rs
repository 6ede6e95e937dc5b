//! Intent handlers
//!
//! Each handler validates its own parameters and answers with text. Missing
//! integrations and missing parameters are normal replies, not errors.

pub mod home;
pub mod info;
pub mod media;
pub mod system;

use serde_json::Value;

use super::Params;
use crate::Result;

/// Reply when no home automation integration is configured
pub const HOME_UNAVAILABLE: &str = "Home Assistant integration is not available";

/// Reply when no media player is configured
pub const MEDIA_UNAVAILABLE: &str = "Media controller is not available";

/// Turns parameters into a reply
///
/// Implementations are shared across threads and invoked concurrently.
pub trait Handler: Send + Sync {
    /// # Errors
    ///
    /// Returns error only for unexpected internal failures; the router
    /// replaces it with a fixed apology.
    fn handle(&self, params: &Params) -> Result<String>;
}

/// Join names as "A", "A and B", or "A, B and C"
#[must_use]
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}

/// Render a JSON scalar the way a person would say it
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}
