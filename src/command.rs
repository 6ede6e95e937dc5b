//! Commands entering the pipeline
//!
//! Voice, HTTP and scheduler front-ends all produce a [`Command`] and hand it
//! to the same [`CommandPipeline`].

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Where a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Transcribed from the microphone after a wake word
    Voice,
    /// Submitted through the HTTP API
    Api,
    /// Fired by a scheduled job
    Schedule,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voice => write!(f, "voice"),
            Self::Api => write!(f, "api"),
            Self::Schedule => write!(f, "schedule"),
        }
    }
}

/// Raw command text plus its origin
///
/// Created once when text becomes available and consumed once by the router.
#[derive(Debug, Clone)]
pub struct Command {
    id: Uuid,
    text: String,
    origin: Origin,
    received_at: DateTime<Utc>,
}

impl Command {
    /// Create a command with the given origin
    #[must_use]
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            origin,
            received_at: Utc::now(),
        }
    }

    /// Command transcribed from speech
    #[must_use]
    pub fn voice(text: impl Into<String>) -> Self {
        Self::new(text, Origin::Voice)
    }

    /// Command submitted over HTTP
    #[must_use]
    pub fn api(text: impl Into<String>) -> Self {
        Self::new(text, Origin::Api)
    }

    /// Command fired by the scheduler
    #[must_use]
    pub fn schedule(text: impl Into<String>) -> Self {
        Self::new(text, Origin::Schedule)
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// The single entry point shared by every front-end
///
/// Implementations never panic outward and always return non-empty text.
pub trait CommandPipeline: Send + Sync {
    /// Run a command through parse, dispatch and reply delivery
    fn process_command(&self, command: Command) -> String;
}
