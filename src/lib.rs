//! Herald - voice-driven command orchestrator for the home
//!
//! Listens for a wake word, transcribes the spoken command, classifies it
//! into an intent with a local text generator, runs the matching action and
//! speaks the reply. The same pipeline also serves text commands from an
//! HTTP API and cron-scheduled jobs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front-ends                        │
//! │   AudioSession   │   HTTP API   │   Scheduler        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ process_command
//! ┌────────────────────▼────────────────────────────────┐
//! │                  IntentRouter                        │
//! │   parse  │  HandlerTable  │  dispatch  │  speak      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Capabilities                         │
//! │   Ollama  │  Home Assistant  │  STT/TTS  │  Audio    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`ControlPlane`] wires the three front-ends to one router and owns their
//! start/stop lifecycle.

pub mod api;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod control;
pub mod directive;
pub mod error;
pub mod intent;
pub mod scheduler;
pub mod session;
pub mod voice;
pub mod worker;

pub use command::{Command, CommandPipeline, Origin};
pub use config::{Config, Overrides};
pub use control::{ControlPlane, ExitReason, RouterPipeline, ServiceRegistry, Subsystem};
pub use directive::Directive;
pub use error::{Error, Result};
pub use intent::{APOLOGY, Intent, IntentRouter, Params, ParsedIntent};
pub use scheduler::{JobInfo, Scheduler, SchedulerHandle};
pub use session::{AudioSession, CaptureSettings, SessionState};
pub use worker::Worker;
