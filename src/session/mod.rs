//! Voice session: wake word, recording, transcription and reply
//!
//! The session owns the microphone while running. A single worker thread
//! moves through the states below and returns to `Armed` after every
//! command:
//!
//! ```text
//! Idle -> Armed -> Capturing -> Transcribing -> Dispatching -> Speaking -> Armed
//!           \______________________________________________________/
//!                               cancel -> Stopped
//! ```

mod recorder;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use recorder::{CaptureOutcome, CaptureSettings, SilenceDetector, frame_loudness, record};

use crate::capabilities::{AudioInput, FrameSource, SpeechRecognizer, SpeechSink, WakeWordEngine};
use crate::command::Command;
use crate::control::Subsystem;
use crate::worker::Worker;
use crate::{Error, Result};

/// Spoken after the wake word fires
pub const WAKE_ACKNOWLEDGMENT: &str = "Yes?";

/// Spoken when a recording transcribes to nothing
pub const NO_INPUT_REPLY: &str = "I didn't hear anything";

/// How long `stop` waits for the session thread
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Turns a transcribed voice command into a reply
pub type CommandHandler = Arc<dyn Fn(Command) -> String + Send + Sync>;

/// Where the session loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Capturing,
    Transcribing,
    Dispatching,
    Speaking,
    Stopped,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Dispatching => "dispatching",
            Self::Speaking => "speaking",
            Self::Stopped => "stopped",
        }
    }

    const fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a session needs, wired by the caller
pub struct SessionParts {
    pub input: Arc<dyn AudioInput>,
    pub wake: Box<dyn WakeWordEngine>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub speech: Arc<dyn SpeechSink>,
    pub capture: CaptureSettings,
    pub language: String,
    pub on_command: CommandHandler,
}

/// State shared between the session handle and its thread
struct Shared {
    input: Arc<dyn AudioInput>,
    recognizer: Arc<dyn SpeechRecognizer>,
    speech: Arc<dyn SpeechSink>,
    capture: CaptureSettings,
    language: String,
    on_command: CommandHandler,
    state: Mutex<SessionState>,
}

impl Shared {
    /// Move to `next`; once `Stopped`, the session stays there
    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Stopped && next != SessionState::Stopped {
            tracing::trace!(to = %next, "session already stopped");
            return;
        }
        if *state != next {
            tracing::trace!(from = %*state, to = %next, "session state");
            *state = next;
        }
    }

    /// Transcribe captured samples; failures and empty captures yield `""`
    fn transcribe(&self, samples: &[f32]) -> String {
        if samples.is_empty() {
            return String::new();
        }
        match self.recognizer.transcribe(samples, &self.language) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                String::new()
            }
        }
    }
}

/// Wake-word driven listening loop on a dedicated thread
pub struct AudioSession {
    shared: Arc<Shared>,
    wake: Mutex<Option<Box<dyn WakeWordEngine>>>,
    worker: Mutex<Option<Worker>>,
}

impl AudioSession {
    #[must_use]
    pub fn new(parts: SessionParts) -> Self {
        let SessionParts {
            input,
            wake,
            recognizer,
            speech,
            capture,
            language,
            on_command,
        } = parts;

        if wake.sample_rate() != capture.sample_rate {
            tracing::warn!(
                wake_rate = wake.sample_rate(),
                capture_rate = capture.sample_rate,
                "wake word and capture sample rates differ, using the wake word rate"
            );
        }

        Self {
            shared: Arc::new(Shared {
                input,
                recognizer,
                speech,
                capture,
                language,
                on_command,
                state: Mutex::new(SessionState::Idle),
            }),
            wake: Mutex::new(Some(wake)),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start listening for the wake word
    ///
    /// Calling this while the session is running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the session was stopped or its thread cannot start
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() && self.state().is_running() {
            return Ok(());
        }

        let Some(wake) = self
            .wake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(Error::Audio("audio session already stopped".to_string()));
        };

        let shared = Arc::clone(&self.shared);
        shared.set_state(SessionState::Armed);
        let spawned = Worker::spawn("audio-session", CancellationToken::new(), move |cancel| {
            run(&shared, wake, &cancel);
        });

        match spawned {
            Ok(w) => {
                *worker = Some(w);
                tracing::info!("audio session started");
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop the loop, waiting a bounded time for the thread
    ///
    /// Returns `false` if the thread had to be detached. Idempotent.
    pub fn stop(&self) -> bool {
        let joined = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .is_none_or(|w| w.stop(STOP_TIMEOUT));

        self.wake.lock().unwrap_or_else(PoisonError::into_inner).take();
        if self.state() != SessionState::Stopped {
            self.shared.set_state(SessionState::Stopped);
            tracing::info!("audio session stopped");
        }
        joined
    }

    /// Record one command and transcribe it, without the wake word
    ///
    /// Must not be called while the session loop owns the microphone.
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be opened or fails
    pub fn listen_once(&self) -> Result<String> {
        let mut source = self.shared.input.open(self.shared.capture.sample_rate)?;
        let cancel = CancellationToken::new();
        let outcome = record(source.as_mut(), &self.shared.capture, &cancel)?.unwrap_or_default();
        drop(source);
        Ok(self.shared.transcribe(&outcome.samples))
    }
}

impl Subsystem for AudioSession {
    fn name(&self) -> &'static str {
        "audio-session"
    }

    fn start(&self) -> Result<()> {
        Self::start(self)
    }

    fn stop(&self) -> bool {
        Self::stop(self)
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            worker.cancel_token().cancel();
        }
    }
}

/// Block until the engine reports a keyword; `None` on cancel or end of stream
fn wait_for_wake(
    source: &mut dyn FrameSource,
    wake: &mut dyn WakeWordEngine,
    cancel: &CancellationToken,
) -> Result<Option<i32>> {
    let frame_length = wake.frame_length();
    while let Some(frame) = source.read_frame(frame_length, cancel)? {
        let index = wake.process(&frame);
        if index >= 0 {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn run(shared: &Shared, mut wake: Box<dyn WakeWordEngine>, cancel: &CancellationToken) {
    let mut source = match shared.input.open(wake.sample_rate()) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "failed to open audio input");
            shared.set_state(SessionState::Stopped);
            return;
        }
    };

    if let Err(e) = listen(shared, source.as_mut(), wake.as_mut(), cancel) {
        tracing::error!(error = %e, "audio session failed");
    }

    drop(source);
    shared.set_state(SessionState::Stopped);
}

fn listen(
    shared: &Shared,
    source: &mut dyn FrameSource,
    wake: &mut dyn WakeWordEngine,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        shared.set_state(SessionState::Armed);
        let Some(keyword) = wait_for_wake(source, wake, cancel)? else {
            return Ok(());
        };
        tracing::info!(keyword, "wake word detected");

        shared.speech.speak(WAKE_ACKNOWLEDGMENT);
        source.discard_pending();

        shared.set_state(SessionState::Capturing);
        let Some(outcome) = record(source, &shared.capture, cancel)? else {
            return Ok(());
        };

        shared.set_state(SessionState::Transcribing);
        let transcript = shared.transcribe(&outcome.samples);
        if cancel.is_cancelled() {
            return Ok(());
        }
        if transcript.is_empty() {
            shared.speech.speak(NO_INPUT_REPLY);
            source.discard_pending();
            continue;
        }
        tracing::info!(transcript = %transcript, "heard command");

        shared.set_state(SessionState::Dispatching);
        let reply = (shared.on_command)(Command::voice(transcript));
        if cancel.is_cancelled() {
            tracing::debug!("session stopped while dispatching, reply dropped");
            return Ok(());
        }

        shared.set_state(SessionState::Speaking);
        shared.speech.speak(&reply);
        source.discard_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Armed.to_string(), "armed");
        assert!(SessionState::Speaking.is_running());
        assert!(!SessionState::Stopped.is_running());
        assert!(!SessionState::Idle.is_running());
    }

    #[test]
    fn test_stopped_is_terminal() {
        let shared = Shared {
            input: Arc::new(NoInput),
            recognizer: Arc::new(NoRecognizer),
            speech: Arc::new(Silent),
            capture: CaptureSettings {
                frame_size: 4,
                sample_rate: 16,
                silence_threshold: 0.03,
                silence_duration: 0.5,
                max_duration: 2.0,
            },
            language: "en".to_string(),
            on_command: Arc::new(|_: Command| String::new()),
            state: Mutex::new(SessionState::Dispatching),
        };

        shared.set_state(SessionState::Stopped);
        shared.set_state(SessionState::Speaking);
        shared.set_state(SessionState::Armed);
        assert_eq!(*shared.state.lock().unwrap(), SessionState::Stopped);
    }

    struct NoInput;

    impl AudioInput for NoInput {
        fn open(&self, _sample_rate: u32) -> Result<Box<dyn FrameSource>> {
            Err(Error::Audio("no device".to_string()))
        }
    }

    struct NoRecognizer;

    impl SpeechRecognizer for NoRecognizer {
        fn transcribe(&self, _samples: &[f32], _language: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct Silent;

    impl SpeechSink for Silent {
        fn speak(&self, _text: &str) {}
    }
}
