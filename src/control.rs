//! Control plane: wiring, coordinated start/stop and lifecycle directives
//!
//! The plane owns every long-lived subsystem (HTTP API, scheduler, voice
//! session) and the one [`IntentRouter`] they all share. Subsystems start in
//! order and stop in reverse; a failed start unwinds whatever already
//! started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::{ApiServer, ApiState};
use crate::capabilities::{
    AudioInput, HomeAssistantClient, HomeAssistantMedia, HomeAutomation, MediaPlayer,
    OllamaGenerator, SpeechRecognizer, SpeechSink, TextGenerator, WakeWordEngine,
};
use crate::command::{Command, CommandPipeline};
use crate::config::Config;
use crate::directive::Directive;
use crate::intent::{APOLOGY, IntentRouter};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::session::{AudioSession, CaptureSettings, SessionParts};
use crate::voice::{EnergyWakeWord, Microphone, Speaker, SpeechApiSynthesizer, Voice, WhisperRecognizer};
use crate::worker::Worker;
use crate::Result;

const SIGNAL_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// A long-lived front-end with its own worker thread
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start the worker; starting a running subsystem is a no-op
    ///
    /// # Errors
    ///
    /// Returns error if the subsystem cannot start
    fn start(&self) -> Result<()>;

    /// Stop the worker with a bounded wait
    ///
    /// Returns `false` if the worker had to be detached. Idempotent.
    fn stop(&self) -> bool;
}

/// Why the owning run loop should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Interrupt or terminate signal
    Signal,
    /// `SHUTDOWN` directive
    Shutdown,
    /// `RESTART` directive
    Restart,
}

/// Flags reported by the status endpoint
#[derive(Debug, Default)]
pub struct RuntimeStatus {
    running: AtomicBool,
    muted: AtomicBool,
    voice_enabled: AtomicBool,
}

impl RuntimeStatus {
    #[must_use]
    pub fn new(voice_enabled: bool) -> Self {
        Self {
            voice_enabled: AtomicBool::new(voice_enabled),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    #[must_use]
    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::SeqCst)
    }
}

/// Speech sink that intercepts directives and honors mute
///
/// Sentinel replies are applied here and never reach the inner sink.
pub struct DirectiveGate {
    inner: Option<Arc<dyn SpeechSink>>,
    status: Arc<RuntimeStatus>,
    exit: mpsc::Sender<ExitReason>,
}

impl DirectiveGate {
    #[must_use]
    pub fn new(
        inner: Option<Arc<dyn SpeechSink>>,
        status: Arc<RuntimeStatus>,
        exit: mpsc::Sender<ExitReason>,
    ) -> Self {
        Self {
            inner,
            status,
            exit,
        }
    }

    fn apply(&self, directive: Directive) {
        tracing::info!(directive = %directive, "lifecycle directive");
        let reason = match directive {
            Directive::Shutdown => ExitReason::Shutdown,
            Directive::Restart => ExitReason::Restart,
            Directive::Mute => {
                self.status.set_muted(true);
                return;
            }
            Directive::Unmute => {
                self.status.set_muted(false);
                return;
            }
        };
        if self.exit.send(reason).is_err() {
            tracing::warn!(?reason, "nobody is waiting for the exit request");
        }
    }
}

impl SpeechSink for DirectiveGate {
    fn speak(&self, text: &str) {
        if let Some(directive) = Directive::parse(text) {
            self.apply(directive);
            return;
        }
        if Directive::is_sentinel(text) {
            tracing::warn!(reply = text.trim(), "unknown lifecycle directive dropped");
            return;
        }
        if self.status.is_muted() {
            tracing::debug!("muted, not speaking");
            return;
        }
        if let Some(inner) = &self.inner {
            inner.speak(text);
        }
    }
}

/// The pipeline shared by the API and the scheduler
///
/// Replies are spoken through the router's sink. A directive reply is
/// returned to the caller as its acknowledgment; an unrecognized one as
/// [`APOLOGY`].
pub struct RouterPipeline {
    router: Arc<IntentRouter>,
}

impl RouterPipeline {
    #[must_use]
    pub const fn new(router: Arc<IntentRouter>) -> Self {
        Self { router }
    }
}

impl CommandPipeline for RouterPipeline {
    fn process_command(&self, command: Command) -> String {
        tracing::debug!(id = %command.id(), origin = %command.origin(), "command received");
        let reply = self.router.process(command.text());
        match Directive::parse(&reply) {
            Some(directive) => directive.acknowledgment().to_string(),
            None if Directive::is_sentinel(&reply) => APOLOGY.to_string(),
            None => reply,
        }
    }
}

/// Adapters needed to listen for voice commands
pub struct VoiceInput {
    pub input: Arc<dyn AudioInput>,
    pub wake: Box<dyn WakeWordEngine>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
}

/// Capability adapters built once at startup
pub struct ServiceRegistry {
    pub generator: Arc<dyn TextGenerator>,
    pub home: Option<Arc<dyn HomeAutomation>>,
    pub media: Option<Arc<dyn MediaPlayer>>,
    /// Spoken output; replies are only logged when absent
    pub speech: Option<Arc<dyn SpeechSink>>,
    /// Present when the voice front-end is enabled
    pub voice: Option<VoiceInput>,
}

impl ServiceRegistry {
    /// Construct every adapter the configuration asks for
    ///
    /// The text generator is mandatory, as are the speech adapters when voice
    /// is enabled. Home Assistant is optional and only logged when
    /// unreachable.
    ///
    /// # Errors
    ///
    /// Returns error if a mandatory adapter cannot be constructed
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = OllamaGenerator::new(&config.llm)?;
        if !generator.is_available() {
            tracing::warn!(host = %config.llm.host, "text generator not reachable, commands will fall back to general queries");
        }

        let home: Option<Arc<dyn HomeAutomation>> =
            match HomeAssistantClient::from_config(&config.home_assistant) {
                Ok(Some(client)) => {
                    if let Err(e) = client.check_connection() {
                        tracing::warn!(error = %e, "Home Assistant not reachable");
                    }
                    Some(Arc::new(client))
                }
                Ok(None) => {
                    tracing::info!("Home Assistant not configured");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Home Assistant unavailable");
                    None
                }
            };

        let media = home.as_ref().map(|home| {
            Arc::new(HomeAssistantMedia::new(
                Arc::clone(home),
                config.media.player_entity.clone(),
            )) as Arc<dyn MediaPlayer>
        });

        let (speech, voice) = if config.voice_enabled {
            let recognizer: Arc<dyn SpeechRecognizer> =
                Arc::new(WhisperRecognizer::new(&config.stt, config.audio.sample_rate)?);
            let synthesizer = Arc::new(SpeechApiSynthesizer::new(&config.tts)?);
            let speaker = Arc::new(Speaker::new(config.audio.output_device.clone()));
            let speech: Arc<dyn SpeechSink> = Arc::new(Voice::new(
                synthesizer,
                speaker,
                config.tts.voice.clone(),
                config.tts.language.clone(),
            ));

            let wake = EnergyWakeWord::new(
                Arc::clone(&recognizer),
                &config.wake_word,
                &config.stt.language,
                config.audio.sample_rate,
            );
            let voice = VoiceInput {
                input: Arc::new(Microphone::new(config.audio.input_device.clone())),
                wake: Box::new(wake),
                recognizer,
            };
            (Some(speech), Some(voice))
        } else {
            (None, None)
        };

        Ok(Self {
            generator: Arc::new(generator),
            home,
            media,
            speech,
            voice,
        })
    }
}

/// Everything built by [`ControlPlane::initialize`]
struct Assembly {
    pipeline: Arc<RouterPipeline>,
    session: Option<Arc<AudioSession>>,
    scheduler: Option<SchedulerHandle>,
    subsystems: Vec<Arc<dyn Subsystem>>,
}

/// Owns the subsystems and their shared pipeline
pub struct ControlPlane {
    config: Config,
    status: Arc<RuntimeStatus>,
    exit_tx: mpsc::Sender<ExitReason>,
    exit_rx: Mutex<mpsc::Receiver<ExitReason>>,
    assembly: Mutex<Option<Arc<Assembly>>>,
    install_signals: bool,
    started: Mutex<Vec<Arc<dyn Subsystem>>>,
    signals: Mutex<Option<Worker>>,
    stopping: AtomicBool,
}

impl ControlPlane {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (exit_tx, exit_rx) = mpsc::channel();
        Self {
            status: Arc::new(RuntimeStatus::new(config.voice_enabled)),
            config,
            exit_tx,
            exit_rx: Mutex::new(exit_rx),
            assembly: Mutex::new(None),
            install_signals: true,
            started: Mutex::new(Vec::new()),
            signals: Mutex::new(None),
            stopping: AtomicBool::new(false),
        }
    }

    /// A plane wired from prebuilt adapters
    #[must_use]
    pub fn with_registry(config: Config, registry: ServiceRegistry) -> Self {
        let mut plane = Self::new(config);
        plane.assemble(registry);
        plane
    }

    /// A plane over arbitrary subsystems, started in the given order
    #[must_use]
    pub fn from_parts(
        config: Config,
        pipeline: Arc<RouterPipeline>,
        subsystems: Vec<Arc<dyn Subsystem>>,
    ) -> Self {
        let mut plane = Self::new(config);
        plane.install_signals = false;
        plane.assembly = Mutex::new(Some(Arc::new(Assembly {
            pipeline,
            session: None,
            scheduler: None,
            subsystems,
        })));
        plane
    }

    /// Leave process signals to the caller
    #[must_use]
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }

    /// Build the adapters, router and subsystems
    ///
    /// Returns `false` if a mandatory adapter cannot be constructed.
    pub fn initialize(&mut self) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            tracing::warn!("control plane already stopped");
            return false;
        }
        let assembled = self
            .assembly
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if assembled {
            return true;
        }

        match ServiceRegistry::from_config(&self.config) {
            Ok(registry) => {
                self.assemble(registry);
                tracing::info!("control plane initialized");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to initialize services");
                false
            }
        }
    }

    fn assemble(&mut self, registry: ServiceRegistry) {
        let ServiceRegistry {
            generator,
            home,
            media,
            speech,
            voice,
        } = registry;

        let gate: Arc<dyn SpeechSink> = Arc::new(DirectiveGate::new(
            speech,
            Arc::clone(&self.status),
            self.exit_tx.clone(),
        ));

        let router = Arc::new(
            IntentRouter::new(generator, home, media)
                .with_sampling(self.config.llm.temperature, self.config.llm.max_tokens)
                .with_sink(Arc::clone(&gate)),
        );
        let pipeline = Arc::new(RouterPipeline::new(Arc::clone(&router)));

        let mut subsystems: Vec<Arc<dyn Subsystem>> = Vec::new();

        let scheduler = self.config.scheduler.enabled.then(|| {
            Scheduler::from_config(
                &self.config.scheduler,
                Arc::clone(&pipeline) as Arc<dyn CommandPipeline>,
            )
        });
        let scheduler_handle = scheduler.as_ref().map(|s| s.handle().clone());

        if self.config.api.enabled {
            let state = ApiState {
                pipeline: Arc::clone(&pipeline) as Arc<dyn CommandPipeline>,
                scheduler: scheduler_handle.clone(),
                status: Arc::clone(&self.status),
            };
            subsystems.push(Arc::new(ApiServer::new(&self.config.api, state)));
        }
        if let Some(scheduler) = scheduler {
            subsystems.push(Arc::new(scheduler));
        }

        let session = voice.map(|voice| {
            let router = Arc::clone(&router);
            Arc::new(AudioSession::new(SessionParts {
                input: voice.input,
                wake: voice.wake,
                recognizer: voice.recognizer,
                speech: Arc::clone(&gate),
                capture: CaptureSettings::from_config(&self.config.audio),
                language: self.config.stt.language.clone(),
                on_command: Arc::new(move |command: Command| router.route(command.text())),
            }))
        });
        if let Some(session) = &session {
            subsystems.push(Arc::clone(session) as Arc<dyn Subsystem>);
        }
        self.status.voice_enabled.store(session.is_some(), Ordering::SeqCst);

        let assembly = Arc::new(Assembly {
            pipeline,
            session,
            scheduler: scheduler_handle,
            subsystems,
        });
        *self.assembly.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(assembly);
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn status(&self) -> &Arc<RuntimeStatus> {
        &self.status
    }

    /// The wiring, until [`ControlPlane::stop`] releases it
    fn assembly(&self) -> Option<Arc<Assembly>> {
        self.assembly
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The voice session, when voice is enabled and the plane not yet stopped
    #[must_use]
    pub fn session(&self) -> Option<Arc<AudioSession>> {
        self.assembly().and_then(|a| a.session.clone())
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<SchedulerHandle> {
        self.assembly().and_then(|a| a.scheduler.clone())
    }

    /// Start every subsystem, the voice session last
    ///
    /// All or nothing: on failure everything already started is stopped
    /// and `false` is returned. Starting a running plane is a no-op.
    pub fn start(&self) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            tracing::warn!("control plane already stopped");
            return false;
        }
        let Some(assembly) = self.assembly() else {
            tracing::error!("control plane not initialized");
            return false;
        };

        let failure = {
            let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
            if self.status.is_running() {
                return true;
            }

            if self.install_signals {
                self.install_signal_handlers();
            }

            let mut failure = None;
            for subsystem in &assembly.subsystems {
                match subsystem.start() {
                    Ok(()) => started.push(Arc::clone(subsystem)),
                    Err(e) => {
                        failure = Some((subsystem.name(), e));
                        break;
                    }
                }
            }
            if failure.is_none() {
                if self.stopping.load(Ordering::SeqCst) {
                    tracing::warn!("stop requested during start");
                    return false;
                }
                self.status.set_running(true);
            }
            failure
        };

        match failure {
            None => {
                tracing::info!("control plane started");
                true
            }
            Some((name, e)) => {
                tracing::error!(subsystem = name, error = %e, "subsystem failed to start, unwinding");
                self.stop();
                false
            }
        }
    }

    /// Stop all subsystems in reverse start order, then release them
    ///
    /// Only the first call tears down; later or concurrent calls return
    /// immediately. Commands submitted afterwards get [`APOLOGY`]. Returns
    /// `false` if any worker had to be detached.
    pub fn stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            tracing::debug!("control plane already stopping");
            return true;
        }

        tracing::info!("stopping control plane");

        // Waits out an in-flight start, which sees `stopping` and backs off
        let started = {
            let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
            self.status.set_running(false);
            std::mem::take(&mut *started)
        };
        let mut clean = true;
        for subsystem in started.iter().rev() {
            if !subsystem.stop() {
                tracing::warn!(subsystem = subsystem.name(), "subsystem did not stop cleanly");
                clean = false;
            }
        }

        if let Some(mut worker) = self.signals.lock().unwrap_or_else(PoisonError::into_inner).take() {
            clean &= worker.stop(SIGNAL_STOP_TIMEOUT);
        }

        if self
            .assembly
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            tracing::debug!("released subsystems and adapters");
        }

        tracing::info!(clean, "control plane stopped");
        clean
    }

    /// Run `text` through the shared pipeline; never empty
    #[must_use]
    pub fn process_command(&self, text: &str) -> String {
        self.submit(Command::api(text))
    }

    /// Run `command` through the shared pipeline; never empty
    #[must_use]
    pub fn submit(&self, command: Command) -> String {
        match self.assembly() {
            Some(assembly) => assembly.pipeline.process_command(command),
            None => {
                tracing::warn!("command received while not initialized or stopped");
                APOLOGY.to_string()
            }
        }
    }

    /// Block until a signal or lifecycle directive asks the run loop to return
    #[must_use]
    pub fn wait(&self) -> ExitReason {
        let exit = self.exit_rx.lock().unwrap_or_else(PoisonError::into_inner);
        // The plane holds a sender, so the channel never disconnects
        exit.recv().unwrap_or(ExitReason::Signal)
    }

    /// Like [`ControlPlane::wait`] with a deadline
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitReason> {
        self.exit_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_timeout(timeout)
            .ok()
    }

    fn install_signal_handlers(&self) {
        let exit = self.exit_tx.clone();
        match Worker::spawn("signals", CancellationToken::new(), move |cancel| {
            watch_signals(&exit, &cancel);
        }) {
            Ok(worker) => {
                *self.signals.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
            }
            Err(e) => tracing::warn!(error = %e, "failed to install signal handlers"),
        }
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_signals(exit: &mpsc::Sender<ExitReason>, cancel: &CancellationToken) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "signal runtime unavailable");
            return;
        }
    };

    let received = runtime.block_on(async {
        tokio::select! {
            () = cancel.cancelled() => false,
            result = tokio::signal::ctrl_c() => result.is_ok(),
            () = terminate() => true,
        }
    });

    if received {
        tracing::info!("shutdown signal received");
        let _ = exit.send(ExitReason::Signal);
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
