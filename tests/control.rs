//! Control plane lifecycle tests

use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use herald::capabilities::{GenerationRequest, SpeechSink, TextGenerator};
use herald::config::file::JobFileConfig;
use herald::{
    APOLOGY, Config, ControlPlane, ExitReason, IntentRouter, Result, RouterPipeline,
    ServiceRegistry, Subsystem,
};

mod common;
use common::{FakeSubsystem, RecordingSink, ScriptedGenerator};

/// Classifies by keyword so one generator can drive several commands
struct KeywordGenerator;

impl TextGenerator for KeywordGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let prompt = request.prompt.to_lowercase();
        let (intent, action) = if prompt.contains("unmute") {
            ("system_control", "unmute")
        } else if prompt.contains("mute") {
            ("system_control", "mute")
        } else if prompt.contains("shut down") {
            ("system_control", "shutdown")
        } else if prompt.contains("restart") {
            ("system_control", "restart")
        } else {
            ("time", "get_time")
        };
        Ok(format!(
            r#"{{"intent":"{intent}","parameters":{{"action":"{action}"}}}}"#
        ))
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn headless_config() -> Config {
    let mut config = Config {
        voice_enabled: false,
        ..Config::default()
    };
    config.api.enabled = false;
    config.scheduler.enabled = false;
    config
}

fn registry(generator: Arc<dyn TextGenerator>, sink: &Arc<RecordingSink>) -> ServiceRegistry {
    ServiceRegistry {
        generator,
        home: None,
        media: None,
        speech: Some(Arc::clone(sink) as Arc<dyn SpeechSink>),
        voice: None,
    }
}

fn pipeline() -> Arc<RouterPipeline> {
    let router = IntentRouter::new(Arc::new(ScriptedGenerator::unavailable()), None, None);
    Arc::new(RouterPipeline::new(Arc::new(router)))
}

fn plane_with(subsystems: Vec<FakeSubsystem>) -> ControlPlane {
    let subsystems = subsystems
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn Subsystem>)
        .collect();
    ControlPlane::from_parts(headless_config(), pipeline(), subsystems)
}

fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Subsystem whose start blocks until the test releases it
struct GatedSubsystem {
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Subsystem for GatedSubsystem {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn start(&self) -> Result<()> {
        self.log.lock().unwrap().push("start gated".to_string());
        self.entered.send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        Ok(())
    }

    fn stop(&self) -> bool {
        self.log.lock().unwrap().push("stop gated".to_string());
        true
    }
}

#[test]
fn test_failed_start_unwinds_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let plane = plane_with(vec![
        FakeSubsystem::new("a", &log),
        FakeSubsystem::failing("b", &log),
        FakeSubsystem::new("c", &log),
    ]);

    assert!(!plane.start());
    assert_eq!(entries(&log), ["start a", "start b", "stop a"]);
    assert!(!plane.status().is_running());

    // Already torn down; nothing stops twice
    assert!(plane.stop());
    drop(plane);
    assert_eq!(entries(&log).len(), 3);
}

#[test]
fn test_stop_runs_in_reverse_order_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let plane = plane_with(vec![
        FakeSubsystem::new("a", &log),
        FakeSubsystem::new("b", &log),
        FakeSubsystem::new("c", &log),
    ]);

    assert!(plane.start());
    assert!(plane.status().is_running());
    // Starting a running plane is a no-op
    assert!(plane.start());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| plane.stop());
        }
    });

    assert_eq!(
        entries(&log),
        ["start a", "start b", "start c", "stop c", "stop b", "stop a"]
    );
    assert!(!plane.status().is_running());
    assert!(!plane.start());
}

#[test]
fn test_stop_during_start_leaves_plane_stopped() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gated = GatedSubsystem {
        entered: entered_tx,
        release: Mutex::new(release_rx),
        log: Arc::clone(&log),
    };
    let plane = ControlPlane::from_parts(
        headless_config(),
        pipeline(),
        vec![Arc::new(gated) as Arc<dyn Subsystem>],
    );

    std::thread::scope(|scope| {
        let starting = scope.spawn(|| plane.start());
        entered_rx.recv().unwrap();

        let stopping = scope.spawn(|| plane.stop());
        // Give stop time to claim the teardown before start finishes
        std::thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert!(!starting.join().unwrap());
        assert!(stopping.join().unwrap());
    });

    assert!(!plane.status().is_running());
    assert_eq!(entries(&log), ["start gated", "stop gated"]);
}

#[test]
fn test_stop_releases_subsystems() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let subsystem = Arc::new(FakeSubsystem::new("a", &log));
    let plane = ControlPlane::from_parts(
        headless_config(),
        pipeline(),
        vec![Arc::clone(&subsystem) as Arc<dyn Subsystem>],
    );

    assert!(plane.start());
    assert!(Arc::strong_count(&subsystem) > 1);
    assert_ne!(plane.process_command("what time is it"), APOLOGY);

    assert!(plane.stop());
    assert_eq!(Arc::strong_count(&subsystem), 1);
    assert_eq!(plane.process_command("what time is it"), APOLOGY);
    assert!(plane.scheduler().is_none());
}

#[test]
fn test_shutdown_directive_is_acknowledged_not_spoken() {
    let sink = Arc::new(RecordingSink::default());
    let plane = ControlPlane::with_registry(
        headless_config(),
        registry(Arc::new(KeywordGenerator), &sink),
    )
    .without_signal_handlers();

    assert_eq!(plane.process_command("shut down"), "Shutting down");
    assert!(sink.spoken().is_empty());
    assert_eq!(
        plane.wait_timeout(Duration::from_millis(500)),
        Some(ExitReason::Shutdown)
    );
}

#[test]
fn test_restart_directive_reaches_run_loop() {
    let sink = Arc::new(RecordingSink::default());
    let plane = ControlPlane::with_registry(
        headless_config(),
        registry(Arc::new(KeywordGenerator), &sink),
    )
    .without_signal_handlers();

    assert_eq!(plane.process_command("restart yourself"), "Restarting");
    assert_eq!(plane.wait(), ExitReason::Restart);
    assert_eq!(plane.wait_timeout(Duration::from_millis(20)), None);
}

#[test]
fn test_mute_suppresses_speech() {
    let sink = Arc::new(RecordingSink::default());
    let plane = ControlPlane::with_registry(
        headless_config(),
        registry(Arc::new(KeywordGenerator), &sink),
    )
    .without_signal_handlers();

    assert_eq!(plane.process_command("mute"), "Muted");
    assert!(plane.status().is_muted());

    let reply = plane.process_command("what time is it");
    assert!(reply.starts_with("The current time is "));
    assert!(sink.spoken().is_empty());

    assert_eq!(plane.process_command("unmute"), "Unmuted");
    assert!(!plane.status().is_muted());

    let reply = plane.process_command("what time is it");
    assert_eq!(sink.spoken(), vec![reply]);
    assert_eq!(plane.wait_timeout(Duration::from_millis(20)), None);
}

#[test]
fn test_unknown_directive_is_never_spoken() {
    let sink = Arc::new(RecordingSink::default());
    let generator = ScriptedGenerator::classifying(r#"{"intent":"general_query","parameters":{}}"#)
        .answering("SYSTEM_COMMAND:REBOOT");
    let plane = ControlPlane::with_registry(headless_config(), registry(Arc::new(generator), &sink))
        .without_signal_handlers();

    assert_eq!(plane.process_command("reboot the house"), APOLOGY);
    assert!(sink.spoken().is_empty());
    assert!(!plane.status().is_muted());
    assert_eq!(plane.wait_timeout(Duration::from_millis(20)), None);
}

#[test]
fn test_scheduled_job_runs_through_pipeline() {
    let mut config = headless_config();
    config.scheduler.enabled = true;
    config.scheduler.tick_ms = 10;
    config.scheduler.jobs = vec![
        JobFileConfig {
            command: "what time is it".to_string(),
            cron: "* * * * * *".to_string(),
        },
        JobFileConfig {
            command: "broken".to_string(),
            cron: "not a schedule".to_string(),
        },
    ];

    let sink = Arc::new(RecordingSink::default());
    let plane = ControlPlane::with_registry(config, registry(Arc::new(KeywordGenerator), &sink))
        .without_signal_handlers();

    let scheduler = plane.scheduler().unwrap();
    let jobs = scheduler.list();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].command, "what time is it");

    assert!(plane.start());
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.spoken().is_empty() {
        assert!(Instant::now() < deadline, "scheduled job never ran");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(plane.stop());

    assert!(sink.spoken()[0].starts_with("The current time is "));
    assert!(scheduler.list()[0].run_count >= 1);
}

#[test]
fn test_commands_without_initialization_get_apology() {
    let plane = ControlPlane::new(headless_config()).without_signal_handlers();
    assert_eq!(plane.process_command("turn on the lights"), APOLOGY);
    assert!(plane.session().is_none());
    assert!(plane.scheduler().is_none());
}
