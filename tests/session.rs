//! Voice session and recorder tests over scripted audio

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use herald::capabilities::{AudioInput, SpeechRecognizer, SpeechSink};
use herald::session::{
    AudioSession, CaptureSettings, NO_INPUT_REPLY, SessionParts, SessionState,
    WAKE_ACKNOWLEDGMENT, record,
};
use herald::{Command, Origin};

mod common;
use common::{FixedRecognizer, MarkerWake, RecordingSink, ScriptedInput, WAKE_MARKER, frame};

const LOUD: i16 = 20_000;

/// Four-sample frames at 16 Hz: two silent frames end a recording, eight cap it
fn settings() -> CaptureSettings {
    CaptureSettings {
        frame_size: 4,
        sample_rate: 16,
        silence_threshold: 0.03,
        silence_duration: 0.5,
        max_duration: 2.0,
    }
}

struct Harness {
    session: AudioSession,
    input: Arc<ScriptedInput>,
    sink: Arc<RecordingSink>,
    recognizer: Arc<FixedRecognizer>,
    frames_seen: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Command>>>,
}

fn harness(input: ScriptedInput, transcript: &str) -> Harness {
    harness_with_delay(input, transcript, Duration::ZERO)
}

/// Like [`harness`], with a command handler that takes `delay` to answer
fn harness_with_delay(input: ScriptedInput, transcript: &str, delay: Duration) -> Harness {
    let input = Arc::new(input);
    let sink = Arc::new(RecordingSink::default());
    let recognizer = Arc::new(FixedRecognizer::new(transcript));
    let (wake, frames_seen) = MarkerWake::new();
    let commands = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&commands);
    let session = AudioSession::new(SessionParts {
        input: Arc::clone(&input) as Arc<dyn AudioInput>,
        wake: Box::new(wake),
        recognizer: Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>,
        speech: Arc::clone(&sink) as Arc<dyn SpeechSink>,
        capture: settings(),
        language: "en".to_string(),
        on_command: Arc::new(move |command: Command| {
            std::thread::sleep(delay);
            let reply = format!("Done: {}", command.text());
            seen.lock().unwrap().push(command);
            reply
        }),
    });

    Harness {
        session,
        input,
        sink,
        recognizer,
        frames_seen,
        commands,
    }
}

fn wait_for_state(session: &AudioSession, state: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.state() != state {
        assert!(Instant::now() < deadline, "session stuck in {}", session.state());
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_empty_transcript_speaks_no_input_reply() {
    let h = harness(
        ScriptedInput::new(vec![
            frame(0, 4),
            frame(WAKE_MARKER, 4),
            frame(0, 4),
            frame(0, 4),
        ]),
        "",
    );

    assert_eq!(h.session.state(), SessionState::Idle);
    h.session.start().unwrap();
    wait_for_state(&h.session, SessionState::Stopped);

    assert_eq!(
        h.sink.spoken(),
        vec![WAKE_ACKNOWLEDGMENT.to_string(), NO_INPUT_REPLY.to_string()]
    );
    assert!(h.commands.lock().unwrap().is_empty());
    assert_eq!(h.frames_seen.load(Ordering::SeqCst), 2);
    assert_eq!(h.recognizer.calls(), 1);
    assert!(h.session.stop());
}

#[test]
fn test_full_cycle_dispatches_and_speaks_reply() {
    let h = harness(
        ScriptedInput::new(vec![
            frame(WAKE_MARKER, 4),
            frame(LOUD, 4),
            frame(LOUD, 4),
            frame(0, 4),
            frame(0, 4),
        ]),
        "  turn on the lights ",
    );

    h.session.start().unwrap();
    wait_for_state(&h.session, SessionState::Stopped);

    assert_eq!(
        h.sink.spoken(),
        vec![
            WAKE_ACKNOWLEDGMENT.to_string(),
            "Done: turn on the lights".to_string()
        ]
    );
    let commands = h.commands.lock().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].origin(), Origin::Voice);
    assert_eq!(h.input.opened(), 1);
}

#[test]
fn test_listen_once_with_no_audio_skips_recognizer() {
    let h = harness(ScriptedInput::new(Vec::new()), "should not be used");

    assert_eq!(h.session.listen_once().unwrap(), "");
    assert_eq!(h.recognizer.calls(), 0);
    assert_eq!(h.input.opened(), 1);
}

#[test]
fn test_listen_once_transcribes_recording() {
    let h = harness(
        ScriptedInput::new(vec![frame(LOUD, 4), frame(0, 4), frame(0, 4)]),
        "what time is it",
    );

    assert_eq!(h.session.listen_once().unwrap(), "what time is it");
    assert_eq!(h.recognizer.calls(), 1);
}

#[test]
fn test_stop_interrupts_idle_listening() {
    let h = harness(ScriptedInput::new(Vec::new()).held_open(), "");

    h.session.start().unwrap();
    // Starting twice is a no-op
    h.session.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.session.state(), SessionState::Armed);

    assert!(h.session.stop());
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert!(h.session.stop());
    assert!(h.session.start().is_err());
    assert_eq!(h.input.opened(), 1);
}

#[test]
fn test_timed_out_stop_stays_stopped_and_drops_reply() {
    let h = harness_with_delay(
        ScriptedInput::new(vec![
            frame(WAKE_MARKER, 4),
            frame(LOUD, 4),
            frame(LOUD, 4),
            frame(0, 4),
            frame(0, 4),
        ])
        .held_open(),
        "turn on the lights",
        Duration::from_millis(1500),
    );

    h.session.start().unwrap();
    wait_for_state(&h.session, SessionState::Dispatching);

    // The handler outlives the bounded join, so the thread is detached
    assert!(!h.session.stop());
    assert_eq!(h.session.state(), SessionState::Stopped);

    std::thread::sleep(Duration::from_millis(1000));
    assert_eq!(h.commands.lock().unwrap().len(), 1);
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert_eq!(h.sink.spoken(), vec![WAKE_ACKNOWLEDGMENT.to_string()]);
}

/// Default capture: 1024-sample frames at 16 kHz, one second of silence
fn default_capture() -> CaptureSettings {
    CaptureSettings {
        frame_size: 1024,
        sample_rate: 16_000,
        silence_threshold: 0.03,
        silence_duration: 1.0,
        max_duration: 10.0,
    }
}

#[test]
fn test_fifteen_silent_frames_do_not_end_default_capture() {
    let mut frames = vec![frame(LOUD, 1024)];
    frames.extend(std::iter::repeat_n(frame(0, 1024), 15));
    let input = ScriptedInput::new(frames);
    let mut source = input.open(16_000).unwrap();

    let outcome = record(source.as_mut(), &default_capture(), &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert!(!outcome.silence_triggered);
    assert_eq!(outcome.samples.len(), 16 * 1024);
}

#[test]
fn test_sixteenth_silent_frame_ends_default_capture() {
    let mut frames = vec![frame(LOUD, 1024)];
    frames.extend(std::iter::repeat_n(frame(0, 1024), 16));
    frames.push(frame(LOUD, 1024));
    let input = ScriptedInput::new(frames);
    let mut source = input.open(16_000).unwrap();

    let outcome = record(source.as_mut(), &default_capture(), &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert!(outcome.silence_triggered);
    assert_eq!(outcome.samples.len(), 17 * 1024);
}

#[test]
fn test_recording_ends_on_trailing_silence() {
    let input = ScriptedInput::new(vec![
        frame(LOUD, 4),
        frame(0, 4),
        frame(LOUD, 4),
        frame(0, 4),
        frame(0, 4),
    ]);
    let mut source = input.open(16).unwrap();

    let outcome = record(source.as_mut(), &settings(), &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert!(outcome.silence_triggered);
    assert_eq!(outcome.samples.len(), 20);
}

#[test]
fn test_recording_stops_at_duration_cap() {
    let input = ScriptedInput::new(vec![frame(LOUD, 4); 12]);
    let mut source = input.open(16).unwrap();

    let outcome = record(source.as_mut(), &settings(), &CancellationToken::new())
        .unwrap()
        .unwrap();
    assert!(!outcome.silence_triggered);
    assert_eq!(outcome.samples.len(), 8 * 4);
}

#[test]
fn test_recording_returns_none_when_cancelled() {
    let input = ScriptedInput::new(vec![frame(LOUD, 4)]);
    let mut source = input.open(16).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(record(source.as_mut(), &settings(), &cancel).unwrap().is_none());
}
