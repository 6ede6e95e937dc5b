use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use herald::capabilities::{AudioInput, AudioOutput, SpeechSynthesizer};
use herald::session::frame_loudness;
use herald::voice::{Microphone, Speaker, SpeechApiSynthesizer, list_devices, sine_tone};
use herald::{Config, ControlPlane, ExitReason, Overrides};

/// Herald - voice-driven command orchestrator
#[derive(Parser)]
#[command(name = "herald", version, about)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the HTTP API
    #[arg(long)]
    port: Option<u16>,

    /// Disable voice features (for headless servers without audio hardware)
    #[arg(long, env = "HERALD_DISABLE_VOICE")]
    disable_voice: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the assistant (default)
    Run,
    /// Process one text command and print the reply
    Command {
        /// Command text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Record one spoken command and print the transcript
    Listen,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List audio devices
    Devices,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,herald=info",
        1 => "info,herald=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let path = cli.config.as_deref();
    let overrides = Overrides {
        port: cli.port,
        disable_voice: cli.disable_voice,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => serve(path, &overrides),
        Command::Command { text } => {
            let headless = Overrides {
                disable_voice: true,
                ..overrides
            };
            one_shot(Config::load_with_options(path, &headless)?, &text.join(" "))
        }
        Command::Listen => listen(Config::load_with_options(path, &overrides)?),
        Command::TestMic { duration } => {
            test_mic(&Config::load_with_options(path, &overrides)?, duration)
        }
        Command::TestSpeaker => test_speaker(&Config::load_with_options(path, &overrides)?),
        Command::TestTts { text } => {
            test_tts(&Config::load_with_options(path, &overrides)?, &text)
        }
        Command::Devices => devices(),
    }
}

/// Run until a signal or `SHUTDOWN`; `RESTART` rebuilds the plane
fn serve(path: Option<&std::path::Path>, overrides: &Overrides) -> anyhow::Result<ExitCode> {
    loop {
        let config = Config::load_with_options(path, overrides)?;
        tracing::info!(
            voice = config.voice_enabled,
            api = config.api.enabled,
            port = config.api.port,
            model = %config.llm.model,
            "starting herald"
        );

        let mut plane = ControlPlane::new(config);
        if !plane.initialize() {
            tracing::error!("initialization failed");
            return Ok(ExitCode::FAILURE);
        }
        if !plane.start() {
            tracing::error!("startup failed");
            return Ok(ExitCode::FAILURE);
        }

        let reason = plane.wait();
        tracing::info!(?reason, "exit requested");
        if !plane.stop() {
            tracing::warn!("some workers did not stop in time");
        }
        drop(plane);

        if reason != ExitReason::Restart {
            return Ok(ExitCode::SUCCESS);
        }
        tracing::info!("restarting");
    }
}

fn one_shot(config: Config, text: &str) -> anyhow::Result<ExitCode> {
    let mut plane = ControlPlane::new(config).without_signal_handlers();
    if !plane.initialize() {
        return Ok(ExitCode::FAILURE);
    }
    println!("{}", plane.process_command(text));
    Ok(ExitCode::SUCCESS)
}

fn listen(config: Config) -> anyhow::Result<ExitCode> {
    let mut plane = ControlPlane::new(config).without_signal_handlers();
    if !plane.initialize() {
        return Ok(ExitCode::FAILURE);
    }
    let session = plane
        .session()
        .context("voice is disabled; remove --disable-voice")?;

    println!("Listening... speak a command, then pause.");
    let transcript = session.listen_once()?;
    if transcript.is_empty() {
        println!("(nothing heard)");
    } else {
        println!("{transcript}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn test_mic(config: &Config, duration: u64) -> anyhow::Result<ExitCode> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let sample_rate = config.audio.sample_rate;
    let microphone = Microphone::new(config.audio.input_device.clone());
    let mut source = microphone.open(sample_rate)?;
    let cancel = CancellationToken::new();

    println!("Sample rate: {sample_rate} Hz");
    println!("Silence threshold: {:.4}", config.audio.silence_threshold);
    println!("---");

    for i in 0..duration {
        let Some(samples) = source.read_frame(sample_rate as usize, &cancel)? else {
            break;
        };
        let energy = calculate_rms(&samples);
        let loudness = frame_loudness(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let marker = if loudness < config.audio.silence_threshold {
            "silent"
        } else {
            "speech"
        };

        println!(
            "[{:2}s] RMS: {energy:.4} | Loudness: {loudness:.4} ({marker}) | [{meter}]",
            i + 1
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, run `herald devices` and set audio.input_device.");

    Ok(ExitCode::SUCCESS)
}

/// Test speaker output with a sine wave
fn test_speaker(config: &Config) -> anyhow::Result<ExitCode> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let speaker = Speaker::new(config.audio.output_device.clone());
    speaker.play(&sine_tone(440.0, 2.0, 24_000))?;

    println!("Playback complete.");
    Ok(ExitCode::SUCCESS)
}

fn test_tts(config: &Config, text: &str) -> anyhow::Result<ExitCode> {
    println!("Synthesizing: {text}");

    let synthesizer = SpeechApiSynthesizer::new(&config.tts)?;
    let audio = synthesizer.synthesize(text, &config.tts.voice, &config.tts.language)?;
    println!(
        "Got {} samples at {} Hz, playing...",
        audio.samples.len(),
        audio.sample_rate
    );

    let speaker = Speaker::new(config.audio.output_device.clone());
    speaker.play(&audio)?;

    println!("Done.");
    Ok(ExitCode::SUCCESS)
}

fn devices() -> anyhow::Result<ExitCode> {
    let (inputs, outputs) = list_devices()?;

    println!("Input devices:");
    for name in &inputs {
        println!("  {name}");
    }
    println!("\nOutput devices:");
    for name in &outputs {
        println!("  {name}");
    }
    Ok(ExitCode::SUCCESS)
}
