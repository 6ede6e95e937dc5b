//! Command recording with trailing-silence detection

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::capabilities::FrameSource;
use crate::config::AudioConfig;
use crate::voice::to_float;

/// Parameters of one recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Samples per frame
    pub frame_size: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Normalized mean amplitude under which a frame is silent
    pub silence_threshold: f32,
    /// Seconds of trailing silence that end the recording
    pub silence_duration: f32,
    /// Hard cap on recording length in seconds
    pub max_duration: f32,
}

impl CaptureSettings {
    #[must_use]
    pub const fn from_config(config: &AudioConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            sample_rate: config.sample_rate,
            silence_threshold: config.silence_threshold,
            silence_duration: config.silence_duration,
            max_duration: config.max_record_secs,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn frames_per_second(&self) -> f64 {
        f64::from(self.sample_rate) / self.frame_size.max(1) as f64
    }

    /// Consecutive silent frames that end a recording, rounded up
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silent_frames_required(&self) -> usize {
        let frames = f64::from(self.silence_duration) * self.frames_per_second();
        (frames.ceil() as usize).max(1)
    }

    /// Frames recorded before the duration cap stops the recording, rounded down
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_frames(&self) -> usize {
        let frames = f64::from(self.max_duration) * self.frames_per_second();
        (frames.floor() as usize).max(1)
    }
}

/// Mean absolute amplitude of a PCM16 frame, normalized to `[0, 1]`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frame_loudness(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let total: f64 = frame.iter().map(|&s| f64::from(s).abs()).sum();
    #[allow(clippy::cast_possible_truncation)]
    let mean = (total / frame.len() as f64) as f32;
    mean / 32768.0
}

/// Counts consecutive quiet frames
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    required: usize,
    run: usize,
}

impl SilenceDetector {
    #[must_use]
    pub const fn new(threshold: f32, required: usize) -> Self {
        Self {
            threshold,
            required,
            run: 0,
        }
    }

    /// Feed one frame; `true` once the silent run reaches the required length
    pub fn observe(&mut self, frame: &[i16]) -> bool {
        if frame_loudness(frame) < self.threshold {
            self.run += 1;
        } else {
            self.run = 0;
        }
        self.run >= self.required
    }

    #[must_use]
    pub const fn run(&self) -> usize {
        self.run
    }
}

/// Samples captured for one command and why recording stopped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutcome {
    /// Normalized samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// `true` if trailing silence ended the recording, `false` if the cap did
    pub silence_triggered: bool,
}

/// Record from `source` until trailing silence or the duration cap
///
/// Returns `None` if `cancel` fired. An exhausted source ends the recording
/// with whatever was captured.
///
/// # Errors
///
/// Returns error if the source fails
pub fn record(
    source: &mut dyn FrameSource,
    settings: &CaptureSettings,
    cancel: &CancellationToken,
) -> Result<Option<CaptureOutcome>> {
    let max_frames = settings.max_frames();
    let mut detector =
        SilenceDetector::new(settings.silence_threshold, settings.silent_frames_required());
    let mut outcome = CaptureOutcome::default();

    tracing::debug!(
        max_frames,
        silent_frames = settings.silent_frames_required(),
        "started recording"
    );

    for _ in 0..max_frames {
        let Some(frame) = source.read_frame(settings.frame_size, cancel)? else {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            break;
        };

        outcome.samples.extend(to_float(&frame));

        if detector.observe(&frame) {
            tracing::debug!(samples = outcome.samples.len(), "silence detected, stopping recording");
            outcome.silence_triggered = true;
            break;
        }
    }

    Ok(Some(outcome))
}
