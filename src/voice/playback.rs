//! Audio playback to speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::capabilities::{AudioOutput, SpeechAudio};
use crate::{Error, Result};

/// Plays audio on the default or a named output device
///
/// A stream is built per call so the device is only held while speaking.
pub struct Speaker {
    device_name: Option<String>,
}

impl Speaker {
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match self.device_name.as_deref() {
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| Error::Audio(format!("output device '{name}' not found"))),
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string())),
        }
    }
}

fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let find = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    find(1)
        // Fallback: try stereo
        .or_else(|| find(2))
        .map(|c| c.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))
}

impl AudioOutput for Speaker {
    fn play(&self, audio: &SpeechAudio) -> Result<()> {
        if audio.is_empty() {
            return Ok(());
        }

        let device = self.device()?;
        let config = output_config(&device, audio.sample_rate)?;
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = Arc::from(audio.samples.as_slice());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Wait for playback to finish, bounded by the clip length
        let duration_ms = (samples.len() as u64 * 1000) / u64::from(audio.sample_rate.max(1));
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        while !finished.load(Ordering::Acquire) && start.elapsed() < timeout {
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");
        Ok(())
    }
}

/// A sine tone for speaker checks
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn sine_tone(frequency: f32, seconds: f32, sample_rate: u32) -> SpeechAudio {
    let count = (seconds * sample_rate as f32) as usize;
    let samples = (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (t * frequency * std::f32::consts::TAU).sin() * 0.3
        })
        .collect();
    SpeechAudio {
        samples,
        sample_rate,
    }
}
