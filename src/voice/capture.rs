//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::capabilities::{AudioInput, FrameSource};
use crate::{Error, Result};

/// How long a frame read waits before re-checking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cap on buffered samples (about ten seconds at 16 kHz)
const MAX_BUFFERED: usize = 160_000;

/// Opens input streams on the default or a named device
pub struct Microphone {
    device_name: Option<String>,
}

impl Microphone {
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl AudioInput for Microphone {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn FrameSource>> {
        let stream = MicrophoneStream::open(self.device_name.as_deref(), sample_rate)?;
        Ok(Box::new(stream))
    }
}

#[derive(Default)]
struct SharedBuffer {
    samples: Mutex<VecDeque<i16>>,
    ready: Condvar,
    failed: AtomicBool,
}

/// A live input stream delivering PCM16 frames
///
/// The stream is closed when this value is dropped.
pub struct MicrophoneStream {
    shared: Arc<SharedBuffer>,
    sample_rate: u32,
    _stream: Stream,
}

impl MicrophoneStream {
    /// Open and start capturing at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no suitable device or config exists
    pub fn open(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let device = input_device(device_name)?;
        let config = input_config(&device, sample_rate)?;
        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio capture initialized"
        );

        let shared = Arc::new(SharedBuffer::default());
        let writer = Arc::clone(&shared);
        let error_flag = Arc::clone(&shared);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut buf = writer
                        .samples
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    for frame in data.chunks(channels) {
                        #[allow(clippy::cast_precision_loss)]
                        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                        buf.push_back(to_pcm16(mono));
                    }
                    let overflow = buf.len().saturating_sub(MAX_BUFFERED);
                    buf.drain(..overflow);
                    drop(buf);
                    writer.ready.notify_all();
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    error_flag.failed.store(true, Ordering::SeqCst);
                    error_flag.ready.notify_all();
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");

        Ok(Self {
            shared,
            sample_rate,
            _stream: stream,
        })
    }
}

impl FrameSource for MicrophoneStream {
    fn read_frame(&mut self, len: usize, cancel: &CancellationToken) -> Result<Option<Vec<i16>>> {
        let mut buf = self
            .shared
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while buf.len() < len {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if self.shared.failed.load(Ordering::SeqCst) {
                return Err(Error::Audio("input stream failed".to_string()));
            }
            buf = self
                .shared
                .ready
                .wait_timeout(buf, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(buf.drain(..len).collect()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn discard_pending(&mut self) {
        self.shared
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        tracing::debug!("audio capture stopped");
    }
}

fn input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("input device '{name}' not found"))),
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string())),
    }
}

fn input_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32 && supports(c))
        .collect();

    // Prefer mono; otherwise downmix in the callback
    configs
        .iter()
        .find(|c| c.channels() == 1)
        .or_else(|| configs.first())
        .map(|c| c.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))
}

/// Convert one f32 sample in `[-1.0, 1.0]` to PCM16
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn to_pcm16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert PCM16 samples to f32 in `[-1.0, 1.0]`
#[must_use]
pub fn to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

/// Names of available input and output devices
///
/// # Errors
///
/// Returns error if the audio host cannot enumerate devices
pub fn list_devices() -> Result<(Vec<String>, Vec<String>)> {
    let host = cpal::default_host();
    let inputs = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok((inputs, outputs))
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
