//! Speech output tests with fake synthesizer and speaker

use std::sync::{Arc, Mutex};

use herald::capabilities::{AudioOutput, SpeechAudio, SpeechSink, SpeechSynthesizer};
use herald::voice::{Voice, samples_to_wav, to_float, to_pcm16};
use herald::{Error, Result};

/// Synthesizes one sample per character, or fails on demand
struct CharSynthesizer {
    fail: bool,
    requests: Mutex<Vec<(String, String, String)>>,
}

impl CharSynthesizer {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl SpeechSynthesizer for CharSynthesizer {
    fn synthesize(&self, text: &str, voice: &str, language: &str) -> Result<SpeechAudio> {
        self.requests.lock().unwrap().push((
            text.to_string(),
            voice.to_string(),
            language.to_string(),
        ));
        if self.fail {
            return Err(Error::Tts("service unavailable".to_string()));
        }
        Ok(SpeechAudio {
            samples: vec![0.25; text.len()],
            sample_rate: 24_000,
        })
    }
}

#[derive(Default)]
struct CollectingOutput {
    played: Mutex<Vec<usize>>,
}

impl AudioOutput for CollectingOutput {
    fn play(&self, audio: &SpeechAudio) -> Result<()> {
        self.played.lock().unwrap().push(audio.samples.len());
        Ok(())
    }
}

fn voice(fail: bool) -> (Voice, Arc<CharSynthesizer>, Arc<CollectingOutput>) {
    let synthesizer = Arc::new(CharSynthesizer::new(fail));
    let output = Arc::new(CollectingOutput::default());
    let voice = Voice::new(
        Arc::clone(&synthesizer) as Arc<dyn SpeechSynthesizer>,
        Arc::clone(&output) as Arc<dyn AudioOutput>,
        "alloy",
        "en",
    );
    (voice, synthesizer, output)
}

#[test]
fn test_voice_synthesizes_and_plays() {
    let (voice, synthesizer, output) = voice(false);

    voice.speak("Yes?");

    assert_eq!(
        *synthesizer.requests.lock().unwrap(),
        vec![("Yes?".to_string(), "alloy".to_string(), "en".to_string())]
    );
    assert_eq!(*output.played.lock().unwrap(), vec![4]);
}

#[test]
fn test_voice_skips_blank_text() {
    let (voice, synthesizer, output) = voice(false);

    voice.speak("   ");

    assert!(synthesizer.requests.lock().unwrap().is_empty());
    assert!(output.played.lock().unwrap().is_empty());
}

#[test]
fn test_voice_swallows_synthesis_failure() {
    let (voice, synthesizer, output) = voice(true);

    voice.speak("Turned on Lamp");

    assert_eq!(synthesizer.requests.lock().unwrap().len(), 1);
    assert!(output.played.lock().unwrap().is_empty());
}

#[test]
fn test_wav_encoding_is_mono_pcm16() {
    let samples = to_float(&[0, 16_384, -16_384, 32_767]);
    assert_eq!(to_pcm16(1.0), 32_767);
    assert_eq!(to_pcm16(-2.0), -32_768);

    let wav = samples_to_wav(&samples, 16_000).unwrap();
    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    let spec = reader.spec();

    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 4);
}
