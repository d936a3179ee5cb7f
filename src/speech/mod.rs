//! Speech capability boundaries
//!
//! Text-to-speech and speech-to-text are external collaborators treated as
//! pure functions over bytes and text. The session engine only depends on the
//! traits; the null implementations let everything run without an audio stack.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("speech backend unavailable")]
    Unavailable,

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// audio -> text
pub trait SpeechRecognizer: Send + Sync {
    fn transcribe(&self, audio: &[u8]) -> Result<String, SpeechError>;
}

/// text -> audio
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// No-op speech backend used when no audio stack is wired in
pub struct NullSpeech;

impl SpeechRecognizer for NullSpeech {
    fn transcribe(&self, _audio: &[u8]) -> Result<String, SpeechError> {
        Err(SpeechError::Unavailable)
    }
}

impl SpeechSynthesizer for NullSpeech {
    fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
        Err(SpeechError::Unavailable)
    }
}
