pub mod engine;
pub mod voice;

use std::path::Path;

use crate::error::AppError;

pub use engine::SpeechEngine;
pub use voice::{Voice, VoiceConfig};

/// Fixed voice identity applied to every synthesis request.
const SPEAKER: &str = "Ana Florence";

struct LoadedModel {
    voice: Voice,
    engine: SpeechEngine,
}

/// Wraps a single synthesis model held for the process lifetime. Loading
/// happens once, synchronously, before the server accepts connections; there
/// is no lazy reload.
pub struct TtsService {
    model: Option<LoadedModel>,
}

impl TtsService {
    /// Load the model from disk, blocking until complete. A load failure
    /// leaves the service running unloaded: /health reports it and /tts
    /// answers 503.
    pub fn load(model_dir: &Path, model_id: &str) -> Self {
        match Self::try_load(model_dir, model_id) {
            Ok(model) => {
                tracing::info!("Model '{}' loaded", model_id);
                Self { model: Some(model) }
            }
            Err(e) => {
                tracing::warn!("Model '{}' unavailable: {}", model_id, e);
                Self { model: None }
            }
        }
    }

    fn try_load(model_dir: &Path, model_id: &str) -> Result<LoadedModel, AppError> {
        let voice = Voice::load(model_dir, model_id)?;
        let engine = SpeechEngine::new(&voice)?;
        Ok(LoadedModel { voice, engine })
    }

    pub fn unloaded() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Synthesize text in the given language and return a WAV byte buffer.
    pub fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AppError> {
        let model = self.model.as_ref().ok_or(AppError::ModelNotLoaded)?;

        let phonemes = engine::phonemize(text, language)?;
        let ids = engine::phonemes_to_ids(&phonemes, &model.voice.config.phoneme_id_map);
        let speaker_id = model.voice.speaker_id(SPEAKER)?;
        let samples = model.engine.synthesize(&ids, speaker_id)?;

        engine::samples_to_wav(&samples, model.voice.config.audio.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_service_reports_state() {
        let tts = TtsService::unloaded();
        assert!(!tts.is_loaded());
    }

    #[test]
    fn test_unloaded_service_refuses_synthesis() {
        let tts = TtsService::unloaded();
        assert!(matches!(
            tts.synthesize("hello", "en"),
            Err(AppError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_load_with_missing_model_starts_unloaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let tts = TtsService::load(dir.path(), "absent");
        assert!(!tts.is_loaded());
    }
}
