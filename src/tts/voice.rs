use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: i64,
    #[serde(default)]
    pub speaker_id_map: HashMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_num_speakers() -> i64 {
    1
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

/// A voice model on disk: the ONNX weights plus their JSON sidecar config.
#[derive(Debug)]
pub struct Voice {
    pub id: String,
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    pub fn load(model_dir: &Path, model_id: &str) -> Result<Self, AppError> {
        let model_path = model_dir.join(format!("{}.onnx", model_id));
        let config_path = model_dir.join(format!("{}.onnx.json", model_id));

        if !model_path.exists() {
            return Err(AppError::SynthesisError(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        if !config_path.exists() {
            return Err(AppError::SynthesisError(format!(
                "Model config not found: {}",
                config_path.display()
            )));
        }

        let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)
            .map_err(|e| AppError::SynthesisError(format!("Invalid model config: {}", e)))?;

        Ok(Self {
            id: model_id.to_string(),
            config,
            model_path,
        })
    }

    /// Resolve a named speaker to the model's speaker id. Single-speaker
    /// models take no speaker input at all.
    pub fn speaker_id(&self, name: &str) -> Result<Option<i64>, AppError> {
        if self.config.num_speakers <= 1 {
            return Ok(None);
        }

        self.config
            .speaker_id_map
            .get(name)
            .copied()
            .map(Some)
            .ok_or_else(|| {
                AppError::SynthesisError(format!("Speaker '{}' not found in model '{}'", name, self.id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_speaker_config() -> VoiceConfig {
        serde_json::from_str(
            r#"{
                "audio": {"sample_rate": 22050},
                "num_speakers": 2,
                "speaker_id_map": {"Ana Florence": 0, "Other": 1}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_speaker_id_single_speaker_is_none() {
        let config: VoiceConfig =
            serde_json::from_str(r#"{"audio": {"sample_rate": 22050}}"#).unwrap();
        let voice = Voice {
            id: "test".to_string(),
            config,
            model_path: PathBuf::new(),
        };
        assert_eq!(voice.speaker_id("Ana Florence").unwrap(), None);
    }

    #[test]
    fn test_speaker_id_multi_speaker_lookup() {
        let voice = Voice {
            id: "test".to_string(),
            config: multi_speaker_config(),
            model_path: PathBuf::new(),
        };
        assert_eq!(voice.speaker_id("Ana Florence").unwrap(), Some(0));
        assert!(voice.speaker_id("Nobody").is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Voice::load(dir.path(), "missing").is_err());
    }
}
