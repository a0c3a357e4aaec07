use std::collections::HashMap;
use std::io::Cursor;
use std::process::Command;
use std::sync::Mutex;

use hound::{SampleFormat, WavSpec, WavWriter};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::AppError;
use crate::tts::voice::Voice;

/// VITS-style ONNX inference session for one voice model. The session is
/// behind a mutex; ort sessions are not safe to run concurrently.
pub struct SpeechEngine {
    session: Mutex<Session>,
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

impl SpeechEngine {
    pub fn new(voice: &Voice) -> Result<Self, AppError> {
        let session = Session::builder()
            .map_err(|e| AppError::SynthesisError(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::SynthesisError(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::SynthesisError(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&voice.model_path)
            .map_err(|e| AppError::SynthesisError(format!("Failed to load model: {}", e)))?;

        let inference = voice.config.inference.clone().unwrap_or_default();

        Ok(Self {
            session: Mutex::new(session),
            noise_scale: inference.noise_scale,
            length_scale: inference.length_scale,
            noise_w: inference.noise_w,
        })
    }

    /// Run inference over a phoneme-id sequence, optionally conditioned on a
    /// speaker id for multi-speaker models. Returns raw f32 samples.
    pub fn synthesize(
        &self,
        phoneme_ids: &[i64],
        speaker_id: Option<i64>,
    ) -> Result<Vec<f32>, AppError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [batch, sequence]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| AppError::SynthesisError(format!("Failed to create input tensor: {}", e)))?;

        // input_lengths: [batch]
        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| AppError::SynthesisError(format!("Failed to create lengths tensor: {}", e)))?;

        // scales: [noise_scale, length_scale, noise_w]
        let scales_value = Value::from_array((
            vec![3],
            vec![self.noise_scale, self.length_scale, self.noise_w],
        ))
        .map_err(|e| AppError::SynthesisError(format!("Failed to create scales tensor: {}", e)))?;

        let mut session = self.session.lock().unwrap();
        let outputs = match speaker_id {
            Some(sid) => {
                let sid_value = Value::from_array((vec![1], vec![sid])).map_err(|e| {
                    AppError::SynthesisError(format!("Failed to create speaker tensor: {}", e))
                })?;
                session.run(ort::inputs![input_value, lengths_value, scales_value, sid_value])
            }
            None => session.run(ort::inputs![input_value, lengths_value, scales_value]),
        }
        .map_err(|e| AppError::SynthesisError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::SynthesisError("Missing output tensor".to_string()))?;

        let output_view = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::SynthesisError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_view.1.iter().copied().collect())
    }
}

/// Convert text to IPA phonemes using espeak-ng, with the requested language
/// selecting the espeak voice.
pub fn phonemize(text: &str, language: &str) -> Result<String, AppError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let output = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", language, text])
        .output()
        .map_err(|e| {
            AppError::SynthesisError(format!("Failed to run espeak-ng (is it installed?): {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::SynthesisError(format!(
            "espeak-ng failed for language '{}': {}",
            language, stderr
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Map phonemes to model input ids through the voice's phoneme map, with
/// BOS/EOS markers and inter-phoneme padding where the map defines them.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let mut ids = Vec::new();

    if let Some(bos) = id_map.get("^") {
        ids.extend(bos);
    } else {
        ids.push(0);
    }

    for ch in phonemes.chars() {
        if let Some(mapped) = id_map.get(&ch.to_string()) {
            ids.extend(mapped);
        }
        if let Some(pad) = id_map.get("_") {
            ids.extend(pad);
        }
    }

    if let Some(eos) = id_map.get("$") {
        ids.extend(eos);
    } else {
        ids.push(0);
    }

    ids
}

/// Encode f32 samples as a 16-bit mono WAV held entirely in memory.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec)
            .map_err(|e| AppError::SynthesisError(format!("Failed to create WAV writer: {}", e)))?;

        for sample in samples {
            let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| AppError::SynthesisError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::SynthesisError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer)
}
