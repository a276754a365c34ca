//! ONNX model runner (spec §4.7 "Synthesizer" capability, concrete ONNX
//! backend). The three model inputs are:
//!
//! | Name        | Shape         | dtype   |
//! |-------------|---------------|---------|
//! | `input_ids` | `[1, seq_len]`| int64   |
//! | `style`     | `[1, style_d]`| float32 |
//! | `speed`     | `[1]`         | float32 |

use std::{collections::HashMap, path::Path, sync::Mutex};

use anyhow::{Context, Result};
use ort::{session::Session, value::Tensor};

use crate::{npz::{load_npz, NpyArray}, tokenize::ipa_to_ids};

/// Samples trimmed from the tail of every generated waveform.
const TAIL_TRIM: usize = 5_000;

/// Audio sample rate produced by the model.
pub const SAMPLE_RATE: u32 = 24_000;

struct Voice {
    nrows: usize,
    ncols: usize,
    data: Vec<f32>, // flat, row-major
}

impl Voice {
    fn from_npy(arr: NpyArray) -> Self {
        Self { nrows: arr.nrows(), ncols: arr.ncols(), data: arr.data }
    }

    /// Row at `text_len`, clamped to valid range.
    fn style_row(&self, text_len: usize) -> &[f32] {
        let i = text_len.min(self.nrows.saturating_sub(1));
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }
}

/// A single loaded ONNX checkpoint plus its voice embeddings. One instance
/// is pooled per `model_id` by `synth::OnnxSynthesizer` (spec §5: ORT
/// sessions are not thread-safe, guarded here by a `Mutex`).
pub struct KittenTtsOnnx {
    session: Mutex<Session>,
    voices: HashMap<String, Voice>,
    speed_priors: HashMap<String, f32>,
    voice_aliases: HashMap<String, String>,
    pub available_voices: Vec<String>,
}

impl KittenTtsOnnx {
    /// Load the model from an ONNX file and a voices NPZ file.
    pub fn load(
        model_path: &Path,
        voices_path: &Path,
        speed_priors: HashMap<String, f32>,
        voice_aliases: HashMap<String, String>,
    ) -> Result<Self> {
        let session = Session::builder()
            .context("Failed to create ORT session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("Cannot load ONNX model: {}", model_path.display()))?;

        let raw = load_npz(voices_path)
            .with_context(|| format!("Cannot load voices: {}", voices_path.display()))?;

        let available_voices: Vec<String> = raw.keys().cloned().collect();
        let voices: HashMap<String, Voice> =
            raw.into_iter().map(|(k, v)| (k, Voice::from_npy(v))).collect();

        Ok(Self {
            session: Mutex::new(session),
            voices,
            speed_priors,
            voice_aliases,
            available_voices,
        })
    }

    fn resolve_voice<'a>(&'a self, voice: &'a str) -> &'a str {
        self.voice_aliases.get(voice).map(String::as_str).unwrap_or(voice)
    }

    /// Core inference step: IPA phoneme string → audio samples at
    /// [`SAMPLE_RATE`].
    ///
    /// `style_idx` selects which row of the voice style matrix to use; the
    /// caller typically passes the byte length of the segment's normalized
    /// text, clamped internally to the matrix bounds.
    fn infer_ipa(
        &self,
        ipa: &str,
        style_idx: usize,
        voice_key: &str,
        effective_speed: f32,
    ) -> Result<Vec<f32>> {
        let voice_data = self.voices.get(voice_key).with_context(|| {
            format!("Voice '{}' not found. Available: {:?}", voice_key, self.available_voices)
        })?;

        let ids = ipa_to_ids(ipa);
        let seq_len = ids.len();

        let style_slice = voice_data.style_row(style_idx);
        let style_dim = style_slice.len();

        // Inputs are positional, matching the ONNX graph input order:
        //   0 → input_ids  [1, seq_len]  i64
        //   1 → style      [1, style_d]  f32
        //   2 → speed      [1]           f32
        let t_input_ids = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .context("Failed to build input_ids tensor")?;
        let t_style = Tensor::<f32>::from_array(([1usize, style_dim], style_slice.to_vec()))
            .context("Failed to build style tensor")?;
        let t_speed = Tensor::<f32>::from_array(([1usize], vec![effective_speed]))
            .context("Failed to build speed tensor")?;

        let mut session = self.session.lock().expect("ORT session mutex poisoned");
        let outputs = session
            .run(ort::inputs![t_input_ids, t_style, t_speed])
            .context("ONNX inference failed")?;

        let (_shape, audio_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;

        let audio_flat: Vec<f32> = audio_data.to_vec();
        let trimmed_len = audio_flat.len().saturating_sub(TAIL_TRIM);
        Ok(audio_flat[..trimmed_len].to_vec())
    }

    /// Run inference from an already-resolved IPA phoneme string (spec
    /// §4.7: the resolver always hands the synthesizer phonemes, never
    /// raw text).
    pub fn generate_from_ipa(&self, ipa: &str, voice: &str, speed: f32) -> Result<Vec<f32>> {
        let voice_key = self.resolve_voice(voice);
        if !self.voices.contains_key(voice_key) {
            anyhow::bail!("Unknown voice '{}'. Available: {:?}", voice, self.available_voices);
        }
        let effective_speed = speed * self.speed_priors.get(voice_key).copied().unwrap_or(1.0);
        self.infer_ipa(ipa, ipa.len(), voice_key, effective_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_style_row_clamps_to_bounds() {
        let voice = Voice { nrows: 2, ncols: 3, data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0] };
        assert_eq!(voice.style_row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(voice.style_row(100), &[4.0, 5.0, 6.0]);
    }
}
