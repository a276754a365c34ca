//! Synthesizer capability (spec §4.7, §5): phonemes + voice + rate → PCM.
//!
//! `OnnxSynthesizer` pools one loaded [`KittenTtsOnnx`] per `model_id`,
//! loading lazily on first use and reusing it across every segment and
//! worker task that names the same model (spec §5: "one resident ONNX
//! session per allow-listed model").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::download;
use crate::model::KittenTtsOnnx;

pub use crate::model::SAMPLE_RATE;

/// Anything that can turn phonemes into PCM at [`SAMPLE_RATE`]. A trait
/// seam so workers and tests can substitute a fake backend (spec §8).
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, phonemes: &str, model_id: &str, voice_id: &str, rate: f32) -> Result<Vec<f32>>;
}

pub struct OnnxSynthesizer {
    allowlist: Vec<String>,
    loaded: Mutex<HashMap<String, Arc<KittenTtsOnnx>>>,
}

impl OnnxSynthesizer {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist, loaded: Mutex::new(HashMap::new()) }
    }

    fn model_for(&self, model_id: &str) -> Result<Arc<KittenTtsOnnx>> {
        if !self.allowlist.iter().any(|m| m == model_id) {
            anyhow::bail!("model '{model_id}' is not in the configured allowlist");
        }

        // Fast path: already loaded.
        if let Some(model) = self.loaded.lock().unwrap().get(model_id) {
            return Ok(model.clone());
        }

        // Load outside the lock would race two callers into a double
        // download; the pool is small (one entry per allow-listed model)
        // so holding the lock across `load_from_hub` is acceptable.
        let mut loaded = self.loaded.lock().unwrap();
        if let Some(model) = loaded.get(model_id) {
            return Ok(model.clone());
        }
        let model = Arc::new(
            download::load_from_hub(model_id)
                .with_context(|| format!("loading model '{model_id}'"))?,
        );
        loaded.insert(model_id.to_string(), model.clone());
        Ok(model)
    }

    /// Load every allow-listed model up front (spec §6 `warmup_default`).
    pub fn warmup(&self) -> Result<()> {
        for model_id in self.allowlist.clone() {
            self.model_for(&model_id)?;
        }
        Ok(())
    }
}

impl Synthesizer for OnnxSynthesizer {
    fn synthesize(&self, phonemes: &str, model_id: &str, voice_id: &str, rate: f32) -> Result<Vec<f32>> {
        let model = self.model_for(model_id)?;
        model.generate_from_ipa(phonemes, voice_id, rate)
    }
}
