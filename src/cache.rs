//! Content-addressed segment cache (spec §4.3, §4.5).
//!
//! Layout: `<cache_dir>/segments/<first 2 hex chars>/<cache_key>.ogg` plus a
//! `.meta.json` sidecar carrying the sample count and encoding used for
//! merge bookkeeping. Writes are tmp-then-rename for atomicity, matching
//! `dict.rs`'s pack-file write discipline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub cache_key: String,
    pub sample_count: usize,
    pub trailing_silence_ms: u32,
}

pub struct SegmentCache {
    root: PathBuf,
    max_bytes: u64,
}

impl SegmentCache {
    pub fn new(cache_dir: PathBuf, max_mb: u64) -> Self {
        Self { root: cache_dir, max_bytes: max_mb * 1024 * 1024 }
    }

    fn shard_dir(&self, cache_key: &str) -> PathBuf {
        self.root.join(&cache_key[..2.min(cache_key.len())])
    }

    fn audio_path(&self, cache_key: &str) -> PathBuf {
        self.shard_dir(cache_key).join(format!("{cache_key}.ogg"))
    }

    fn meta_path(&self, cache_key: &str) -> PathBuf {
        self.shard_dir(cache_key).join(format!("{cache_key}.meta.json"))
    }

    pub fn contains(&self, cache_key: &str) -> bool {
        self.audio_path(cache_key).exists()
    }

    pub fn read(&self, cache_key: &str) -> Result<Option<(Vec<u8>, SegmentMeta)>> {
        let audio_path = self.audio_path(cache_key);
        if !audio_path.exists() {
            return Ok(None);
        }
        let audio = fs::read(&audio_path)
            .with_context(|| format!("reading cached segment {}", audio_path.display()))?;
        let meta_raw = fs::read(self.meta_path(cache_key))
            .with_context(|| format!("reading sidecar for {cache_key}"))?;
        let meta: SegmentMeta = serde_json::from_slice(&meta_raw)?;
        Ok(Some((audio, meta)))
    }

    /// Store encoded audio + metadata, evicting oldest-accessed entries if
    /// this write would push total cache size over `cache_max_mb`.
    pub fn write(&self, cache_key: &str, audio: &[u8], meta: &SegmentMeta) -> Result<()> {
        let dir = self.shard_dir(cache_key);
        fs::create_dir_all(&dir)?;

        write_atomic(&self.audio_path(cache_key), audio)?;
        write_atomic(&self.meta_path(cache_key), serde_json::to_vec_pretty(meta)?.as_slice())?;

        self.evict_if_over_budget()?;
        Ok(())
    }

    fn evict_if_over_budget(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Ok(());
        }
        let mut entries = self.list_audio_entries()?;
        let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
        if total <= self.max_bytes {
            return Ok(());
        }
        // Oldest-accessed first.
        entries.sort_by_key(|(_, _, atime)| *atime);
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            let meta_path = path.with_extension("meta.json");
            let _ = fs::remove_file(&meta_path);
            if fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
        Ok(())
    }

    fn list_audio_entries(&self) -> Result<Vec<(PathBuf, u64, SystemTime)>> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("ogg") {
                    continue;
                }
                let meta = entry.metadata()?;
                let atime = meta.accessed().unwrap_or_else(|_| meta.modified().unwrap_or(SystemTime::now()));
                out.push((path, meta.len(), atime));
            }
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
