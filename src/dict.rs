//! Dictionary packs (spec §3, §4.2, §6 pack file shape).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Packs are ordered by fixed priority, highest first (spec §9: this spec
/// adopts `local_overrides > auto_learn > anime_en > en_core`).
pub const PACK_PRIORITY: &[&str] = &["local_overrides", "auto_learn", "anime_en", "en_core"];

fn priority_rank(name: &str) -> usize {
    PACK_PRIORITY.iter().position(|&p| p == name).unwrap_or(PACK_PRIORITY.len())
}

/// One entry's value, accepting both the flat shape (`"phonemes"` string
/// directly) and the metadata-carrying shape
/// (`{"phonemes": "...", "source": "..."}`) per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Flat(String),
    WithMeta { phonemes: String, #[allow(dead_code)] source: Option<String> },
}

impl RawEntry {
    fn phonemes(&self) -> &str {
        match self {
            RawEntry::Flat(s) => s,
            RawEntry::WithMeta { phonemes, .. } => phonemes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackFile {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default = "default_format")]
    #[allow(dead_code)]
    format: String,
    entries: HashMap<String, RawEntry>,
}

fn default_format() -> String {
    "espeak".to_string()
}

/// A versioned dictionary: name, format, and key → phoneme-string entries.
/// Keys may contain spaces (phrases), matched case-insensitively with a
/// case-preserving tie-break (spec §4.2).
#[derive(Debug, Clone, Serialize)]
pub struct Pack {
    pub name: String,
    pub version: String,
    pub format: String,
    pub entries: HashMap<String, String>,
}

impl Pack {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version_from_now(),
            format: "espeak".to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn priority_rank(&self) -> usize {
        priority_rank(&self.name)
    }

    /// Write this pack to `path` as the §6 JSON shape.
    pub fn save(&self, path: &Path) -> Result<()> {
        let doc = serde_json::json!({
            "name": self.name,
            "version": self.version,
            "format": self.format,
            "entries": self.entries,
        });
        write_atomic(path, serde_json::to_vec_pretty(&doc)?.as_slice())
    }
}

/// Version string format used throughout: `YYYYMMDD-HHMMSS` derived from a
/// file's mtime (spec §4.2), recomputed on every read.
fn version_from_mtime(mtime: SystemTime) -> String {
    let datetime: DateTime<Utc> = mtime.into();
    datetime.format("%Y%m%d-%H%M%S").to_string()
}

fn version_from_now() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
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

/// Load and save dictionary packs from `dict_dir`. Version is recomputed
/// from file mtime on every `load_all` call; callers snapshot the returned
/// versions at job admission (spec §3 invariant: pack versions freeze
/// mid-job).
pub struct DictionaryStore {
    pub dict_dir: PathBuf,
}

impl DictionaryStore {
    pub fn new(dict_dir: PathBuf) -> Self {
        Self { dict_dir }
    }

    fn pack_path(&self, name: &str) -> PathBuf {
        self.dict_dir.join(format!("{name}.json"))
    }

    /// Load a single named pack, or an empty pack if its file is absent.
    pub fn load(&self, name: &str) -> Result<Pack> {
        let path = self.pack_path(name);
        if !path.exists() {
            return Ok(Pack::empty(name));
        }
        let raw = fs::read(&path).with_context(|| format!("reading pack {}", path.display()))?;
        let meta = fs::metadata(&path)?;
        let mtime = meta.modified().unwrap_or_else(|_| SystemTime::now());

        let file: PackFile = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing pack {}", path.display()))?;
        let version = file.version.unwrap_or_else(|| version_from_mtime(mtime));
        let entries = file.entries.into_iter().map(|(k, v)| (k, v.phonemes().to_string())).collect();

        Ok(Pack { name: file.name, version, format: "espeak".to_string(), entries })
    }

    /// Load every known pack in priority order (highest priority first).
    pub fn load_all(&self) -> Result<Vec<Pack>> {
        let mut packs = Vec::with_capacity(PACK_PRIORITY.len());
        for name in PACK_PRIORITY {
            packs.push(self.load(name)?);
        }
        Ok(packs)
    }

    /// Upsert a single entry into a named pack, writing the file with a
    /// fresh version stamp.
    pub fn upsert(&self, pack_name: &str, key: &str, phonemes: &str) -> Result<Pack> {
        let mut pack = self.load(pack_name)?;
        pack.entries.insert(key.to_string(), phonemes.to_string());
        pack.version = version_from_now();
        pack.save(&self.pack_path(pack_name))?;
        Ok(pack)
    }

    /// Bulk-add/update entries (used by `/v1/dicts/upload`). Rejects
    /// malformed entries (empty key or phoneme string).
    pub fn upload(&self, pack_name: &str, entries: &HashMap<String, String>) -> Result<Pack> {
        for (k, v) in entries {
            if k.trim().is_empty() || v.trim().is_empty() {
                anyhow::bail!("schema violation: empty key or phonemes");
            }
        }
        let mut pack = self.load(pack_name)?;
        pack.entries.extend(entries.clone());
        pack.version = version_from_now();
        pack.save(&self.pack_path(pack_name))?;
        Ok(pack)
    }

    /// Move `key` from `auto_learn` into `target_pack`. Fails if the key is
    /// absent from `auto_learn`, unless `overwrite` and the target already
    /// carries it anyway — the move always happens if the source has it.
    pub fn promote(&self, key: &str, target_pack: &str, overwrite: bool) -> Result<Pack> {
        let mut source = self.load("auto_learn")?;
        let phonemes = source
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("key '{key}' not found in auto_learn"))?;

        let mut target = self.load(target_pack)?;
        if target.entries.contains_key(key) && !overwrite {
            anyhow::bail!("key '{key}' already exists in {target_pack} (overwrite=false)");
        }
        target.entries.insert(key.to_string(), phonemes);
        target.version = version_from_now();
        target.save(&self.pack_path(target_pack))?;

        source.entries.remove(key);
        source.version = version_from_now();
        source.save(&self.pack_path("auto_learn"))?;

        Ok(target)
    }

    /// Flatten every pack into one merged snapshot, highest priority wins
    /// on key collision, and write it to `compiled_dir/compiled.json`
    /// (spec §4.2 "compiled pack" for offline/CDN distribution).
    pub fn compile(&self, compiled_dir: &Path) -> Result<Pack> {
        let packs = self.load_all()?;
        let mut entries = HashMap::new();
        for pack in packs.iter().rev() {
            entries.extend(pack.entries.clone());
        }
        let compiled = Pack { name: "compiled".to_string(), version: version_from_now(), format: "espeak".to_string(), entries };
        compiled.save(&compiled_dir.join("compiled.json"))?;
        Ok(compiled)
    }

    /// Look up a single key across packs in priority order, case
    /// insensitively, returning the winning pack's name alongside the
    /// phonemes (spec §4.2 resolution order).
    pub fn lookup(&self, key: &str) -> Result<Option<(String, String)>> {
        let packs = self.load_all()?;
        let lower = key.to_lowercase();
        for pack in &packs {
            if let Some(phonemes) = pack.entries.get(key) {
                return Ok(Some((pack.name.clone(), phonemes.clone())));
            }
            if let Some((_, phonemes)) = pack.entries.iter().find(|(k, _)| k.to_lowercase() == lower) {
                return Ok(Some((pack.name.clone(), phonemes.clone())));
            }
        }
        Ok(None)
    }

    /// Accept raw JSON matching either pack-file shape, for tolerant
    /// reads of packs not placed through this store (spec §6: "readers
    /// accept both shapes").
    pub fn parse_entries(value: &Value) -> Result<HashMap<String, String>> {
        let obj = value.as_object().ok_or_else(|| anyhow::anyhow!("entries must be an object"))?;
        let mut out = HashMap::with_capacity(obj.len());
        for (k, v) in obj {
            let phonemes = if let Some(s) = v.as_str() {
                s.to_string()
            } else if let Some(p) = v.get("phonemes").and_then(|p| p.as_str()) {
                p.to_string()
            } else {
                anyhow::bail!("entry '{k}' has neither a string value nor a 'phonemes' field");
            };
            out.insert(k.clone(), phonemes);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_pack_with_flat_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("anime_en.json"),
            r#"{"name":"anime_en","format":"espeak","entries":{"Gojo":"ɡ oʊ dʒ oʊ"}}"#,
        )
        .unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        let pack = store.load("anime_en").unwrap();
        assert_eq!(pack.entries.get("Gojo").unwrap(), "ɡ oʊ dʒ oʊ");
    }

    #[test]
    fn loads_pack_with_metadata_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("anime_en.json"),
            r#"{"name":"anime_en","entries":{"Gojo":{"phonemes":"ɡ oʊ dʒ oʊ","source":"manual"}}}"#,
        )
        .unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        let pack = store.load("anime_en").unwrap();
        assert_eq!(pack.entries.get("Gojo").unwrap(), "ɡ oʊ dʒ oʊ");
    }

    #[test]
    fn missing_pack_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        let pack = store.load("en_core").unwrap();
        assert!(pack.entries.is_empty());
    }

    #[test]
    fn priority_order_matches_spec() {
        assert_eq!(
            PACK_PRIORITY,
            &["local_overrides", "auto_learn", "anime_en", "en_core"]
        );
    }

    #[test]
    fn upsert_then_promote() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        store.upsert("auto_learn", "widget", "w ɪ dʒ ɪ t").unwrap();
        let target = store.promote("widget", "local_overrides", false).unwrap();
        assert_eq!(target.entries.get("widget").unwrap(), "w ɪ dʒ ɪ t");
        let source = store.load("auto_learn").unwrap();
        assert!(!source.entries.contains_key("widget"));
    }

    #[test]
    fn compile_merges_packs_with_priority_winning_on_collision() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        store.upsert("en_core", "Gojo", "g oʊ dʒ oʊ").unwrap();
        store.upsert("anime_en", "Gojo", "g o j o").unwrap();

        let compiled_dir = tempdir().unwrap();
        let compiled = store.compile(compiled_dir.path()).unwrap();
        assert_eq!(compiled.entries.get("Gojo").unwrap(), "g o j o");
        assert!(compiled_dir.path().join("compiled.json").exists());
    }

    #[test]
    fn lookup_is_case_insensitive_and_respects_priority() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        store.upsert("en_core", "sukuna", "s u k u n a").unwrap();
        store.upsert("local_overrides", "Sukuna", "s oo k oo n a").unwrap();

        let (pack, phonemes) = store.lookup("SUKUNA").unwrap().unwrap();
        assert_eq!(pack, "local_overrides");
        assert_eq!(phonemes, "s oo k oo n a");
    }

    #[test]
    fn lookup_returns_none_for_unknown_key() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        assert!(store.lookup("nonexistent").unwrap().is_none());
    }

    #[test]
    fn upload_rejects_empty_values() {
        let dir = tempdir().unwrap();
        let store = DictionaryStore::new(dir.path().to_path_buf());
        let mut entries = HashMap::new();
        entries.insert("".to_string(), "x".to_string());
        assert!(store.upload("local_overrides", &entries).is_err());
    }
}
