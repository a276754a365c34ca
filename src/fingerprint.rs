//! Deterministic fingerprinting (spec §4.5, §8 invariant 3).

use sha2::{Digest, Sha256};

use crate::chunk::ReadingProfile;

/// Canonical JSON for a reading profile: stable field order so the
/// fingerprint is reproducible across serde_json versions/builds.
pub fn reading_profile_canonical_json(profile: &ReadingProfile) -> String {
    format!(
        "{{\"rate\":{},\"pause_scale\":{},\"quote_mode\":\"{:?}\",\"acronym_mode\":\"{:?}\",\"number_mode\":\"{:?}\"}}",
        profile.rate, profile.pause_scale, profile.quote_mode, profile.acronym_mode, profile.number_mode
    )
}

/// `sorted_pack_versions` term of the cache key: `"name:version"` pairs
/// sorted by name, joined by `|`.
pub fn sorted_pack_versions(versions: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = versions.iter().map(|(n, v)| format!("{n}:{v}")).collect();
    pairs.sort();
    pairs.join("|")
}

/// Inputs that determine a segment's synthesized audio (spec §3 invariant,
/// §4.5 formula).
pub struct FingerprintInputs<'a> {
    pub normalized_text: &'a str,
    pub model_id: &'a str,
    pub voice_id: &'a str,
    pub pack_versions: &'a [(String, String)],
    pub reading_profile: &'a ReadingProfile,
    pub compiler_version: &'a str,
    pub phoneme_mode: &'a str,
}

/// Compute the segment cache key (spec §4.5).
///
/// ```text
/// cache_key = sha256(
///   normalized_segment_text || NUL ||
///   model_id || NUL || voice_id_or_empty || NUL ||
///   sorted_pack_versions || NUL ||
///   reading_profile_canonical_json || NUL ||
///   compiler_version || NUL ||
///   phoneme_mode
/// )
/// ```
pub fn cache_key(inputs: &FingerprintInputs) -> String {
    let mut hasher = Sha256::new();
    hasher.update(inputs.normalized_text.as_bytes());
    hasher.update([0u8]);
    hasher.update(inputs.model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(inputs.voice_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(sorted_pack_versions(inputs.pack_versions).as_bytes());
    hasher.update([0u8]);
    hasher.update(reading_profile_canonical_json(inputs.reading_profile).as_bytes());
    hasher.update([0u8]);
    hasher.update(inputs.compiler_version.as_bytes());
    hasher.update([0u8]);
    hasher.update(inputs.phoneme_mode.as_bytes());
    hex::encode(hasher.finalize())
}

/// Merge fingerprint (spec §4.5/§9): `sha256(ordered cache_keys || pause_scale)`.
pub fn merge_fingerprint(ordered_cache_keys: &[String], pause_scale: f32) -> String {
    let mut hasher = Sha256::new();
    for key in ordered_cache_keys {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(pause_scale.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(text: &'a str, profile: &'a ReadingProfile) -> FingerprintInputs<'a> {
        FingerprintInputs {
            normalized_text: text,
            model_id: "kitten-tts-mini-0.8",
            voice_id: "Jasper",
            pack_versions: &[],
            reading_profile: profile,
            compiler_version: "1.0.0",
            phoneme_mode: "espeak",
        }
    }

    #[test]
    fn pure_function_of_inputs() {
        let profile = ReadingProfile::default();
        let a = cache_key(&inputs("hello", &profile));
        let b = cache_key(&inputs("hello", &profile));
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_text_change() {
        let profile = ReadingProfile::default();
        let a = cache_key(&inputs("hello", &profile));
        let b = cache_key(&inputs("goodbye", &profile));
        assert_ne!(a, b);
    }

    #[test]
    fn pack_version_order_is_irrelevant() {
        let a = sorted_pack_versions(&[
            ("en_core".to_string(), "1".to_string()),
            ("anime_en".to_string(), "2".to_string()),
        ]);
        let b = sorted_pack_versions(&[
            ("anime_en".to_string(), "2".to_string()),
            ("en_core".to_string(), "1".to_string()),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn merge_fingerprint_stable_for_same_inputs() {
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(merge_fingerprint(&keys, 1.0), merge_fingerprint(&keys, 1.0));
        assert_ne!(merge_fingerprint(&keys, 1.0), merge_fingerprint(&keys, 1.1));
    }
}
