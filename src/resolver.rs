//! Pronunciation resolver (spec §4.2): greedy phrase pass, token pass,
//! fallback phonemization, and single-token auto-learn.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::dict::{DictionaryStore, Pack};
use crate::phonemize;

/// Result of resolving one segment's text.
#[derive(Debug, Clone)]
pub struct ResolveOutput {
    pub phonemes: String,
    pub used_phonemes: bool,
    pub resolve_source_counts: HashMap<String, u32>,
}

/// A phrase key pre-split into lowercase tokens, with its owning pack's
/// priority rank and the pack name, for the greedy longest-match pass.
struct PhraseEntry<'a> {
    tokens: Vec<String>,
    phonemes: &'a str,
    pack_name: &'a str,
    pack_rank: usize,
}

fn tokenize(text: &str) -> Vec<(String, usize, usize)> {
    // (token, byte_start, byte_end) splitting on whitespace, punctuation kept
    // attached to neither side — tokens are maximal runs of word characters.
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() || c == '\'' {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            out.push((text[s..i].to_string(), s, i));
        }
    }
    if let Some(s) = start {
        out.push((text[s..].to_string(), s, text.len()));
    }
    out
}

/// Auto-learn buffer: accumulates fallback-resolved single tokens in
/// memory and flushes them to the `auto_learn` pack on an interval, under
/// a process-wide mutex (spec §4.2, §5 "auto-learn pack is guarded by an
/// on-disk lock (cross-process) and an in-memory mutex").
pub struct AutoLearnBuffer {
    pending: Mutex<HashMap<String, String>>,
    last_flush: Mutex<Instant>,
    flush_interval: Duration,
    min_len: usize,
}

impl AutoLearnBuffer {
    pub fn new(flush_interval: Duration, min_len: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            last_flush: Mutex::new(Instant::now()),
            flush_interval,
            min_len,
        }
    }

    /// Record a fallback-resolved token if it's eligible (spec §4.2:
    /// `len >= autolearn_min_len`, alphabetic, absent from higher-priority
    /// packs — the last condition is checked by the caller before this is
    /// invoked).
    fn record(&self, token: &str, phonemes: &str) {
        if token.chars().count() < self.min_len || !token.chars().all(|c| c.is_alphabetic()) {
            return;
        }
        self.pending.lock().unwrap().insert(token.to_string(), phonemes.to_string());
    }

    /// Flush unconditionally, merging with the on-disk `auto_learn` pack.
    pub fn flush(&self, store: &DictionaryStore) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(());
        }
        let drained: HashMap<String, String> = std::mem::take(&mut *pending);
        drop(pending);

        let mut pack = store.load("auto_learn")?;
        for (k, v) in drained {
            pack.entries.entry(k).or_insert(v);
        }
        pack.save(&store.dict_dir.join("auto_learn.json"))?;
        *self.last_flush.lock().unwrap() = Instant::now();
        Ok(())
    }

    /// Flush if `flush_interval` has elapsed since the last flush.
    pub fn maybe_flush(&self, store: &DictionaryStore) -> Result<()> {
        let due = {
            let last = self.last_flush.lock().unwrap();
            last.elapsed() >= self.flush_interval
        };
        if due {
            self.flush(store)?;
        }
        Ok(())
    }
}

/// Resolves segment text to a phoneme string using the pack stack, with
/// fallback to the `Phonemizer` capability and optional auto-learn.
pub struct Resolver {
    packs: Vec<Pack>,
    auto_learn: Option<std::sync::Arc<AutoLearnBuffer>>,
    autolearn_on_miss: bool,
}

impl Resolver {
    pub fn new(packs: Vec<Pack>, auto_learn: Option<std::sync::Arc<AutoLearnBuffer>>, autolearn_on_miss: bool) -> Self {
        Self { packs, auto_learn, autolearn_on_miss }
    }

    /// Snapshot of `(pack name, version)` pairs for the fingerprint.
    pub fn pack_versions(&self) -> Vec<(String, String)> {
        self.packs.iter().map(|p| (p.name.clone(), p.version.clone())).collect()
    }

    fn phrase_entries(&self) -> Vec<PhraseEntry<'_>> {
        let mut entries = Vec::new();
        for pack in &self.packs {
            for (key, phonemes) in &pack.entries {
                if key.contains(' ') {
                    let tokens: Vec<String> = key.split_whitespace().map(|t| t.to_lowercase()).collect();
                    entries.push(PhraseEntry {
                        tokens,
                        phonemes,
                        pack_name: &pack.name,
                        pack_rank: pack.priority_rank(),
                    });
                }
            }
        }
        // Longest token count first, then longest character length, so the
        // greedy walk tries the most specific match at each position first
        // (spec §4.2, §8 invariant 8).
        entries.sort_by(|a, b| {
            b.tokens
                .len()
                .cmp(&a.tokens.len())
                .then_with(|| b.tokens.join(" ").len().cmp(&a.tokens.join(" ").len()))
                .then_with(|| a.pack_rank.cmp(&b.pack_rank))
        });
        entries
    }

    /// Resolve `text` (already normalized) to a phoneme string.
    pub fn resolve(&self, text: &str) -> Result<ResolveOutput> {
        let tokens = tokenize(text);
        let phrases = self.phrase_entries();

        let mut out_parts: Vec<String> = Vec::new();
        let mut source_counts: HashMap<String, u32> = HashMap::new();
        let mut used_phonemes = false;
        let mut i = 0usize;

        'outer: while i < tokens.len() {
            // Phrase pass: try every phrase, longest first, for a match
            // starting at position i. Among equal-length matches, the
            // earlier entry in `phrases` (sorted tie-break: first pack in
            // priority order, since packs are iterated in that order above
            // and the sort above is stable) wins.
            for phrase in &phrases {
                let n = phrase.tokens.len();
                if i + n > tokens.len() {
                    continue;
                }
                let matches = (0..n).all(|j| tokens[i + j].0.to_lowercase() == phrase.tokens[j]);
                if matches {
                    out_parts.push(phrase.phonemes.to_string());
                    *source_counts.entry(phrase.pack_name.to_string()).or_insert(0) += 1;
                    used_phonemes = true;
                    i += n;
                    continue 'outer;
                }
            }

            // Token pass: first pack (in priority order) that has this
            // token wins.
            let (word, _, _) = &tokens[i];
            let mut resolved = false;
            for pack in &self.packs {
                if let Some(phonemes) = pack.entries.get(word.as_str()) {
                    out_parts.push(phonemes.clone());
                    *source_counts.entry(pack.name.clone()).or_insert(0) += 1;
                    used_phonemes = true;
                    resolved = true;
                    break;
                }
            }

            if !resolved {
                let phonemes = phonemize::phonemize(word)?;
                if !phonemes.trim().is_empty() {
                    used_phonemes = true;
                    out_parts.push(phonemes.clone());
                    *source_counts.entry("fallback".to_string()).or_insert(0) += 1;

                    if self.autolearn_on_miss {
                        if let Some(buf) = &self.auto_learn {
                            let already_learned = self
                                .packs
                                .iter()
                                .filter(|p| p.name != "auto_learn")
                                .any(|p| p.entries.contains_key(word.as_str()));
                            if !already_learned {
                                buf.record(word, &phonemes);
                            }
                        }
                    }
                }
            }

            i += 1;
        }

        Ok(ResolveOutput {
            phonemes: out_parts.join(" "),
            used_phonemes,
            resolve_source_counts: source_counts,
        })
    }
}
