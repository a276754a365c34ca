//! # pxtts
//!
//! Pronunciation-correct, long-form text-to-speech job service.
//!
//! Long-form text (an ebook chapter, an article) is normalized, split into
//! chunks, routed through a prioritized pronunciation-dictionary stack with
//! phonemizer fallback and auto-learning, synthesized with a pooled ONNX
//! model, encoded to Ogg/Opus, and cached by content fingerprint. Jobs and
//! their segments are scheduled through either an in-process queue or a
//! Redis-backed distributed one, with stale-claim recovery, retry caps, and
//! cancellation. The HTTP surface exposes job submission, per-segment and
//! merged-audio retrieval, dictionary management, and admin/metrics
//! endpoints.
//!
//! ## Pipeline
//! 1. **Normalize** — Unicode NFKC, smart punctuation folding, optional
//!    acronym spelling and number handling (`normalize`).
//! 2. **Chunk** — paragraph → sentence → clause → word cascade bounded by
//!    configured character targets (`chunk`).
//! 3. **Resolve** — greedy phrase match, then token match, across a
//!    priority-ordered dictionary pack stack, falling back to `espeak-ng`
//!    phonemization with optional auto-learning (`resolver`, `dict`,
//!    `phonemize`).
//! 4. **Synthesize** — phonemes → PCM via a pooled ONNX session
//!    (`synth`, `model`, `npz`, `tokenize`, `download`).
//! 5. **Encode** — PCM → Ogg/Opus with inter-segment silence (`codec`).
//! 6. **Cache** — content-addressed storage keyed by a deterministic
//!    fingerprint of every input that affects the audio (`cache`,
//!    `fingerprint`).
//! 7. **Schedule** — job/segment state machines, queueing, worker claims,
//!    and merge (`job`, `store`, `worker`, `scheduler`, `merger`).
//! 8. **Serve** — the HTTP API (`api`).

pub mod api;
pub mod cache;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod dict;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod merger;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod npz;
pub mod phonemize;
pub mod preprocess;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod synth;
pub mod tokenize;
pub mod worker;
