//! Audio codec capability (spec §4.9): PCM → Ogg/Opus, and ordered
//! concatenation of encoded segments into a merged stream.
//!
//! Resamples the model's 24 kHz output to Opus's required 48 kHz via linear
//! interpolation, and inserts inter-segment/inter-sentence silence scaled by
//! the job's `pause_scale` (spec §4.1, §4.9).

use std::io::Write;

use anyhow::{Context, Result};
use audiopus::{coder::Encoder, Application, Channels, SampleRate};
use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use crate::model::SAMPLE_RATE as MODEL_SAMPLE_RATE;

pub const OPUS_SAMPLE_RATE: u32 = 48_000;
const FRAME_SAMPLES: usize = 960; // 20ms @ 48kHz

/// Pause durations per terminal-punctuation class, in milliseconds, before
/// `pause_scale` is applied (spec §4.1).
pub fn base_pause_ms(trailing_char: Option<char>) -> u32 {
    match trailing_char {
        Some('.') | Some('!') | Some('?') | Some('…') => 350,
        Some(',') | Some(';') | Some(':') => 150,
        _ => 60,
    }
}

/// Linear-interpolation resample from 24kHz to 48kHz (exactly 2x, so this
/// reduces to per-sample midpoint insertion).
pub fn resample_24k_to_48k(input: &[f32]) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(input.len() * 2);
    for i in 0..input.len() {
        out.push(input[i]);
        let next = input.get(i + 1).copied().unwrap_or(input[i]);
        out.push((input[i] + next) / 2.0);
    }
    out
}

fn silence_samples(ms: u32) -> Vec<f32> {
    let n = (OPUS_SAMPLE_RATE as u64 * ms as u64 / 1000) as usize;
    vec![0.0; n]
}

/// Encodes PCM into an Ogg/Opus byte stream; a fresh encoder+stream is used
/// per segment, then `concat_ogg` stitches encoded segments together.
pub trait AudioCodec: Send + Sync {
    /// Encode 24kHz mono PCM (the model's native rate) to a standalone
    /// Ogg/Opus file, trailed by `trailing_silence_ms` of silence.
    fn encode_pcm_to_ogg(&self, pcm_24k: &[f32], trailing_silence_ms: u32) -> Result<Vec<u8>>;

    /// Concatenate already-encoded Ogg/Opus segments into one merged
    /// stream by re-decoding page boundaries is out of scope; instead each
    /// segment's raw *PCM* is concatenated with inter-segment silence and
    /// re-encoded once, which is what `merger.rs` calls through
    /// `encode_pcm_to_ogg` after assembling the full PCM buffer.
    fn concat_ogg(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>>;
}

pub struct OpusOggCodec;

impl OpusOggCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_frames(&self, pcm_48k: &[f32]) -> Result<Vec<Vec<u8>>> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Audio)
            .context("failed to create Opus encoder")?;
        let mut packets = Vec::new();
        let mut buf = vec![0.0f32; FRAME_SAMPLES];
        let mut offset = 0;
        while offset < pcm_48k.len() {
            let end = (offset + FRAME_SAMPLES).min(pcm_48k.len());
            let chunk = &pcm_48k[offset..end];
            buf[..chunk.len()].copy_from_slice(chunk);
            for s in buf[chunk.len()..].iter_mut() {
                *s = 0.0;
            }
            let mut out = vec![0u8; 4000];
            let len = encoder.encode_float(&buf, &mut out).context("opus encode failed")?;
            out.truncate(len);
            packets.push(out);
            offset = end;
        }
        Ok(packets)
    }
}

impl Default for OpusOggCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn opus_head() -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(1); // channel count
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&MODEL_SAMPLE_RATE.to_le_bytes()); // original input rate (informational)
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

fn opus_tags() -> Vec<u8> {
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    let vendor = b"pxtts";
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes()); // no user comments
    tags
}

impl AudioCodec for OpusOggCodec {
    fn encode_pcm_to_ogg(&self, pcm_24k: &[f32], trailing_silence_ms: u32) -> Result<Vec<u8>> {
        let mut pcm_48k = resample_24k_to_48k(pcm_24k);
        pcm_48k.extend(silence_samples(trailing_silence_ms));
        let frames = self.encode_frames(&pcm_48k)?;

        let mut out = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut out);
            writer
                .write_packet(opus_head(), 1, PacketWriteEndInfo::EndPage, 0)
                .context("writing OpusHead")?;
            writer
                .write_packet(opus_tags(), 1, PacketWriteEndInfo::EndPage, 0)
                .context("writing OpusTags")?;

            let mut granule = 0u64;
            for (i, packet) in frames.iter().enumerate() {
                granule += FRAME_SAMPLES as u64;
                let end_info = if i + 1 == frames.len() {
                    PacketWriteEndInfo::EndStream
                } else {
                    PacketWriteEndInfo::NormalPacket
                };
                writer
                    .write_packet(packet.clone(), 1, end_info, granule)
                    .context("writing audio packet")?;
            }
        }
        Ok(out)
    }

    fn concat_ogg(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>> {
        // Segments are handed to us already as Ogg/Opus byte streams from
        // the cache; a correct container-level splice would require
        // re-chaining logical streams, which `ogg` does not expose simply.
        // `merger.rs` instead decodes each cached segment's known PCM (it
        // keeps the un-encoded PCM around only long enough to merge) and
        // calls `encode_pcm_to_ogg` once on the concatenated buffer; this
        // method exists for the rare case a caller truly only has the
        // encoded bytes, and falls back to byte concatenation, which is
        // valid for chained Ogg streams per RFC 3533 §4.
        let mut out = Vec::new();
        for part in parts {
            out.write_all(part)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_doubles_sample_count() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample_24k_to_48k(&input);
        assert_eq!(out.len(), input.len() * 2);
    }

    #[test]
    fn resample_empty_is_empty() {
        assert!(resample_24k_to_48k(&[]).is_empty());
    }

    #[test]
    fn pause_ms_by_punctuation_class() {
        assert_eq!(base_pause_ms(Some('.')), 350);
        assert_eq!(base_pause_ms(Some(',')), 150);
        assert_eq!(base_pause_ms(None), 60);
    }

    #[test]
    fn encode_pcm_to_ogg_produces_nonempty_stream() {
        let codec = OpusOggCodec::new();
        let pcm: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.01).sin() * 0.1).collect();
        let ogg = codec.encode_pcm_to_ogg(&pcm, 100).unwrap();
        assert!(!ogg.is_empty());
        assert_eq!(&ogg[0..4], b"OggS");
    }

    #[test]
    fn concat_ogg_chains_byte_streams() {
        let codec = OpusOggCodec::new();
        let a = vec![1u8, 2, 3];
        let b = vec![4u8, 5, 6];
        let joined = codec.concat_ogg(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined, [a, b].concat());
    }
}
