//! Configuration surface (spec §6) — CLI (`clap`) overlaying an optional
//! TOML file, overlaid by environment variables.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    All,
    Api,
    Worker,
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Role::All),
            "api" => Ok(Role::Api),
            "worker" => Ok(Role::Worker),
            other => Err(format!("unknown role '{other}' (expected all|api|worker)")),
        }
    }
}

/// CLI wrapper — `pxtts-server --config pxtts.toml --role all`.
#[derive(Debug, Parser)]
#[command(name = "pxtts-server", about = "Pronunciation-correct TTS job service")]
pub struct Cli {
    /// Optional TOML config file; environment variables override its values.
    #[arg(long, env = "PXTTS_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "PXTTS_ROLE")]
    pub role: Option<Role>,

    #[arg(long, env = "PXTTS_BIND")]
    pub bind: Option<String>,
}

/// Full configuration surface (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub model_id: String,
    pub model_allowlist: Vec<String>,
    pub api_key: Option<String>,
    pub rate_limit_per_min: u32,

    pub cache_max_mb: u64,
    pub dict_dir: PathBuf,
    pub compiled_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub jobs_dir: PathBuf,
    pub segments_dir: PathBuf,

    pub phoneme_mode: String,
    pub autolearn: bool,
    pub autolearn_on_miss: bool,
    pub autolearn_path: PathBuf,
    pub autolearn_flush_seconds: u64,
    pub autolearn_min_len: usize,

    pub role: Role,
    pub redis_url: Option<String>,
    pub workers: usize,
    pub job_workers: usize,
    pub max_concurrent_segments: usize,

    pub min_segment_chars: usize,
    pub max_text_chars: usize,
    pub max_segments: usize,
    pub max_active_jobs: usize,
    pub require_workers: bool,
    pub jobs_ttl_seconds: u64,
    pub segment_max_retries: u32,
    pub segment_stale_seconds: u64,
    pub chunk_target_chars: usize,
    pub chunk_max_chars: usize,

    pub gpu: bool,
    pub warmup_default: bool,
    pub compiler_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            model_id: "kitten-tts-mini-0.8".to_string(),
            model_allowlist: vec!["kitten-tts-mini-0.8".to_string()],
            api_key: None,
            rate_limit_per_min: 120,

            cache_max_mb: 512,
            dict_dir: PathBuf::from("data/dicts"),
            compiled_dir: PathBuf::from("data/compiled"),
            cache_dir: PathBuf::from("data/cache"),
            jobs_dir: PathBuf::from("data/jobs"),
            segments_dir: PathBuf::from("data/segments"),

            phoneme_mode: "espeak".to_string(),
            autolearn: true,
            autolearn_on_miss: true,
            autolearn_path: PathBuf::from("data/dicts/auto_learn.json"),
            autolearn_flush_seconds: 10,
            autolearn_min_len: 3,

            role: Role::All,
            redis_url: None,
            workers: std::thread::available_parallelism().map(|n| n.get().min(4)).unwrap_or(1),
            job_workers: 1,
            max_concurrent_segments: 1,

            min_segment_chars: 60,
            max_text_chars: 20_000,
            max_segments: 120,
            max_active_jobs: 20,
            require_workers: false,
            jobs_ttl_seconds: 86_400,
            segment_max_retries: 2,
            segment_stale_seconds: 300,
            chunk_target_chars: 300,
            chunk_max_chars: 500,

            gpu: false,
            warmup_default: false,
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply CLI/env overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = if let Some(path) = &cli.config {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
            toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?
        } else {
            Self::default()
        };

        if let Some(role) = cli.role {
            cfg.role = role;
        }
        if let Some(bind) = &cli.bind {
            cfg.bind = bind.clone();
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.min_segment_chars, 60);
        assert_eq!(cfg.max_text_chars, 20_000);
        assert_eq!(cfg.max_segments, 120);
        assert_eq!(cfg.segment_max_retries, 2);
        assert_eq!(cfg.segment_stale_seconds, 300);
        assert_eq!(cfg.jobs_ttl_seconds, 86_400);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = Config::default();
        let s = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.max_segments, cfg.max_segments);
    }
}
