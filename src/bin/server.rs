//! Process entrypoint: parses configuration, builds the shared services,
//! spawns worker tasks per the configured role, and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use pxtts::api::{router, AppState};
use pxtts::cache::SegmentCache;
use pxtts::codec::{AudioCodec, OpusOggCodec};
use pxtts::config::{Cli, Config, Role};
use pxtts::dict::DictionaryStore;
use pxtts::merger::Merger;
use pxtts::metrics::Metrics;
use pxtts::resolver::{AutoLearnBuffer, Resolver};
use pxtts::scheduler::Scheduler;
use pxtts::store::{JobStore, MemoryStore, Queue, RedisStore};
use pxtts::synth::{OnnxSynthesizer, Synthesizer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli).context("loading configuration")?;

    let dict_store = Arc::new(DictionaryStore::new(config.dict_dir.clone()));
    let auto_learn = Arc::new(AutoLearnBuffer::new(
        Duration::from_secs(config.autolearn_flush_seconds),
        config.autolearn_min_len,
    ));

    let (store, queue): (Arc<dyn JobStore>, Arc<dyn Queue>) = match &config.redis_url {
        Some(url) => {
            let redis = Arc::new(RedisStore::connect(url).context("connecting to redis")?);
            (redis.clone(), redis)
        }
        None => {
            let mem = Arc::new(MemoryStore::new());
            (mem.clone(), mem)
        }
    };

    let codec: Arc<dyn AudioCodec> = Arc::new(OpusOggCodec::new());
    let cache = Arc::new(SegmentCache::new(config.segments_dir.clone(), config.cache_max_mb));
    let onnx_synthesizer = Arc::new(OnnxSynthesizer::new(config.model_allowlist.clone()));
    if config.warmup_default {
        tracing::info!("warming up synthesizer pool");
        onnx_synthesizer.warmup().context("synthesizer warmup failed")?;
    }
    let synthesizer: Arc<dyn Synthesizer> = onnx_synthesizer;
    let metrics = Arc::new(Metrics::new());

    let scheduler = Arc::new(Scheduler {
        store: store.clone(),
        queue: queue.clone(),
        dict_store: dict_store.clone(),
        cache: cache.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
    });
    let merger = Arc::new(
        Merger::new(store.clone(), codec.clone(), config.cache_dir.clone(), cache.clone()).with_metrics(metrics.clone()),
    );

    // Built unconditionally (not just for `worker`/`all` roles) since the
    // `api` role also needs it to serve `/v1/dicts/learn`.
    let packs = dict_store.load_all().context("loading dictionary packs")?;
    let resolver = Arc::new(Resolver::new(packs, Some(auto_learn.clone()), config.autolearn_on_miss));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if matches!(config.role, Role::All | Role::Worker) {
        // `job_workers` parallel worker processes; each fans out internally
        // to `workers` concurrent claim lanes (spec §6 scheduling model).
        for i in 0..config.job_workers.max(1) {
            let worker = Arc::new(pxtts::worker::Worker {
                id: format!("worker-{i}"),
                store: store.clone(),
                queue: queue.clone(),
                resolver: resolver.clone(),
                synthesizer: synthesizer.clone(),
                codec: codec.clone(),
                cache: cache.clone(),
                config: config.clone(),
                metrics: metrics.clone(),
            });
            let rx = shutdown_rx.clone();
            tokio::spawn(worker.run_pool(rx));
        }
    }

    {
        let store = store.clone();
        let ttl_seconds = config.jobs_ttl_seconds as i64;
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                if *rx.borrow() {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        let now = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_secs() as i64)
                            .unwrap_or(0);
                        match store.reap_expired(now, ttl_seconds).await {
                            Ok(0) => {}
                            Ok(n) => tracing::info!(reaped = n, "reaped expired jobs"),
                            Err(e) => tracing::warn!(error = %e, "job reaper failed"),
                        }
                    }
                    _ = rx.changed() => {}
                }
            }
        });
    }

    if matches!(config.role, Role::All | Role::Worker) {
        let dict_store = dict_store.clone();
        let auto_learn = auto_learn.clone();
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                if *rx.borrow() {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {
                        if let Err(e) = auto_learn.maybe_flush(&dict_store) {
                            tracing::warn!(error = %e, "auto-learn flush failed");
                        }
                    }
                    _ = rx.changed() => {}
                }
            }
        });
    }

    if matches!(config.role, Role::All | Role::Api) {
        let state = AppState::new(
            scheduler,
            merger,
            store.clone(),
            queue.clone(),
            cache,
            dict_store,
            auto_learn,
            resolver,
            metrics,
            config.clone(),
        );
        let app = router(state);

        let listener = tokio::net::TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("binding {}", config.bind))?;
        tracing::info!(addr = %config.bind, "pxtts-server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;
    } else {
        shutdown_signal().await;
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
