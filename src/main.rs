//! Entity Cache demo driver
//!
//! Wires entity caches for simulated scene and tag stores, drives a batched
//! workload through them and logs the resulting cache stats.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entity_cache::{
    run_batches_concurrent, BoxError, CacheConfig, CacheError, CacheRegistry, EntityCache,
    VecPool,
};

/// Simulated store latency per entity lookup.
const LOAD_LATENCY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Serialize)]
struct Scene {
    id: i64,
    title: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tag {
    id: i64,
    name: String,
}

async fn load_scene(ctx: CancellationToken, id: i64) -> Result<Scene, BoxError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(CacheError::Cancelled.into()),
        _ = tokio::time::sleep(LOAD_LATENCY) => Ok(Scene {
            id,
            title: format!("Scene {}", id),
        }),
    }
}

async fn load_tag(ctx: CancellationToken, id: i64) -> Result<Tag, BoxError> {
    if id <= 0 {
        return Err(format!("tag {} does not exist", id).into());
    }
    tokio::select! {
        _ = ctx.cancelled() => Err(CacheError::Cancelled.into()),
        _ = tokio::time::sleep(LOAD_LATENCY) => Ok(Tag {
            id,
            name: format!("tag-{}", id),
        }),
    }
}

/// Main entry point for the demo driver.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create and register the entity caches
/// 4. Run the workload, cancelled early on Ctrl+C
/// 5. Log per-cache stats as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entity_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: default_capacity={}, ttl={:?}, max_workers={}",
        config.default_capacity, config.ttl, config.max_workers
    );

    let scenes = EntityCache::new(config.entity("scene"), load_scene);
    let tags = EntityCache::new(config.entity("tag"), load_tag);

    let mut registry = CacheRegistry::new();
    registry.register("scene", &scenes);
    registry.register("tag", &tags);
    info!("Registered entity caches: {:?}", registry.names());

    let ctx = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(ctx.clone()));

    run_workload(&ctx, &config, &scenes, &tags).await?;

    // Invalidated entities reload on next access
    registry.invalidate_many("scene", &[1, 2, 3]);
    let reloaded = scenes.get(&ctx, 1).await?;
    info!(
        "Reloaded scene after invalidation: {}",
        serde_json::to_string(&reloaded).context("serializing scene")?
    );

    // A failed load is returned to the caller and never cached
    match tags.get(&ctx, 0).await {
        Ok(tag) => warn!("Unexpected tag: {}", serde_json::to_string(&tag)?),
        Err(err) => info!("Missing tag reported: {}", err),
    }

    let stats = serde_json::to_string_pretty(&registry.stats())
        .context("serializing cache stats")?;
    info!("Entity cache stats:\n{}", stats);
    info!(
        "Scene cache: {} (hit rate {:.2})",
        serde_json::to_string(&scenes.lru_stats()).context("serializing lru stats")?,
        scenes.hit_rate()
    );

    Ok(())
}

/// Loads scenes twice (cold then warm) and tags in concurrent batches.
async fn run_workload(
    ctx: &CancellationToken,
    config: &CacheConfig,
    scenes: &EntityCache<Scene>,
    tags: &EntityCache<Tag>,
) -> anyhow::Result<()> {
    let scene_ids: Vec<i64> = (1..=50).collect();
    for pass in ["cold", "warm"] {
        let loaded = scenes
            .get_many(ctx, &scene_ids)
            .await
            .map_err(CacheError::from)?;
        info!("Loaded {} scenes ({} pass)", loaded.len(), pass);
    }

    let tag_ids: Vec<i64> = (1..=500).map(|id| id % 120 + 1).collect();
    let buffers: Arc<VecPool<Tag>> = Arc::new(VecPool::default());
    let tags = tags.clone();
    let pool = Arc::clone(&buffers);

    run_batches_concurrent(ctx, &tag_ids, 100, config.max_workers, move |ctx, batch| {
        let tags = tags.clone();
        let pool = Arc::clone(&pool);
        async move {
            let mut buf = pool.get();
            buf.extend(tags.get_many(&ctx, &batch).await.map_err(CacheError::from)?);
            if let Some(first) = buf.first() {
                info!(
                    "Resolved tag batch of {} starting with {}",
                    buf.len(),
                    serde_json::to_string(first)?
                );
            }
            pool.put(buf);
            Ok::<_, anyhow::Error>(())
        }
    })
    .await?;

    info!("Tag buffers retained for reuse: {}", buffers.len());
    Ok(())
}

/// Cancels the workload context on Ctrl+C.
async fn cancel_on_ctrl_c(ctx: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling workload...");
            ctx.cancel();
        }
        Err(err) => warn!("Failed to install Ctrl+C handler: {}", err),
    }
}
