//! Catalog Service - 图书目录服务入口

use std::sync::Arc;
use std::time::Duration;

use bookshelf_bootstrap::{Infrastructure, run_http};
use catalog::api::{AppState, ConnectivityTargets, router};
use catalog::infrastructure::persistence::{CachedBookRepository, ConsistencyPolicy};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run_http("config", |infra: Infrastructure| async move {
        info!("Initializing Catalog Service...");

        let config = infra.config();
        let policy = ConsistencyPolicy::from_names(
            config.store.read_tiers.as_slice(),
            config.store.write_tiers.as_slice(),
        )?;
        info!(reads = ?policy.reads, writes = ?policy.writes, "Consistency policy loaded");

        let repository = Arc::new(CachedBookRepository::new(
            infra.store(),
            infra.cache(),
            policy,
            config.cache.ttl(),
        ));

        let state = AppState {
            repository,
            store: infra.store(),
            cache: infra.cache(),
            connectivity: ConnectivityTargets::new(
                config.store.contact_points(),
                config.store.connect_timeout(),
            ),
            metrics: infra.metrics_handle(),
        };

        Ok(router(
            state,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
    })
    .await
}
