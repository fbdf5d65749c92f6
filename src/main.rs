mod auth;
mod checker;
mod error;
mod executor;
mod identity;
mod judger;
mod ledger;
mod normalizer;
mod problems;
mod server;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::auth::TokenVerifier;
use crate::executor::QueueExecutor;
use crate::problems::ProblemCatalog;
use crate::store::redis::RedisStore;

const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("solvehub=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let catalog = ProblemCatalog::load()?;
    info!("Loaded problem catalog: {} problems", catalog.len());

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
    let client = redis::Client::open(redis_url.clone()).context("Failed to create Redis client")?;
    let conn = get_redis_connection(&client).await;
    info!("Connected to Redis at {}", redis_url);

    let exec_queue = std::env::var("EXEC_QUEUE").unwrap_or_else(|_| "exec:queue".into());
    let exec_timeout_secs = std::env::var("EXEC_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_EXEC_TIMEOUT_SECS);
    let auth_secret = std::env::var("AUTH_SECRET").unwrap_or_else(|_| "dev-secret".into());

    let state = server::AppState {
        store: Arc::new(RedisStore::new(conn.clone())),
        executor: Arc::new(QueueExecutor::new(conn, exec_queue, exec_timeout_secs)),
        provider: Arc::new(TokenVerifier::new(auth_secret)),
        catalog: Arc::new(catalog),
    };

    let app = server::router(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Get a Redis connection with retry logic
async fn get_redis_connection(client: &redis::Client) -> MultiplexedConnection {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in 3 seconds...",
                    e
                );
                sleep(Duration::from_secs(3)).await;
            }
        }
    }
}
