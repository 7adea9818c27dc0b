//! Example demonstrating a Redis-backed mutex.

use db_mutex::prelude::*;
use db_mutex::RedisMutexBackend;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    // Keys expire after a minute if this process dies holding them.
    let backend = RedisMutexBackend::builder()
        .url(url)
        .expiry(Duration::from_secs(60))
        .build()
        .await?;
    println!("Owner token: {}", backend.token());

    let mutex = DbMutex::new(backend);

    if mutex
        .acquire_timeout("cache-rebuild", Duration::from_secs(3))
        .await?
    {
        println!("Rebuilding cache...");
        tokio::time::sleep(Duration::from_secs(1)).await;
        if !mutex.release("cache-rebuild").await? {
            println!("Lock had already expired before release");
        }
    } else {
        println!("Another process is rebuilding the cache");
    }

    Ok(())
}
