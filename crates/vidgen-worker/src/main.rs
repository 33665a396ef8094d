//! Media task worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidgen_queue::transport_from_env;
use vidgen_store::store_from_env;
use vidgen_worker::{DemoEngine, HandlerRegistry, TaskExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vidgen=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vidgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match store_from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create task store: {}", e);
            std::process::exit(1);
        }
    };
    info!("Task store backend: {}", store.backend());

    let transport = match transport_from_env() {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to create queue transport: {}", e);
            std::process::exit(1);
        }
    };
    info!("Queue transport backend: {}", transport.backend());

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress: Arc<dyn vidgen_queue::ProgressSink> =
        match vidgen_queue::RedisProgressChannel::new(&redis_url) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                error!("Failed to create progress channel: {}", e);
                std::process::exit(1);
            }
        };

    let output_dir =
        std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "static/generated".to_string());
    let registry = Arc::new(HandlerRegistry::with_engine(Arc::new(DemoEngine::new(
        output_dir,
    ))));

    let executor = Arc::new(TaskExecutor::new(
        config,
        store,
        transport,
        progress,
        registry,
    ));

    // Setup signal handler
    let executor_signal = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        executor_signal.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
