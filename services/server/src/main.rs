use server::bus::EventBus;
use server::config::Config;
use server::hub::SseHub;
use server::queue::JobQueue;
use server::registry::SourceRegistry;
use server::state::AppState;
use server::{db, scheduler, worker};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SHUTDOWN_WATCHDOG: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = Config::from_env().unwrap_or_else(|err| {
        // No tracing subscriber yet — this is the one place we eprintln before exiting.
        eprintln!("configuration error: {err}");
        std::process::exit(1);
    });

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| config.node_env.default_log_level().to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    if let Err(err) = run(config).await {
        error!(error = %err, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let instance_id = Uuid::new_v4().to_string();
    let bus = Arc::new(EventBus::connect(&config.redis_url).await?);
    let queue = Arc::new(JobQueue::connect(&config.redis_url, instance_id).await?);
    let registry = Arc::new(SourceRegistry::from_config(&config));
    let hub = Arc::new(SseHub::new(pool.clone(), bus.clone()));
    hub.start().await;

    let state = AppState::new(pool.clone(), bus.clone(), queue.clone(), registry.clone(), hub.clone());
    let router = server::build_router(state.clone(), config.cors, config.swagger);

    let ingest_tasks: Vec<JoinHandle<()>> = if config.ingest_enabled {
        info!("ingest pipeline enabled");
        scheduler::register_all(&queue, &registry).await;
        let scheduler_queue = queue.clone();
        let scheduler_task = tokio::spawn(async move {
            scheduler_queue.drive_forever().await;
        });
        let worker_state = state.clone();
        let worker_task = tokio::spawn(async move {
            worker::drive_forever(worker_state).await;
        });
        vec![scheduler_task, worker_task]
    } else {
        info!("ingest pipeline disabled (INGEST_ENABLED=0)");
        Vec::new()
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server closed, tearing down");
    let teardown = async {
        hub.stop().await;
        for task in ingest_tasks {
            task.abort();
        }
        bus.shutdown().await;
        pool.close().await;
    };

    if tokio::time::timeout(SHUTDOWN_WATCHDOG, teardown).await.is_err() {
        error!("shutdown watchdog fired, forcing exit");
        std::process::exit(1);
    }

    info!("server shut down gracefully");
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
