use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use clipflow::api::jwt::JwtService;
use clipflow::api::{ApiServer, AppState};
use clipflow::config::AppConfig;
use clipflow::database::Database;
use clipflow::database::repositories::{JobRepository, SqlxJobRepository};
use clipflow::logging::init_logging;
use clipflow::media::{LocalMediaBackend, MediaBackend};
use clipflow::notification::LogNotifier;
use clipflow::pipeline::{
    ClipGenerator, HtmlFetcher, HttpPageSource, JobLocks, LifecycleManager, StageExecutors,
    VideoFetcher, WorkerPool, WorkflowOrchestrator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env_or_default();

    let (logging_config, _log_guard) =
        init_logging(&config.log_dir).context("failed to initialize logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = %logging_config.get_filter(),
        "Starting clipflow"
    );

    let jwt_service = JwtService::from_env()
        .map(Arc::new)
        .context("JWT_SECRET must be set")?;

    let database = Database::connect(&config.database)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    let repo: Arc<dyn JobRepository> = Arc::new(SqlxJobRepository::new(
        database.read.clone(),
        database.write.clone(),
    ));

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    let media: Arc<dyn MediaBackend> = Arc::new(LocalMediaBackend::new(config.media.clone()));
    let page_source =
        Arc::new(HttpPageSource::new(&config.http).context("failed to build HTTP client")?);
    let executors = StageExecutors::new(
        Arc::new(HtmlFetcher::new(page_source)),
        Arc::new(VideoFetcher::new(media.clone())),
        Arc::new(ClipGenerator::new(media.clone())),
    );

    let locks = Arc::new(JobLocks::new());
    let orchestrator = Arc::new(
        WorkflowOrchestrator::new(repo.clone(), executors)
            .with_config(config.orchestrator.clone())
            .with_notifier(Arc::new(LogNotifier))
            .with_locks(locks.clone())
            .with_shutdown_token(shutdown.child_token()),
    );
    let lifecycle = Arc::new(
        LifecycleManager::new(repo.clone(), media, locks)
            .with_config(config.lifecycle.clone())
            .with_shutdown_token(shutdown.child_token()),
    );

    let mut events = orchestrator.subscribe();
    let events_token = shutdown.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = events_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => debug!(?event, "Workflow event"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Workflow event listener lagged")
                    }
                    Err(_) => break,
                },
            }
        }
    });

    let worker_pool = WorkerPool::with_config(config.worker_pool.clone());
    worker_pool.start(orchestrator.clone());

    let resumed = orchestrator
        .recover_interrupted()
        .await
        .context("failed to re-dispatch interrupted jobs")?;
    if resumed > 0 {
        info!(resumed, "Resumed interrupted jobs");
    }

    let state = AppState::with_services(Some(jwt_service), orchestrator.clone(), lifecycle.clone());
    let server = ApiServer::with_state(config.api.clone(), state)
        .with_cancel_token(shutdown.child_token());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    if let Err(e) = server.run().await {
        error!(error = %e, "API server stopped with an error");
        shutdown.cancel();
    }

    orchestrator.shutdown();
    worker_pool.stop().await;
    lifecycle.shutdown().await;
    database.close().await;

    info!("clipflow stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
