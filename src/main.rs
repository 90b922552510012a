use std::{net::SocketAddr, process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use introspector::{
    application::{
        analysis::{CompletionClient, SpecAnalyzer},
        error::AppError,
        jobs::{
            JobWorkerContext, PurgeExpiredContext, SummarizeSpecJobPayload,
            process_purge_expired_job, process_summarize_spec_job, purge_expired_schedule,
        },
        repos::{JobQueue, SummaryJobsRepo},
        summaries::SummaryJobService,
    },
    config,
    domain::types::JobType,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, UploadRateLimiter},
        llm::OpenAiCompletionClient,
        storage::JobStorage,
        telemetry,
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(args) => run_serve(settings, args.overrides.no_workers).await,
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings, no_workers: bool) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let storage = init_storage(&settings)?;

    let monitor_task = if no_workers {
        info!("background workers disabled for this process");
        None
    } else {
        let monitor = build_job_monitor(job_repositories, Arc::clone(&storage), &settings)?;
        let drain_timeout = settings.server.graceful_shutdown;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let outcome = monitor
                .shutdown_timeout(drain_timeout)
                .run_with_signal(async {
                    tokio::select! {
                        _ = shutdown_signal() => {}
                        _ = stop_rx => {}
                    }
                    Ok::<(), std::io::Error>(())
                })
                .await;
            if let Err(err) = outcome {
                error!(error = %err, "job monitor stopped");
            }
        });
        Some((stop_tx, handle))
    };

    let jobs_repo: Arc<dyn SummaryJobsRepo> = http_repositories.clone();
    let queue: Arc<dyn JobQueue> = http_repositories;
    let max_attempts = i32::try_from(settings.jobs.max_attempts.get())
        .map_err(|_| AppError::validation("jobs.max_attempts exceeds i32 range"))?;
    let state = HttpState {
        summaries: Arc::new(SummaryJobService::new(
            jobs_repo,
            queue,
            storage,
            max_attempts,
        )),
        rate_limiter: UploadRateLimiter::new(
            std::time::Duration::from_secs(settings.rate_limit.window_seconds.get().into()),
            settings.rate_limit.max_uploads.get(),
        ),
    };

    let result = serve_http(&settings, state).await;

    // In-flight jobs get up to the graceful shutdown window to finish.
    if let Some((stop_tx, handle)) = monitor_task {
        let _ = stop_tx.send(());
        if let Err(err) = handle.await {
            error!(error = %err, "job monitor task failed");
        }
        info!("background workers drained");
    }

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let (_, job_repositories) = init_repositories(&settings).await?;
    let storage = init_storage(&settings)?;
    let monitor = build_job_monitor(job_repositories, storage, &settings)?;

    info!(
        concurrency = settings.jobs.summarize_concurrency.get(),
        "starting background workers"
    );
    monitor
        .shutdown_timeout(settings.server.graceful_shutdown)
        .run_with_signal(async {
            shutdown_signal().await;
            Ok::<(), std::io::Error>(())
        })
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor failed: {err}")))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = database_url(&settings)?;
    let pool = PostgresRepositories::connect(database_url, 1)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    apply_migrations(&pool).await?;
    info!("database migrations applied");
    Ok(())
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)
}

async fn apply_migrations(pool: &sqlx::PgPool) -> Result<(), AppError> {
    PostgresStorage::<()>::setup(pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = database_url(settings)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    apply_migrations(&http_pool).await?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn init_storage(settings: &config::Settings) -> Result<Arc<JobStorage>, AppError> {
    JobStorage::new(settings.storage.directory.clone())
        .map(Arc::new)
        .map_err(|err| AppError::from(InfraError::from(err)))
}

fn build_job_monitor(
    repositories: Arc<PostgresRepositories>,
    storage: Arc<JobStorage>,
    settings: &config::Settings,
) -> Result<Monitor, AppError> {
    let client: Arc<dyn CompletionClient> =
        Arc::new(OpenAiCompletionClient::new(&settings.llm).map_err(AppError::from)?);
    let analyzer = Arc::new(SpecAnalyzer::new(
        client,
        settings.llm.endpoint_concurrency.get() as usize,
    ));
    let jobs: Arc<dyn SummaryJobsRepo> = repositories.clone();

    let context = JobWorkerContext {
        jobs: Arc::clone(&jobs),
        storage: Arc::clone(&storage),
        analyzer,
    };

    let summarize_storage: PostgresStorage<SummarizeSpecJobPayload> =
        PostgresStorage::new_with_config(
            repositories.pool().clone(),
            ApalisSqlConfig::new(JobType::SummarizeSpec.as_str()),
        );
    let summarize_worker = WorkerBuilder::new("summarize-spec-worker")
        .concurrency(settings.jobs.summarize_concurrency.get() as usize)
        .data(context)
        .backend(summarize_storage)
        .build_fn(process_summarize_spec_job);

    let retention = time::Duration::try_from(settings.jobs.retention)
        .map_err(|err| AppError::validation(format!("invalid retention window: {err}")))?;
    let purge_ctx = PurgeExpiredContext {
        jobs,
        storage,
        retention,
    };
    let schedule = purge_expired_schedule().map_err(AppError::from)?;
    let purge_worker = WorkerBuilder::new("purge-expired-worker")
        .data(purge_ctx)
        .backend(CronStream::new(schedule))
        .build_fn(process_purge_expired_job);

    Ok(Monitor::new()
        .register(summarize_worker)
        .register(purge_worker))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let upload_body_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds usize range"))?;
    let router = http::build_router(state, upload_body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = stop_rx.await;
        })
        .await
    });

    tokio::select! {
        joined = &mut server => return flatten_server_result(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        timeout_secs = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!("graceful shutdown timed out; aborting open connections");
            server.abort();
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
