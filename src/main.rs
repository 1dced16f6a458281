use std::{net::SocketAddr, process, sync::Arc};

use storefront_offline::{
    cache::MemoryCacheStorage,
    config::{self, Settings},
    error::AppError,
    infra::{
        clients::ClientRegistry,
        error::InfraError,
        http::{self, GatewayState},
        notifications::NotificationCenter,
        telemetry,
        upstream::UpstreamClient,
    },
    worker::{MemoryActionQueue, OfflineCacheController, Registration, WorkerContext},
};
use tokio::{sync::watch, try_join};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Precache(_) => run_precache(settings).await,
    }
}

struct Runtime {
    context: WorkerContext,
    clients: Arc<ClientRegistry>,
    notifications: Arc<NotificationCenter>,
}

fn build_runtime(settings: &Settings) -> Result<Runtime, AppError> {
    let upstream = Arc::new(UpstreamClient::new(&settings.upstream)?);
    let clients = Arc::new(ClientRegistry::with_limits(
        settings.server.tracked_clients,
        settings.server.retained_notifications,
    ));
    let notifications = Arc::new(NotificationCenter::with_limit(
        settings.server.retained_notifications,
    ));

    let context = WorkerContext {
        storage: Arc::new(MemoryCacheStorage::new()),
        network: upstream.clone(),
        clients: clients.clone(),
        notifier: notifications.clone(),
        actions: Arc::new(MemoryActionQueue::new()),
        replayer: upstream,
    };

    Ok(Runtime {
        context,
        clients,
        notifications,
    })
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let runtime = build_runtime(&settings)?;
    let registration = Arc::new(Registration::new(runtime.context));
    let worker_config = Arc::new(settings.worker.clone());

    // The gateway still proxies when the app shell cannot be precached.
    match registration.register(Arc::clone(&worker_config)).await {
        Ok((controller, report)) => info!(
            worker = %controller.id(),
            scope = %worker_config.scope,
            deleted = report.deleted.len(),
            "Offline worker registered"
        ),
        Err(err) => warn!(
            error = %err,
            upstream = %settings.upstream.base_url,
            "Offline worker failed to register; requests pass through"
        ),
    }

    let state = GatewayState {
        registration: Arc::clone(&registration),
        worker_config,
        clients: runtime.clients,
        notifications: runtime.notifications,
        max_body_bytes: settings.server.max_body_bytes.get() as usize,
    };

    let result = serve_http(&settings, state).await;

    match tokio::time::timeout(settings.server.graceful_shutdown, registration.shutdown()).await {
        Ok(settled) => info!(settled, "Pending cache writes settled"),
        Err(_) => warn!(
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "Timed out waiting for pending cache writes"
        ),
    }

    result
}

async fn run_precache(settings: Settings) -> Result<(), AppError> {
    let runtime = build_runtime(&settings)?;
    let storage = Arc::clone(&runtime.context.storage);
    let controller = OfflineCacheController::new(Arc::new(settings.worker.clone()), runtime.context);

    controller
        .install()
        .await
        .map_err(|err| AppError::Registration(err.into()))?;

    let entries = storage.len(&settings.worker.static_partition).await?;
    info!(
        upstream = %settings.upstream.base_url,
        partition = %settings.worker.static_partition,
        entries,
        "Precache manifest is servable"
    );
    Ok(())
}

async fn serve_http(settings: &Settings, state: GatewayState) -> Result<(), AppError> {
    let public_router = http::build_public_router(state.clone());
    let admin_router = http::build_admin_router(state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(
        public_listener,
        public_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            // Signal listener is gone; keep serving.
            std::future::pending::<()>().await;
        }
    }
}
