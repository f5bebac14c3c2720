use std::{
    collections::{BTreeMap, HashMap, HashSet},
    process,
    sync::Arc,
};

use glossa::{
    application::{error::AppError, lookup::TextKind, store::StoreHandle},
    config::{self, ResolveArgs, ResolveKind},
    domain::types::ResourceId,
    infra::{bootstrap::Application, error::InfraError, http, memory::MemoryStore, telemetry},
};
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

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
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

    let graph = Arc::new(load_graph(&settings)?);
    let app = Application::build(&settings, graph).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, app).await,
        config::Command::Resolve(args) => run_resolve(&settings, &app, args).await,
    }
}

fn load_graph(settings: &config::Settings) -> Result<MemoryStore, AppError> {
    let store = match settings.data.dataset.as_deref() {
        Some(path) => MemoryStore::from_file(path).map_err(AppError::from)?,
        None => MemoryStore::new(),
    };
    store.create_store(&StoreHandle::new(&settings.data.default_repository));
    Ok(store)
}

async fn run_serve(settings: &config::Settings, app: Application) -> Result<(), AppError> {
    let consumer = app.consumer.clone();
    let period = app.trigger.config().auto_consume_interval();
    let consume_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            consumer.consume();
        }
    });

    let router = http::build_router(app.http_state());
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Listening");

    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    consume_handle.abort();
    if let Err(err) = consume_handle.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "Invalidation consumer task failed");
    }

    result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn run_resolve(
    settings: &config::Settings,
    app: &Application,
    args: ResolveArgs,
) -> Result<(), AppError> {
    let repository = args
        .repository
        .as_deref()
        .unwrap_or(&settings.data.default_repository);
    let store = StoreHandle::new(repository);
    let ids: HashSet<ResourceId> = args
        .ids
        .iter()
        .map(|id| ResourceId::from(id.as_str()))
        .collect();

    let output = match args.kind {
        ResolveKind::Label | ResolveKind::Description => {
            let kind = if args.kind == ResolveKind::Label {
                TextKind::Label
            } else {
                TextKind::Description
            };
            let resolved = app
                .lookup
                .resolve(&store, &ids, args.language.as_deref(), kind)
                .await?;
            serde_json::to_string_pretty(&sorted(resolved))
        }
        ResolveKind::Type => {
            let resolved = app.lookup.resolve_types(&store, &ids).await?;
            serde_json::to_string_pretty(&sorted(resolved))
        }
    }
    .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;

    println!("{output}");
    Ok(())
}

fn sorted<V>(values: HashMap<ResourceId, V>) -> BTreeMap<ResourceId, V> {
    values.into_iter().collect()
}
