use cascade_data::{
    adapter::build_adapter,
    context::BinanceContextProvider,
    model::symbol::SymbolTable,
    now_ms,
    router::EventRouter,
    shutdown::{Shutdown, shutdown_channel},
};
use cascade_engine::{
    config::CascadeConfig,
    context::context_stream,
    engine::{CascadeEngine, ContextStream},
    health::HealthReport,
    sink::{Alert, BroadcastAlertSink, LogAlertSink},
    store::{
        archive::{ArchiveQueue, ArchiveWorker},
        backend::JsonLinesArchive,
    },
};
use feed::serve_client;
use futures::StreamExt;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    time::{interval, timeout},
};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

/// Alert feed served to WebSocket clients.
mod feed;

/// Longest a client may take to complete the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    init_logging();

    info!("Starting liquidation cascade server");

    let config = match CascadeConfig::load() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            std::process::exit(1);
        }
    };

    let server_addr = match config.server.addr.parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(error) => {
            error!(addr = %config.server.addr, %error, "invalid WebSocket address");
            std::process::exit(1);
        }
    };
    let listener = match TcpListener::bind(&server_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%server_addr, %error, "failed to bind WebSocket server");
            std::process::exit(1);
        }
    };

    let (trigger, shutdown) = shutdown_channel();
    let symbols = Arc::new(SymbolTable::new());

    // Alerts fan out to the log & every connected WebSocket client
    info!(buffer_size = config.server.buffer_size, "alert broadcast buffer size");
    let (alert_tx, _) = broadcast::channel::<Alert>(config.server.buffer_size);
    let server_task = tokio::spawn(start_websocket_server(
        listener,
        alert_tx.clone(),
        shutdown.clone(),
    ));
    info!("WebSocket server listening on ws://{}", server_addr);

    // Cold tier
    let archive_settings = &config.store.archive;
    let archive_path = archive_settings
        .path
        .clone()
        .filter(|_| archive_settings.enabled);
    let archive = archive_path
        .as_ref()
        .map(|_| ArchiveQueue::new(archive_settings.queue_capacity));
    let archive_task = archive.clone().zip(archive_path).map(|(queue, path)| {
        info!(%path, "archiving liquidations & signals");
        tokio::spawn(
            ArchiveWorker::new(queue, JsonLinesArchive::new(path), archive_settings)
                .run(shutdown.clone()),
        )
    });

    // Venue adapters feeding the router
    let mut router = EventRouter::new(config.router);
    let events = router.subscribe();
    for exchange in config.enabled_exchanges() {
        let Some(settings) = config.adapter_settings(exchange) else {
            continue;
        };

        let adapter = build_adapter(
            exchange,
            settings,
            config.symbols.clone(),
            Arc::clone(&symbols),
        );
        match adapter.start(shutdown.clone()) {
            Ok(stream) => router.attach(stream),
            Err(error) => error!(%exchange, %error, "failed to start exchange adapter"),
        }
    }

    // Market context is optional: the engine scores without it when unavailable
    let context = init_context_stream(&config);

    let engine = CascadeEngine::new(
        &config,
        Arc::clone(&symbols),
        archive.clone(),
        (LogAlertSink, BroadcastAlertSink::new(alert_tx.clone())),
    );
    let engine_stats = engine.stats_handle();
    let engine_task = tokio::spawn(engine.run(events, context, shutdown.clone()));

    let mut health_timer = interval(config.server.health_log_interval);
    health_timer.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    error!(%error, "failed to listen for Ctrl-C");
                }
                info!("Shutdown requested");
                break;
            }
            _ = health_timer.tick() => {
                let time_ms = now_ms();
                HealthReport {
                    time_ms,
                    adapters: router.health(time_ms),
                    router: router.stats(),
                    archive: archive.as_ref().map(ArchiveQueue::health),
                    engine: engine_stats.snapshot(),
                }
                .log();
            }
        }
    }

    trigger.trigger();
    router.join().await;

    match engine_task.await {
        Ok(engine) => {
            let stats = engine.stats();
            info!(
                events = stats.events,
                alerts = stats.alerts.emitted + stats.alerts.escalated,
                suppressed = stats.alerts.suppressed,
                "Cascade engine stopped"
            );
        }
        Err(error) => error!(%error, "cascade engine task failed"),
    }

    if let Some(task) = archive_task {
        if let Err(error) = task.await {
            error!(%error, "archive worker task failed");
        }
    }

    if let Err(error) = server_task.await {
        error!(%error, "WebSocket server task failed");
    }

    info!("Liquidation cascade server stopped");
}

/// Build the market context polling stream, if enabled.
fn init_context_stream(config: &CascadeConfig) -> Option<ContextStream> {
    if !config.context.enabled {
        info!("market context disabled");
        return None;
    }

    match BinanceContextProvider::new(config.context.url.as_deref()) {
        Ok(provider) => {
            let symbols = config.context_symbols();
            info!(
                symbols = symbols.len(),
                poll_interval_ms = config.context.poll_interval.as_millis() as u64,
                "polling market context"
            );
            Some(context_stream(provider, symbols, config.context.poll_interval).boxed())
        }
        Err(error) => {
            warn!(%error, "market context unavailable, scoring without it");
            None
        }
    }
}

/// Accept WebSocket clients until shutdown, broadcasting alerts to each of them
async fn start_websocket_server(
    listener: TcpListener,
    tx: broadcast::Sender<Alert>,
    mut shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted alert feed connection");
                    tokio::spawn(handle_client(stream, peer, tx.subscribe(), shutdown.clone()));
                }
                Err(error) => warn!(%error, "failed to accept WebSocket connection"),
            },
        }
    }

    info!("WebSocket server stopped accepting connections");
}

/// Complete the WebSocket handshake & serve the alert feed to one client.
async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    alerts: broadcast::Receiver<Alert>,
    shutdown: Shutdown,
) {
    let websocket = match timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
        Ok(Ok(websocket)) => websocket,
        Ok(Err(error)) => {
            warn!(%peer, %error, "alert feed handshake failed");
            return;
        }
        Err(_) => {
            warn!(%peer, "alert feed handshake timed out");
            return;
        }
    };

    info!(%peer, "alert feed client connected");
    let end = serve_client(websocket, peer, alerts, shutdown).await;
    info!(%peer, ?end, "alert feed client disconnected");
}

/// Initialize logging. `LOG_FORMAT=json` switches to JSON lines, `RUST_LOG` filters.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(cfg!(debug_assertions))
            .init();
    }
}
