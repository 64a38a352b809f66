use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod state;
#[cfg(test)]
mod test_support;

pub(crate) use state::AppState;

#[tokio::main]
async fn main() {
    init_tracing();

    let cfg = match config::ServerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = std::fs::create_dir_all(&cfg.state_dir) {
        eprintln!(
            "error: cannot create state dir {}: {err}",
            cfg.state_dir.display()
        );
        std::process::exit(2);
    }

    let bus = fab_events::Bus::new(256);
    let store = fab_store::Store::new(&cfg.state_dir);
    let state = AppState::new(bus, store);

    state.bus().publish(
        fab_topics::TOPIC_SERVICE_START,
        &serde_json::json!({
            "addr": cfg.addr.to_string(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );

    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(cfg.addr)
        .await
        .expect("bind server socket");
    info!(addr = %cfg.addr, state_dir = %cfg.state_dir.display(), "fab-server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }

    state
        .bus()
        .publish(fab_topics::TOPIC_SERVICE_STOP, &serde_json::json!({}));
    info!("fab-server stopped");
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/commands", post(api::commands::handle_command))
        .route("/events", get(api::events::events_sse))
        .route("/healthz", get(api::meta::healthz))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
