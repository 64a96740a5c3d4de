use std::{env, net::SocketAddr, sync::Arc};

use relay_core::commerce::CommerceClient;
use relay_core::email::EmailClient;
use relay_core::{Config, HandlerContext, StateKeys, init_telemetry};
use tracing::{info, warn};

mod api;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<HandlerContext>,
    pub dev_mode: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let http = reqwest::Client::new();
    let ctx = HandlerContext {
        commerce: CommerceClient::new(http.clone(), &config.commerce),
        email: EmailClient::new(
            http,
            config.email.api_key.clone(),
            config.email.sender_email.clone(),
            config.email.sender_name.clone(),
        ),
        states: StateKeys::from(&config.states),
    };

    let state = AppState {
        ctx: Arc::new(ctx),
        dev_mode: config.is_dev(),
    };
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("approval relay listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
    }
}
