//! Reference Guardian server entrypoint.
//!
//! Load `.env`, build the application state, merge the route tables, apply
//! a permissive CORS layer for cross-origin clients, bind a `TcpListener`,
//! and serve with `SigDown`-driven graceful shutdown. A production
//! deployment would build its `BlockchainProvider`/`DataServer` from
//! on-chain RPC config and a real storage backend at this point; this
//! reference server instead wires the in-memory fixtures from
//! `bubble_guardian::testing`. A real deployment swaps those two `Arc`s for
//! its own collaborators and otherwise reuses this wiring unchanged.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use bubble_guardian::guardian::Guardian;
use bubble_guardian::testing::{InMemoryBlockchainProvider, InMemoryDataServer};
use dotenvy::dotenv;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::config::GuardianConfig;
use crate::rpc_handlers;
use crate::sig_down::SigDown;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = GuardianConfig::load();

    let blockchain = Arc::new(InMemoryBlockchainProvider::new(config.chain_id));
    let data_server = Arc::new(InMemoryDataServer::new());
    let guardian = Arc::new(Guardian::new(blockchain, data_server, config.provider_url.clone(), config.replay_skew()));

    let app: Router = Router::new()
        .merge(
            rpc_handlers::routes::<InMemoryBlockchainProvider, InMemoryDataServer>(config.ws_heartbeat(), config.request_timeout())
                .with_state(guardian),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "starting bubble guardian server");
    let listener = tokio::net::TcpListener::bind(addr).await.inspect_err(|err| tracing::error!(%addr, error = %err, "failed to bind"))?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}
