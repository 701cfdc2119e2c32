//! Bubble Protocol Guardian reference server binary.
//!
//! Endpoints:
//! - `POST /rpc` - the JSON-RPC 2.0 envelope for all ten Guardian methods
//! - `GET /ws` - WebSocket upgrade for live subscription delivery
//! - `GET /health` - liveness probe
//!
//! Environment: `.env` values loaded at startup; `HOST`, `PORT`, `CHAIN_ID`,
//! `PROVIDER_URL`, `REPLAY_SKEW_MS`, `REQUEST_TIMEOUT_MS`, `WS_HEARTBEAT_SECS`
//! control configuration.

mod config;
mod rpc_handlers;
mod run;
mod sig_down;
mod ws;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        println!("{e}");
        process::exit(1)
    }
}
