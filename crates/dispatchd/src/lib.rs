//! `dispatchd` library: CLI flags, layered config, tracing, and the
//! mode-dispatch that wires a `Registry`-backed `ServiceContext` (solo/mono)
//! or a `ConsumerApi`-backed router (team) into an `axum::serve`d
//! HTTP/WebSocket edge. Kept separate from `main.rs`'s binary wiring so
//! integration tests can drive `run` without spawning a process.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod cli;
pub mod config;
pub mod logging;
#[cfg(feature = "team")]
pub mod team;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use dispatch_core::{Registry, ServiceContext, StaticRegistry};

use cli::{CliArgs, RunMode};
use config::Settings;

/// The process's working directory: `./.dispatchd`, created if missing.
pub fn work_dir() -> Result<PathBuf> {
    let dir = std::env::current_dir()?.join(".dispatchd");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Build the `axum::Router` for `args`/`settings` without binding a
/// listener, so tests can exercise it with `tower::ServiceExt::oneshot`.
pub async fn build_router(args: &CliArgs, settings: &Settings) -> Result<axum::Router> {
    // Solo and mono both embed the same `StaticRegistry`-backed
    // `ServiceContext` and serve the same router; they differ only in
    // deployment intent, not in code path — solo is meant to be dialed by a
    // separate `--team` frontend, mono collocates everything in one process.
    match args.mode() {
        RunMode::Solo => {
            let ctx = build_service_context(settings).await?;
            tracing::info!("running in solo mode (embedded registry, pool-master-less)");
            Ok(dispatch_axum::router(ctx))
        }
        RunMode::Mono => {
            let ctx = build_service_context(settings).await?;
            tracing::info!("running in mono mode (collocated drivers + HTTP edge)");
            Ok(dispatch_axum::router(ctx))
        }
        RunMode::Team(addr) => {
            tracing::info!("running in team mode, dialing drivers service at {addr}");
            team_router(addr)
        }
    }
}

/// Build the router for `args`/`settings`, bind it to `settings`'s (or
/// `args.listen`'s) address, and serve until a shutdown signal arrives.
pub async fn run(args: CliArgs, settings: Settings) -> Result<()> {
    let listen = args
        .listen
        .clone()
        .unwrap_or_else(|| format!("{}:{}", settings.listen_host, settings.listen_port));
    let socket_addr = SocketAddr::from_str(&listen)?;

    let router = build_router(&args, &settings).await?;

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(feature = "team")]
fn team_router(addr: String) -> Result<axum::Router> {
    Ok(team::router(team::TeamState::new(addr)))
}

#[cfg(not(feature = "team"))]
fn team_router(_addr: String) -> Result<axum::Router> {
    Err(anyhow!(
        "--team requires dispatchd to be built with the \"team\" feature"
    ))
}

#[cfg(feature = "mongodb")]
async fn build_service_context(settings: &Settings) -> Result<Arc<ServiceContext>> {
    let client = mongodb::Client::with_uri_str(&settings.mongodb.uri).await?;
    let waypoint_store = Arc::new(dispatch_mongodb::waypoint_store(
        &client,
        &settings.mongodb.database,
    ));
    let truck_store = Arc::new(dispatch_mongodb::truck_store(
        &client,
        &settings.mongodb.database,
    ));
    let registry = StaticRegistry::new(waypoint_store, truck_store);
    Ok(ServiceContext::new(Arc::new(registry) as Arc<dyn Registry>))
}

#[cfg(not(feature = "mongodb"))]
async fn build_service_context(_settings: &Settings) -> Result<Arc<ServiceContext>> {
    use dispatch_common::InMemoryStore;
    use dispatch_core::{TruckRow, WaypointRow};

    tracing::warn!("mongodb feature disabled, serving out of an in-memory store");
    let registry = StaticRegistry::new(
        Arc::new(InMemoryStore::<WaypointRow>::new()),
        Arc::new(InMemoryStore::<TruckRow>::new()),
    );
    Ok(ServiceContext::new(Arc::new(registry) as Arc<dyn Registry>))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn mono_args() -> CliArgs {
        CliArgs {
            team: None,
            solo: false,
            mono: true,
            dev: false,
            config: None,
            listen: None,
        }
    }

    #[tokio::test]
    async fn mono_router_serves_waypoint_add() {
        let settings = Settings::default();
        let router = build_router(&mono_args(), &settings).await.unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/t1/waypoint/add")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":1.0,"y":2.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
