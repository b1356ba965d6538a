mod admin;
pub mod bootstrap;

use crate::engine::AdmissionEngine;
use crate::metrics::Metrics;
use anyhow::Result;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

/// Shared handles the admin endpoints read from.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<AdmissionEngine>,
    pub metrics: Option<Metrics>,
}

/// Serve the read-only admin API (health, metrics, route and breaker
/// snapshots) until `shutdown` is notified.
pub async fn run_admin_server(listen: &str, state: AdminState, shutdown: Arc<Notify>) -> Result<()> {
    let addr: SocketAddr = listen.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("server: admin listening, addr={}", addr);

    let stopped = shutdown.notified();
    tokio::pin!(stopped);
    stopped.as_mut().enable();

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut stopped => {
                info!("server: admin: stop accepting new connections");
                return Ok(());
            }
        };
        let state = state.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = state.clone();
                async move { admin::handle_admin(req, state) }
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .keep_alive(true)
                .serve_connection(io, svc)
                .await
            {
                if !e.to_string().contains("connection closed") {
                    error!("server: admin: connection error, error={}", e);
                }
            }
        });
    }
}
