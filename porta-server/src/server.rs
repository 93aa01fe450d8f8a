//! HTTP/1.1 server

use crate::app::App;
use crate::handlers::handle_request;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct PortaServer {
    app: Arc<App>,
}

impl PortaServer {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    /// Bind the configured listen address and serve until accept fails
    pub async fn serve(self) -> anyhow::Result<()> {
        let listen = self.app.listen.clone();
        let listener = TcpListener::bind(&listen)
            .await
            .with_context(|| format!("unable to listen on {}", listen))?;
        self.serve_listener(listener).await
    }

    pub async fn serve_listener(self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Porta listening on {}", local_addr);

        loop {
            let (stream, remote_addr) = listener.accept().await.context("accept failed")?;
            debug!("New connection from {}", remote_addr);

            let app = self.app.clone();
            tokio::spawn(async move {
                Self::handle_connection(stream, remote_addr, app).await;
            });
        }
    }

    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, app: Arc<App>) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let app = app.clone();
            async move { handle_request(req, app).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            error!("Connection error from {}: {}", remote_addr, err);
        }
    }
}
