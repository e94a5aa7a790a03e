//! HTTP server - serves the router until stopped

use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::app::{Server, ServerError};

pub struct HttpServer {
    addr: SocketAddr,
    router: Mutex<Option<Router>>,
    shutdown: watch::Sender<bool>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            addr,
            router: Mutex::new(Some(router)),
            shutdown,
        }
    }
}

#[async_trait]
impl Server for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self) -> Result<(), ServerError> {
        let router = self
            .router
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ServerError::AlreadyStarted(self.name().to_string()))?;

        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut stop = self.shutdown.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            })
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.shutdown.send_replace(true);
        Ok(())
    }
}
