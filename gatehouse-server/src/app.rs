//! Application lifecycle
//!
//! An [`App`] owns a set of [`Server`]s. `run` starts them all, then waits
//! until every server has returned or a shutdown signal arrives, and stops
//! whatever is still running.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::repository::RepoError;

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] RepoError),

    #[error("server {0} already started")]
    AlreadyStarted(String),

    #[error("server task failed: {0}")]
    Task(String),
}

/// A long-running unit the app starts and stops
#[async_trait]
pub trait Server: Send + Sync {
    fn name(&self) -> &str;

    /// Run until finished or until `stop` is called.
    async fn start(&self) -> Result<(), ServerError>;

    async fn stop(&self) -> Result<(), ServerError>;
}

pub struct App {
    name: String,
    servers: Vec<Arc<dyn Server>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servers: Vec::new(),
        }
    }

    pub fn with_server(mut self, server: impl Server + 'static) -> Self {
        self.servers.push(Arc::new(server));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name()).collect()
    }

    /// Run until all servers finish or Ctrl+C/SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until all servers finish or `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(app = %self.name, servers = ?self.server_names(), "app starting");

        let mut tasks = JoinSet::new();
        for server in &self.servers {
            let server = Arc::clone(server);
            tasks.spawn(async move { server.start().await });
        }

        let mut failure = None;
        tokio::pin!(shutdown);

        let all_finished = loop {
            tokio::select! {
                _ = &mut shutdown => break false,
                joined = tasks.join_next() => match joined {
                    None => break true,
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(e))) => {
                        tracing::error!(error = %e, "server failed");
                        failure = Some(e);
                        break false;
                    }
                    Some(Err(e)) => {
                        failure = Some(ServerError::Task(e.to_string()));
                        break false;
                    }
                },
            }
        };

        if !all_finished {
            for server in &self.servers {
                if let Err(e) = server.stop().await {
                    tracing::warn!(server = server.name(), error = %e, "server stop failed");
                }
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "server exited with error during shutdown");
                    }
                    Err(e) => tracing::warn!(error = %e, "server task panicked during shutdown"),
                }
            }
        }

        tracing::info!(app = %self.name, "app stopped");
        failure.map_or(Ok(()), Err)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}
