//! Run process components until one fails or the process is asked to stop.
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::dev::ServerHandle;
use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::FutureExt;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

/// A process component exited while the process was meant to be running.
#[derive(Debug, thiserror::Error)]
#[error("process component '{0}' exited unexpectedly")]
pub struct ComponentExited(&'static str);

/// Builder to collect the process components to watch.
pub struct ShutdownManager {
    grace: Duration,
    handles: Vec<ServerHandle>,
    logger: slog::Logger,
    running: FuturesUnordered<BoxFuture<'static, (&'static str, Result<()>)>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(logger: slog::Logger, grace: Duration) -> ShutdownManager {
        ShutdownManager {
            grace,
            handles: Vec::new(),
            logger,
            running: FuturesUnordered::new(),
            tasks: Vec::new(),
        }
    }

    /// Watch an actix-web server, stopping it gracefully on shutdown.
    pub fn watch_actix(&mut self, name: &'static str, server: Server) -> &mut Self {
        self.handles.push(server.handle());
        let server = tokio::spawn(server);
        let server = async move {
            let result = match server.await {
                Ok(result) => result.map_err(anyhow::Error::from),
                Err(error) => Err(anyhow::Error::from(error)),
            };
            (name, result)
        };
        self.running.push(server.boxed());
        self
    }

    /// Watch a background task that runs until the process stops.
    ///
    /// Background tasks are aborted once all servers have stopped.
    pub fn watch_task(&mut self, task: JoinHandle<()>) -> &mut Self {
        self.tasks.push(task);
        self
    }

    /// Wait for a shutdown signal or for any server to exit, then stop everything.
    pub async fn wait(mut self) -> Result<()> {
        let result = tokio::select! {
            signal = shutdown_signal() => {
                signal?;
                slog::info!(self.logger, "Shutdown requested, stopping the process");
                Ok(())
            }
            Some((name, result)) = self.running.next() => {
                match result {
                    Ok(()) => Err(anyhow::anyhow!(ComponentExited(name))),
                    Err(error) => Err(error.context(ComponentExited(name))),
                }
            }
        };
        if let Err(error) = &result {
            slog::error!(
                self.logger, "Process component failed";
                "error" => format!("{:#}", error),
            );
        }

        // Stop servers gracefully, within the grace period.
        let stopping: Vec<_> = self
            .handles
            .iter()
            .map(|handle| handle.stop(true))
            .collect();
        let stopped = async {
            futures_util::future::join_all(stopping).await;
            while self.running.next().await.is_some() {}
        };
        if tokio::time::timeout(self.grace, stopped).await.is_err() {
            slog::warn!(
                self.logger, "Graceful shutdown timed out";
                "grace_sec" => self.grace.as_secs(),
            );
        }
        for task in &self.tasks {
            task.abort();
        }
        result
    }
}

/// Wait for the process to receive Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => (),
        };
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
