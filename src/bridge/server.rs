//! Bridge server - listener and per-connection loop

use std::time::{Duration, Instant};

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::common::{config::Config, paths, Result};
use crate::gdb::SessionOptions;
use crate::resolver::Resolver;

use super::handler::Handler;
use super::transport;

/// Serve one client until it disconnects
///
/// The client's debugger session does not outlive the connection.
pub async fn serve_connection<R, W>(handler: &mut Handler, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    let result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Client disconnected");
                break Ok(());
            }
            Err(e) => {
                tracing::error!("Error reading request: {}", e);
                break Err(e.into());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let reply = handler.handle_line(&line).await;
        let mut json = match reply.to_line() {
            Ok(json) => json,
            Err(e) => break Err(e.into()),
        };
        json.push('\n');

        if let Err(e) = write_reply(&mut writer, &json).await {
            tracing::debug!("Client went away while writing reply: {}", e);
            break Ok(());
        }
    };

    handler.close().await;
    result
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Why the accept loop woke up
enum Wake {
    Stop,
    Served,
    Tick,
}

/// Bridge server
pub struct Bridge {
    config: Config,
    options: SessionOptions,
    resolver: Resolver,
}

impl Bridge {
    pub fn new(config: Config, options: SessionOptions) -> Self {
        let resolver = Resolver::from_config(&config);
        Self {
            config,
            options,
            resolver,
        }
    }

    fn handler(&self) -> Handler {
        Handler::new(self.options.clone(), self.resolver.clone())
    }

    /// Serve a single client over stdin/stdout
    pub async fn run_stdio(&self) -> Result<()> {
        tracing::info!("Bridge serving on stdio");
        let mut handler = self.handler();
        serve_connection(&mut handler, tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Accept clients on the local socket, one at a time, until signalled
    /// or idle for too long
    pub async fn run(&self) -> Result<()> {
        let name = self
            .config
            .bridge
            .socket_name
            .clone()
            .unwrap_or_else(paths::socket_name);

        let listener = transport::create_listener(&name)?;
        tracing::info!(socket = %name, "Bridge listening");

        let idle_timeout = Duration::from_secs(self.config.bridge.idle_timeout_minutes * 60);
        let mut last_activity = Instant::now();

        loop {
            if last_activity.elapsed() > idle_timeout {
                tracing::info!("Idle timeout reached, shutting down bridge");
                break;
            }

            match self.accept_once(&listener).await? {
                Wake::Stop => break,
                Wake::Served => last_activity = Instant::now(),
                Wake::Tick => {}
            }
        }

        tracing::info!("Cleaning up bridge resources");
        drop(listener);
        transport::cleanup(&name)?;
        tracing::info!("Bridge shutdown complete");
        Ok(())
    }

    /// Wait for one client or a stop signal
    #[cfg(unix)]
    async fn accept_once(&self, listener: &transport::Listener) -> Result<Wake> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                Ok(Wake::Stop)
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                Ok(Wake::Stop)
            }
            accepted = listener.accept() => {
                self.on_accept(accepted).await;
                Ok(Wake::Served)
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                // Periodic wakeup to check idle timeout
                Ok(Wake::Tick)
            }
        }
    }

    #[cfg(not(unix))]
    async fn accept_once(&self, listener: &transport::Listener) -> Result<Wake> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down gracefully");
                Ok(Wake::Stop)
            }
            accepted = listener.accept() => {
                self.on_accept(accepted).await;
                Ok(Wake::Served)
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => Ok(Wake::Tick),
        }
    }

    async fn on_accept(&self, accepted: std::io::Result<transport::Stream>) {
        match accepted {
            Ok(stream) => {
                tracing::debug!("Client connected");
                let (reader, writer) = tokio::io::split(stream);
                let mut handler = self.handler();
                if let Err(e) = serve_connection(&mut handler, reader, writer).await {
                    tracing::error!("Error handling client: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            }
        }
    }
}
