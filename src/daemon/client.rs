//! IPC client for communicating with the daemon

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::config::Settings;
use crate::daemon::ipc::{
    deserialize_response, read_frame, serialize_request, DaemonRequest, DaemonResponse,
};

/// Client for communicating with the daemon
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect to the daemon
    pub async fn connect(settings: &Settings) -> Result<Self> {
        Self::connect_path(&settings.socket_path()).await
    }

    /// Connect to a daemon listening on `socket_path`
    pub async fn connect_path(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to daemon at {:?}. Is the daemon running? Try: background-work daemon start",
                    socket_path
                )
            })?;

        Ok(Self { stream })
    }

    /// Send a request and wait for response
    pub async fn send(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        self.stream.write_all(&serialize_request(&request)?).await?;

        let body = read_frame(&mut self.stream)
            .await?
            .context("Daemon closed the connection")?;

        deserialize_response(&body).context("Failed to parse response")
    }

    /// Whether the daemon answers a ping
    pub async fn ping(&mut self) -> bool {
        matches!(self.send(DaemonRequest::Ping).await, Ok(DaemonResponse::Pong))
    }
}
