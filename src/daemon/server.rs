//! Unix socket IPC server for daemon communication

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::daemon::ipc::{
    deserialize_request, read_frame, serialize_response, DaemonRequest, DaemonResponse,
};
use crate::lifecycle::{ErrorKind, LifecycleError};

/// Command channel for the server
pub type CommandSender = mpsc::Sender<(DaemonRequest, mpsc::Sender<DaemonResponse>)>;
pub type CommandReceiver = mpsc::Receiver<(DaemonRequest, mpsc::Sender<DaemonResponse>)>;

/// IPC server that listens on a Unix socket
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Start listening on the socket
    pub async fn start(&mut self) -> Result<()> {
        // Remove stale socket file if it exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind {:?}", self.socket_path))?;
        info!("IPC server listening on {:?}", self.socket_path);
        self.listener = Some(listener);

        Ok(())
    }

    /// Run the server, forwarding commands to the handler
    pub async fn run(&mut self, cmd_tx: CommandSender) -> Result<()> {
        let listener = self.listener.take().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let tx = cmd_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, tx).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Handle a single client connection
async fn handle_connection(mut stream: UnixStream, cmd_tx: CommandSender) -> Result<()> {
    debug!("New client connection");

    while let Some(body) = read_frame(&mut stream).await? {
        // Anything we cannot decode is a command we do not implement
        let request = match deserialize_request(&body) {
            Ok(req) => req,
            Err(e) => {
                warn!("Rejecting unrecognized request: {}", e);
                let response = DaemonResponse::from(LifecycleError::NotImplemented(e.to_string()));
                stream.write_all(&serialize_response(&response)?).await?;
                continue;
            }
        };

        debug!("Received request: {:?}", request);
        let is_shutdown = matches!(request, DaemonRequest::Shutdown);

        let (resp_tx, mut resp_rx) = mpsc::channel(1);
        cmd_tx.send((request, resp_tx)).await?;

        let response = resp_rx.recv().await.unwrap_or(DaemonResponse::Error {
            kind: ErrorKind::Internal,
            message: "Handler closed".to_string(),
        });
        stream.write_all(&serialize_response(&response)?).await?;

        if is_shutdown {
            break;
        }
    }

    debug!("Client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::ipc::{deserialize_response, serialize_request};

    async fn read_response(stream: &mut UnixStream) -> DaemonResponse {
        let body = read_frame(stream).await.unwrap().expect("response frame");
        deserialize_response(&body).unwrap()
    }

    #[tokio::test]
    async fn unknown_request_is_not_implemented_and_connection_survives() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let connection = tokio::spawn(handle_connection(server_side, cmd_tx));

        tokio::spawn(async move {
            while let Some((request, resp_tx)) = cmd_rx.recv().await {
                let response = match request {
                    DaemonRequest::Ping => DaemonResponse::Pong,
                    _ => DaemonResponse::Ok,
                };
                let _ = resp_tx.send(response).await;
            }
        });

        let body = br#""Pause""#;
        let mut frame = (body.len() as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(body);
        client.write_all(&frame).await.unwrap();

        match read_response(&mut client).await {
            DaemonResponse::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::NotImplemented);
                assert!(message.starts_with("Not implemented"), "{}", message);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        client
            .write_all(&serialize_request(&DaemonRequest::Ping).unwrap())
            .await
            .unwrap();
        assert!(matches!(read_response(&mut client).await, DaemonResponse::Pong));

        drop(client);
        connection.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_handler_reports_internal_error() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        tokio::spawn(handle_connection(server_side, cmd_tx));

        // Receive the request but drop the reply slot
        tokio::spawn(async move {
            let mut cmd_rx: CommandReceiver = cmd_rx;
            while let Some((_request, resp_tx)) = cmd_rx.recv().await {
                drop(resp_tx);
            }
        });

        client
            .write_all(&serialize_request(&DaemonRequest::Stop).unwrap())
            .await
            .unwrap();
        match read_response(&mut client).await {
            DaemonResponse::Error { kind, .. } => assert_eq!(kind, ErrorKind::Internal),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
