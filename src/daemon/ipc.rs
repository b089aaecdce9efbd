//! IPC protocol definitions for daemon communication
//!
//! Frames are a 4-byte little-endian length followed by a JSON body.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::lifecycle::{ErrorKind, LifecycleError};
use crate::notification::{Action, Prompt};
use crate::storage::Phase;

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Request sent from the CLI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonRequest {
    /// Start a session; `None` uses the daemon's default entrypoint
    Start {
        entrypoint: Option<String>,
        destination: String,
    },

    /// Begin recording
    Record,

    /// Save and end the session
    Save,

    /// Stop the session
    Stop,

    /// Read the persisted phase
    QueryPhase,

    /// Clear the persisted phase without a transition
    ResetState,

    /// A notification button was tapped
    Tap { action: Action },

    /// Prompt for the persisted phase
    Prompt,

    /// Ping to check if daemon is alive
    Ping,

    /// Shutdown the daemon
    Shutdown,
}

/// Response sent from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    /// Phase after a command, or the queried phase
    Phase(Phase),

    /// Current prompt, if any
    Prompt(Option<Prompt>),

    /// Pong response to ping
    Pong,

    /// Acknowledgment (for shutdown, reset, etc.)
    Ok,

    /// Error response
    Error { kind: ErrorKind, message: String },
}

impl From<LifecycleError> for DaemonResponse {
    fn from(err: LifecycleError) -> Self {
        DaemonResponse::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<Phase, LifecycleError>> for DaemonResponse {
    fn from(result: Result<Phase, LifecycleError>) -> Self {
        match result {
            Ok(phase) => DaemonResponse::Phase(phase),
            Err(e) => e.into(),
        }
    }
}

fn frame<T: Serialize>(message: &T) -> crate::Result<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(crate::BackgroundWorkError::Ipc(format!(
            "message too large: {} bytes",
            json.len()
        )));
    }
    let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
    bytes.extend(json);
    Ok(bytes)
}

/// Serialize a request to bytes for IPC
pub fn serialize_request(request: &DaemonRequest) -> crate::Result<Vec<u8>> {
    frame(request)
}

/// Serialize a response to bytes for IPC
pub fn serialize_response(response: &DaemonResponse) -> crate::Result<Vec<u8>> {
    frame(response)
}

/// Read one frame body.
///
/// `None` when the peer hung up before sending a length prefix.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> crate::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(crate::BackgroundWorkError::Ipc(format!(
            "frame too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Deserialize a request from bytes
pub fn deserialize_request(data: &[u8]) -> crate::Result<DaemonRequest> {
    Ok(serde_json::from_slice(data)?)
}

/// Deserialize a response from bytes
pub fn deserialize_response(data: &[u8]) -> crate::Result<DaemonResponse> {
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_carries_length_prefix() {
        let bytes = serialize_request(&DaemonRequest::Record).unwrap();
        let len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len() - 4);
        assert!(matches!(
            deserialize_request(&bytes[4..]).unwrap(),
            DaemonRequest::Record
        ));
    }

    #[test]
    fn unknown_request_does_not_decode() {
        assert!(deserialize_request(br#""Pause""#).is_err());
    }

    #[tokio::test]
    async fn read_frame_returns_body_then_eof() {
        let bytes = serialize_request(&DaemonRequest::Ping).unwrap();
        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();

        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(matches!(deserialize_request(&body).unwrap(), DaemonRequest::Ping));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_length() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        let mut reader = tokio_test::io::Builder::new().read(&len).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn lifecycle_errors_keep_their_kind() {
        let response = DaemonResponse::from(Err::<Phase, _>(LifecycleError::AlreadyRunning));
        match response {
            DaemonResponse::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::AlreadyRunning);
                assert!(message.contains("already running"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
