//! Outbound callback channel: a second TCP connection the coordinator
//! dials back to each watcher, carrying line-framed JSON-RPC `Join`/`Leave`
//! notifications (spec §6).

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use codec::request::ServiceDef;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct CallbackError(pub String);

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback error: {}", self.0)
    }
}

impl std::error::Error for CallbackError {}

/// A watcher's outbound notification sink. Implemented once over a real
/// TCP dial; a recording double is provided for tests so unit tests never
/// need a live socket.
#[async_trait]
pub trait CallbackClient: Send + Sync {
    async fn join(&self, service: &ServiceDef) -> Result<(), CallbackError>;
    async fn leave(&self, service: &ServiceDef) -> Result<(), CallbackError>;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    method: &'a str,
    params: [&'a ServiceDef; 1],
    id: u64,
}

/// Dials `(subscriber-ip, port)` once and holds the connection open for
/// the lifetime of the watch, writing one JSON-RPC request per line.
pub struct TcpCallbackClient {
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    next_id: AtomicU64,
}

impl TcpCallbackClient {
    /// Opens the callback connection. A failed dial is surfaced to the
    /// caller so that `Watch` can report "unable to connect to client".
    pub async fn dial(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (_reader, writer) = stream.into_split();
        Ok(Self {
            writer: Mutex::new(BufWriter::new(writer)),
            next_id: AtomicU64::new(0),
        })
    }

    async fn call(&self, method: &str, service: &ServiceDef) -> Result<(), CallbackError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            method,
            params: [service],
            id,
        };

        let mut line = serde_json::to_vec(&request).map_err(|e| CallbackError(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| CallbackError(e.to_string()))?;
        writer.flush().await.map_err(|e| CallbackError(e.to_string()))
    }
}

#[async_trait]
impl CallbackClient for TcpCallbackClient {
    async fn join(&self, service: &ServiceDef) -> Result<(), CallbackError> {
        self.call("DiscoveryClient.Join", service).await
    }

    async fn leave(&self, service: &ServiceDef) -> Result<(), CallbackError> {
        self.call("DiscoveryClient.Leave", service).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Join(ServiceDef),
    Leave(ServiceDef),
}

/// A test double that records every call instead of dialing a socket.
#[derive(Default)]
pub struct RecordingCallbackClient {
    calls: parking_lot::Mutex<Vec<RecordedCall>>,
}

impl RecordingCallbackClient {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CallbackClient for RecordingCallbackClient {
    async fn join(&self, service: &ServiceDef) -> Result<(), CallbackError> {
        self.calls.lock().push(RecordedCall::Join(service.clone()));
        Ok(())
    }

    async fn leave(&self, service: &ServiceDef) -> Result<(), CallbackError> {
        self.calls.lock().push(RecordedCall::Leave(service.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(host: &str, port: u16, group: &str) -> ServiceDef {
        ServiceDef {
            host: Some(host.into()),
            port,
            group: group.into(),
            custom_data: None,
        }
    }

    #[tokio::test]
    async fn recording_client_captures_calls_in_order() {
        let client = RecordingCallbackClient::default();
        client.join(&def("10.0.0.1", 80, "web")).await.unwrap();
        client.join(&def("10.0.0.2", 80, "web")).await.unwrap();
        client.leave(&def("10.0.0.1", 80, "web")).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[2], RecordedCall::Leave(_)));
    }
}
