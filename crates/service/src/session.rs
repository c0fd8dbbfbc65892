//! Per-connection session state and request operations (C4).

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use codec::request::ServiceDef as WireServiceDef;
use tokio::sync::OnceCell;

use crate::callback::{CallbackClient, TcpCallbackClient};
use crate::dispatcher::{Dispatcher, RequestError};
use crate::registry::ServiceEntry;

/// Default port for both the inbound listener and the outbound callback
/// dial (`original_source/src/discovery/client.go`'s `DefaultPort`).
pub const DEFAULT_PORT: u16 = 3472;

/// Process-lifetime monotonic counter handing out session ids. Kept as a
/// plain atomic rather than routed through the event loop: it is the one
/// piece of shared state that genuinely needs no serialisation beyond
/// fetch-and-increment (spec §5).
static NEXT_CONN_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_conn_id() -> u32 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Normalises a loopback remote address to `127.0.0.1`, leaving every
/// other address (including IPv6) untouched. Mirrors
/// `original_source/src/discovery/connection.go`'s `getIpAddress`, which
/// only special-cases loopback.
pub fn normalize_remote_ip(addr: IpAddr) -> String {
    if addr.is_loopback() {
        "127.0.0.1".to_string()
    } else {
        addr.to_string()
    }
}

/// Per-client state created on accept and torn down when the inbound
/// connection closes.
pub struct ConnectionSession {
    pub id: u32,
    pub remote_ip: String,
    dispatcher: Dispatcher,
    callback_port: u16,
    callback_client: OnceCell<Arc<dyn CallbackClient>>,
}

impl ConnectionSession {
    /// `callback_port` is the configured default outbound callback port
    /// (`Config::callback.port`), dialed at `(remote_ip, callback_port)` on
    /// first watch.
    pub fn new(id: u32, peer: SocketAddr, dispatcher: Dispatcher, callback_port: u16) -> Self {
        Self {
            id,
            remote_ip: normalize_remote_ip(peer.ip()),
            dispatcher,
            callback_port,
            callback_client: OnceCell::new(),
        }
    }

    fn resolved_host(&self, host: Option<String>) -> String {
        match host {
            Some(h) if !h.is_empty() => h,
            _ => self.remote_ip.clone(),
        }
    }

    /// Stamps `connId` and substitutes an empty host with this session's
    /// remote IP, then asks the event loop to add the service.
    pub async fn join(
        &self,
        host: Option<String>,
        port: u16,
        group: String,
        custom_data: Option<Vec<u8>>,
    ) -> Result<(), RequestError> {
        let entry = ServiceEntry {
            group,
            host: self.resolved_host(host),
            port,
            custom_data: custom_data.unwrap_or_default(),
            conn_id: self.id,
        };
        self.dispatcher.join(entry).await
    }

    pub async fn leave(
        &self,
        host: Option<String>,
        port: u16,
        group: String,
    ) -> Result<(), RequestError> {
        let entry = ServiceEntry {
            group,
            host: self.resolved_host(host),
            port,
            custom_data: Vec::new(),
            conn_id: self.id,
        };
        self.dispatcher.leave(entry).await
    }

    pub async fn snapshot(&self, group: String) -> Result<Vec<WireServiceDef>, RequestError> {
        let entries = self.dispatcher.snapshot(group).await?;
        Ok(entries
            .into_iter()
            .map(|e| WireServiceDef {
                host: Some(e.host),
                port: e.port,
                group: e.group,
                custom_data: if e.custom_data.is_empty() {
                    None
                } else {
                    Some(e.custom_data)
                },
            })
            .collect())
    }

    /// Lazily dials the callback connection on first use, then registers
    /// the session as a watcher of every requested group.
    pub async fn watch(&self, groups: Vec<String>) -> Result<(), RequestError> {
        let client = self.callback_client_or_dial().await?;
        for group in groups {
            self.dispatcher.watch(group, self.id, client.clone()).await;
        }
        Ok(())
    }

    pub async fn ignore(&self, group: String) {
        self.dispatcher.ignore(group, self.id).await;
    }

    async fn callback_client_or_dial(&self) -> Result<Arc<dyn CallbackClient>, RequestError> {
        if let Some(client) = self.callback_client.get() {
            return Ok(client.clone());
        }

        let addr: SocketAddr = format!("{}:{}", self.remote_ip, self.callback_port)
            .parse()
            .map_err(|_| RequestError::WatchFailed)?;
        let dialed = TcpCallbackClient::dial(addr)
            .await
            .map_err(|_| RequestError::WatchFailed)?;
        let client: Arc<dyn CallbackClient> = Arc::new(dialed);

        Ok(self
            .callback_client
            .get_or_init(|| async move { client })
            .await
            .clone())
    }

    /// Runs connection teardown: remove this session's watcher
    /// registrations and every service it owns, fanning out Leave
    /// notifications for the latter (spec §4.6).
    pub async fn teardown(&self) {
        self.dispatcher.teardown(self.id).await;
    }
}
