//! Request entry points (C6): build a reply channel, enqueue the matching
//! event, wait with a bounded timeout. This is the only way session code
//! touches the registry or watcher table.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::callback::CallbackClient;
use crate::event_loop::{Event, EventLoopHandle};
use crate::registry::{AddOutcome, RemoveOutcome, ServiceEntry};
use crate::watchers::Handle;

/// Default dispatcher reply timeout (spec §4.5 recommends ~2s).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// The four semantic error strings from spec §7. `Display` produces
/// exactly these strings since they are returned to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    UnableToAdd,
    UnableToRemove,
    WatchFailed,
    Timeout,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::UnableToAdd => "Unable to add service",
            Self::UnableToRemove => "Unable to remove service",
            Self::WatchFailed => "Watch failed: unable to connect to client",
            Self::Timeout => "Method timeout",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for RequestError {}

/// Enqueues events on the event loop and awaits their reply, enforcing
/// [`DEFAULT_TIMEOUT`]. Holds no state of its own beyond the loop handle,
/// so it is cheap to clone per session.
#[derive(Clone)]
pub struct Dispatcher {
    handle: EventLoopHandle,
    timeout: Duration,
}

impl Dispatcher {
    /// `timeout` is the configured dispatcher reply timeout
    /// (`Config::callback.dispatch_timeout_secs`); pass [`DEFAULT_TIMEOUT`]
    /// to use the spec's recommended default.
    pub fn new(handle: EventLoopHandle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, RequestError> {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(_) => Err(RequestError::Timeout),
        }
    }

    pub async fn join(&self, entry: ServiceEntry) -> Result<(), RequestError> {
        let (reply, rx) = oneshot::channel();
        self.handle.send_async(Event::Join { entry, reply }).await;
        match self.await_reply(rx).await? {
            AddOutcome::Added | AddOutcome::Replaced => Ok(()),
            AddOutcome::Rejected => Err(RequestError::UnableToAdd),
        }
    }

    pub async fn leave(&self, entry: ServiceEntry) -> Result<(), RequestError> {
        let (reply, rx) = oneshot::channel();
        self.handle.send_async(Event::Leave { entry, reply }).await;
        match self.await_reply(rx).await? {
            RemoveOutcome::Removed => Ok(()),
            RemoveOutcome::NotFound => Err(RequestError::UnableToRemove),
        }
    }

    pub async fn snapshot(&self, group: String) -> Result<Vec<ServiceEntry>, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.handle
            .send_async(Event::Snapshot { group, reply })
            .await;
        self.await_reply(rx).await
    }

    /// Registers a watcher handle. The dial that may fail with
    /// `WatchFailed` happens before this call, at the session layer; by
    /// the time an event reaches the loop the client already exists.
    pub async fn watch(&self, group: String, handle: Handle, client: Arc<dyn CallbackClient>) {
        self.handle
            .send_async(Event::Watch {
                group,
                handle,
                client,
            })
            .await;
    }

    /// Never fails (spec §4.3).
    pub async fn ignore(&self, group: String, handle: Handle) {
        self.handle.send_async(Event::Ignore { group, handle }).await;
    }

    pub async fn teardown(&self, conn_id: u32) {
        self.handle.send_async(Event::Teardown { conn_id }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop;

    fn entry(group: &str, host: &str, port: u16, conn_id: u32) -> ServiceEntry {
        ServiceEntry {
            group: group.into(),
            host: host.into(),
            port,
            custom_data: Vec::new(),
            conn_id,
        }
    }

    #[tokio::test]
    async fn rejected_join_surfaces_unable_to_add() {
        let dispatcher = Dispatcher::new(event_loop::spawn(), DEFAULT_TIMEOUT);
        dispatcher.join(entry("web", "a", 1, 1)).await.unwrap();
        let err = dispatcher.join(entry("web", "a", 1, 2)).await.unwrap_err();
        assert_eq!(err, RequestError::UnableToAdd);
        assert_eq!(err.to_string(), "Unable to add service");
    }

    #[tokio::test]
    async fn leave_not_found_surfaces_unable_to_remove() {
        let dispatcher = Dispatcher::new(event_loop::spawn(), DEFAULT_TIMEOUT);
        let err = dispatcher.leave(entry("web", "a", 1, 1)).await.unwrap_err();
        assert_eq!(err, RequestError::UnableToRemove);
    }

    #[tokio::test]
    async fn timeout_elapses_when_loop_never_replies() {
        let (sender, _receiver) = tokio::sync::mpsc::channel(1);
        // `_receiver` is held but never polled, so nothing ever drains the
        // event; construct a dispatcher around it directly to exercise the
        // timeout path without depending on event_loop internals.
        drop(sender);
        let dispatcher = Dispatcher::new(event_loop::spawn(), Duration::from_millis(1));
        // A legitimate request against a real (fast) loop should still
        // succeed well within an artificially short timeout in practice;
        // this test instead asserts the error text is exactly the spec
        // string when a timeout does occur, using a channel we drop
        // ourselves to force the race.
        let (reply, rx) = oneshot::channel::<AddOutcome>();
        drop(reply);
        let result = dispatcher.await_reply(rx).await;
        assert_eq!(result.unwrap_err(), RequestError::Timeout);
        assert_eq!(RequestError::Timeout.to_string(), "Method timeout");
    }
}
