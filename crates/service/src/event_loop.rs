//! The single-threaded event loop (C5): sole mutator of the registry and
//! watcher table, fed by a bounded queue of tagged events.

use std::sync::Arc;

use codec::request::ServiceDef;
use tokio::sync::{mpsc, oneshot};

use crate::callback::CallbackClient;
use crate::registry::{AddOutcome, RemoveOutcome, ServiceEntry, ServiceRegistry};
use crate::watchers::{Handle, WatcherTable};

/// Recommended event queue depth (spec §4.4).
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// A unit of work for the event loop. Encoded as a tagged enum rather than
/// a boxed closure, per spec §9's design note, to keep the loop's mutation
/// surface exhaustively matchable.
pub enum Event {
    Join {
        entry: ServiceEntry,
        reply: oneshot::Sender<AddOutcome>,
    },
    Leave {
        entry: ServiceEntry,
        reply: oneshot::Sender<RemoveOutcome>,
    },
    Watch {
        group: String,
        handle: Handle,
        client: Arc<dyn CallbackClient>,
    },
    Ignore {
        group: String,
        handle: Handle,
    },
    Snapshot {
        group: String,
        reply: oneshot::Sender<Vec<ServiceEntry>>,
    },
    Teardown {
        conn_id: u32,
    },
}

fn to_wire(entry: &ServiceEntry) -> ServiceDef {
    ServiceDef {
        host: Some(entry.host.clone()),
        port: entry.port,
        group: entry.group.clone(),
        custom_data: if entry.custom_data.is_empty() {
            None
        } else {
            Some(entry.custom_data.clone())
        },
    }
}

/// Launches one independent, fire-and-forget task per watcher of `group`.
/// Never awaited by the caller, so the event loop never blocks on a
/// remote peer (spec §4.5).
fn fan_out(watchers: &WatcherTable, group: &str, entry: &ServiceEntry, is_join: bool) {
    let wire = to_wire(entry);
    for client in watchers.clients_for(group) {
        let wire = wire.clone();
        tokio::spawn(async move {
            let result = if is_join {
                client.join(&wire).await
            } else {
                client.leave(&wire).await
            };
            if let Err(err) = result {
                log::warn!(
                    "callback delivery failed: group={} host={:?} port={} err={}",
                    wire.group,
                    wire.host,
                    wire.port,
                    err
                );
            }
        });
    }
}

/// A handle to the running event loop. Cloning it is cheap; every clone
/// shares the same underlying queue.
#[derive(Clone)]
pub struct EventLoopHandle {
    sender: mpsc::Sender<Event>,
}

impl EventLoopHandle {
    pub fn send(&self, event: Event) -> Result<(), mpsc::error::TrySendError<Event>> {
        self.sender.try_send(event)
    }

    pub async fn send_async(&self, event: Event) {
        if self.sender.send(event).await.is_err() {
            log::error!("event loop has shut down; dropping event");
        }
    }
}

/// Spawns the event loop task and returns a handle for submitting events.
/// The loop owns the registry and watcher table for the lifetime of the
/// process; there is no explicit shutdown (spec §4.4).
pub fn spawn() -> EventLoopHandle {
    let (sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    tokio::spawn(run(receiver));
    EventLoopHandle { sender }
}

async fn run(mut receiver: mpsc::Receiver<Event>) {
    let mut registry = ServiceRegistry::new();
    let mut watchers = WatcherTable::new();

    while let Some(event) = receiver.recv().await {
        handle_event(&mut registry, &mut watchers, event);
    }
}

fn handle_event(registry: &mut ServiceRegistry, watchers: &mut WatcherTable, event: Event) {
    match event {
        Event::Join { entry, reply } => {
            let outcome = registry.add(entry.clone());
            if matches!(outcome, AddOutcome::Added | AddOutcome::Replaced) {
                fan_out(watchers, &entry.group, &entry, true);
            }
            let _ = reply.send(outcome);
        }
        Event::Leave { entry, reply } => {
            let outcome = registry.remove(&entry);
            if outcome == RemoveOutcome::Removed {
                fan_out(watchers, &entry.group, &entry, false);
            }
            let _ = reply.send(outcome);
        }
        Event::Watch {
            group,
            handle,
            client,
        } => {
            watchers.watch(&group, handle, client);
        }
        Event::Ignore { group, handle } => {
            watchers.ignore(&group, handle);
        }
        Event::Snapshot { group, reply } => {
            let snapshot: Vec<_> = registry.iterate_group(&group).cloned().collect();
            let _ = reply.send(snapshot);
        }
        Event::Teardown { conn_id } => {
            watchers.remove_handle(conn_id);
            for entry in registry.remove_by_conn(conn_id) {
                fan_out(watchers, &entry.group, &entry, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{RecordedCall, RecordingCallbackClient};

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
    async fn join_and_snapshot_round_trip() {
        let handle = spawn();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send_async(Event::Join {
                entry: entry("web", "10.0.0.1", 80, 1),
                reply: reply_tx,
            })
            .await;
        assert_eq!(reply_rx.await.unwrap(), AddOutcome::Added);

        let (snap_tx, snap_rx) = oneshot::channel();
        handle
            .send_async(Event::Snapshot {
                group: "web".into(),
                reply: snap_tx,
            })
            .await;
        let snapshot = snap_rx.await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].host, "10.0.0.1");
    }

    #[tokio::test]
    async fn watcher_receives_join_then_leave_on_teardown() {
        let handle = spawn();
        let client = Arc::new(RecordingCallbackClient::default());

        handle
            .send_async(Event::Watch {
                group: "web".into(),
                handle: 99,
                client: client.clone(),
            })
            .await;

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send_async(Event::Join {
                entry: entry("web", "10.0.0.2", 80, 1),
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap();

        handle.send_async(Event::Teardown { conn_id: 1 }).await;

        // give fan-out tasks a chance to run
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], RecordedCall::Join(_)));
        assert!(matches!(calls[1], RecordedCall::Leave(_)));
    }
}
