//! Event loop, ordered registry, watcher table and session/dispatch
//! machinery for the discovery coordinator (C1-C6). The accept loop and
//! wire codec that feed this crate live in the binary crate and
//! `discovery-codec` respectively.

pub mod callback;
pub mod dispatcher;
pub mod event_loop;
pub mod registry;
pub mod session;
pub mod watchers;

pub use callback::{CallbackClient, CallbackError, RecordingCallbackClient, TcpCallbackClient};
pub use dispatcher::{Dispatcher, RequestError};
pub use event_loop::{spawn as spawn_event_loop, Event, EventLoopHandle};
pub use registry::{AddOutcome, RemoveOutcome, ServiceEntry, ServiceRegistry};
pub use session::{next_conn_id, normalize_remote_ip, ConnectionSession, DEFAULT_PORT};
pub use watchers::{Handle, WatcherTable};
