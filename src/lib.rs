pub mod config;
pub mod pool;
pub mod server;
pub mod statistics;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use pool::SessionPool;
use service::Dispatcher;
use statistics::Statistics;

/// Wires up the event loop, dispatcher and accept loop, then runs the
/// accept loop to completion (which, barring a listener failure, is
/// forever). Broken out from `main` so integration tests can start a
/// real server in-process (mirrors the teacher's `server_main`).
pub async fn server_main(config: Arc<Config>) -> anyhow::Result<()> {
    let event_loop = service::spawn_event_loop();
    let dispatcher = Dispatcher::new(
        event_loop,
        Duration::from_secs(config.callback.dispatch_timeout_secs),
    );
    let stats = Arc::new(Statistics::default());
    let pool = Arc::new(SessionPool::new());

    server::run(config, stats, dispatcher, pool).await
}
