//! Accept loop and per-session request handling (C7).

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use codec::request::Request;
use codec::response::Response;
use codec::Decoder;
use service::{next_conn_id, ConnectionSession, Dispatcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::pool::SessionPool;
use crate::statistics::{Stat, Statistics};

/// Per-session lifecycle state (spec §4.6): `Cleaned` is the only state
/// that releases the session's resources (its read buffer, back to the
/// pool). Logged at every transition; nothing currently branches on it
/// beyond that, since each state's work is exactly one step of the accept
/// loop below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Accepted,
    Initialising,
    Running,
    Closing,
    Cleaned,
}

fn enter(id: u32, state: SessionState) {
    log::debug!("session id={id} lifecycle={state:?}");
}

/// Binds the configured listen address. Broken out from [`run`] so tests
/// can bind an ephemeral port and learn its address before serving.
pub async fn bind(config: &Config) -> std::io::Result<TcpListener> {
    TcpListener::bind(config.listen.addr).await
}

/// Accepts connections until the listener itself fails; each accepted
/// connection gets its own session and reader/responder task. Exit code
/// is nonzero only if binding the listener fails (spec §6).
pub async fn run(
    config: Arc<Config>,
    stats: Arc<Statistics>,
    dispatcher: Dispatcher,
    pool: Arc<SessionPool>,
) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    log::info!("listening addr={}", config.listen.addr);
    serve(listener, config, stats, dispatcher, pool).await
}

/// Runs the accept loop over an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    stats: Arc<Statistics>,
    dispatcher: Dispatcher,
    pool: Arc<SessionPool>,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true).ok();

        let config = config.clone();
        let stats = stats.clone();
        let dispatcher = dispatcher.clone();
        let pool = pool.clone();

        tokio::spawn(async move {
            let id = next_conn_id();
            stats.record(Stat::SessionAccepted);
            enter(id, SessionState::Accepted);
            log::info!("session accepted id={id} peer={peer}");

            enter(id, SessionState::Initialising);
            let mut buf = pool.checkout();
            let session = ConnectionSession::new(id, peer, dispatcher, config.callback.port);

            enter(id, SessionState::Running);
            if let Err(err) = handle_session(socket, &session, &config, &stats, &mut buf).await {
                log::warn!("session id={id} closed: {err}");
            }

            enter(id, SessionState::Closing);
            session.teardown().await;
            pool.release(buf);

            stats.record(Stat::SessionClosed);
            enter(id, SessionState::Cleaned);
            log::info!("session torn down id={id} stats={:?}", stats.snapshot());
        });
    }
}

async fn handle_session(
    mut socket: TcpStream,
    session: &ConnectionSession,
    config: &Config,
    stats: &Statistics,
    buf: &mut BytesMut,
) -> anyhow::Result<()> {
    let read_deadline = Duration::from_secs(config.callback.read_deadline_secs);

    loop {
        let frame = loop {
            match Decoder::frame_size(buf) {
                Ok(size) if buf.len() >= size => break buf.split_to(size),
                Ok(_) | Err(codec::Error::Truncated) => {
                    // Header (or header + payload) incomplete so far; read more.
                }
                Err(err) => {
                    // Bad magic or an oversized declared size can never
                    // become valid by reading further — close immediately
                    // without waiting for (or parsing) the rest (spec S5).
                    log::warn!("framing error, closing connection: {err}");
                    return Ok(());
                }
            }

            let mut chunk = [0u8; 4096];
            let read = tokio::time::timeout(read_deadline, socket.read(&mut chunk))
                .await
                .map_err(|_| anyhow::anyhow!("read deadline exceeded"))??;

            if read == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..read]);
        };

        let (request, _) = match Decoder::decode(&frame) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("framing error, closing connection: {err}");
                return Ok(());
            }
        };

        stats.record(Stat::RequestHandled);

        if let Some(response) = dispatch(session, request, stats).await {
            let out = codec::encode_response(&response);
            socket.write_all(&out).await?;
        }
    }
}

async fn dispatch(session: &ConnectionSession, request: Request, stats: &Statistics) -> Option<Response> {
    match request {
        Request::Join {
            host,
            port,
            group,
            custom_data,
        } => Some(match session.join(host, port, group, custom_data).await {
            Ok(()) => Response::Ack,
            Err(err) => Response::Error(err.to_string()),
        }),
        Request::Leave { host, port, group } => {
            Some(match session.leave(host, port, group).await {
                Ok(()) => Response::Ack,
                Err(err) => Response::Error(err.to_string()),
            })
        }
        Request::Snapshot { group } => Some(match session.snapshot(group).await {
            Ok(entries) => Response::Snapshot(entries),
            Err(err) => Response::Error(err.to_string()),
        }),
        Request::Watch { groups } => Some(match session.watch(groups).await {
            Ok(()) => Response::Ack,
            Err(err) => {
                if matches!(err, service::RequestError::WatchFailed) {
                    stats.record(Stat::CallbackDialFailed);
                }
                Response::Error(err.to_string())
            }
        }),
        // Resetting the read deadline already happened by virtue of this
        // request having been read; no reply is defined for Heartbeat
        // (spec §9 open question 3).
        Request::Heartbeat => None,
    }
}
