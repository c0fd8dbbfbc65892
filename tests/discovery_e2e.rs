use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use codec::request::{Request, ServiceDef};
use codec::response::Response;
use codec::Decoder;
use discovery_server::config::Config;
use discovery_server::pool::SessionPool;
use discovery_server::statistics::Statistics;
use service::Dispatcher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server() -> SocketAddr {
    let mut config = Config::default();
    config.listen.addr = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let listener = TcpListener::bind(config.listen.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let event_loop = service::spawn_event_loop();
    let dispatcher = Dispatcher::new(
        event_loop,
        Duration::from_secs(config.callback.dispatch_timeout_secs),
    );
    let stats = Arc::new(Statistics::default());
    let pool = Arc::new(SessionPool::new());

    tokio::spawn(discovery_server::server::serve(
        listener, config, stats, dispatcher, pool,
    ));

    addr
}

async fn send_request(socket: &mut TcpStream, request: &Request) {
    let frame = codec::encode_request(request);
    socket.write_all(&frame).await.unwrap();
}

async fn read_response(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if let Ok(size) = Decoder::frame_size(&buf) {
            if buf.len() >= size {
                let frame = buf.split_to(size);
                return frame[codec::HEADER_SIZE..].to_vec();
            }
        }
        let mut chunk = [0u8; 4096];
        let read = socket.read(&mut chunk).await.unwrap();
        assert!(read > 0, "connection closed before a response arrived");
        buf.extend_from_slice(&chunk[..read]);
    }
}

#[tokio::test]
async fn s1_join_then_snapshot_sees_the_service() {
    let addr = start_server().await;
    let mut c1 = TcpStream::connect(addr).await.unwrap();

    send_request(
        &mut c1,
        &Request::Join {
            host: Some("10.0.0.1".into()),
            port: 80,
            group: "web".into(),
            custom_data: None,
        },
    )
    .await;
    assert_eq!(Response::decode_ack(&read_response(&mut c1).await).unwrap(), Ok(()));

    send_request(&mut c1, &Request::Snapshot { group: "web".into() }).await;
    let entries = Response::decode_snapshot(&read_response(&mut c1).await).unwrap();
    assert_eq!(
        entries,
        vec![ServiceDef {
            host: Some("10.0.0.1".into()),
            port: 80,
            group: "web".into(),
            custom_data: None,
        }]
    );
}

#[tokio::test]
async fn s2_duplicate_join_from_other_connection_is_rejected() {
    let addr = start_server().await;
    let mut c1 = TcpStream::connect(addr).await.unwrap();
    let mut c2 = TcpStream::connect(addr).await.unwrap();

    let join = Request::Join {
        host: Some("10.0.0.1".into()),
        port: 80,
        group: "web".into(),
        custom_data: None,
    };
    send_request(&mut c1, &join).await;
    assert_eq!(Response::decode_ack(&read_response(&mut c1).await).unwrap(), Ok(()));

    send_request(&mut c2, &join).await;
    let result = Response::decode_ack(&read_response(&mut c2).await).unwrap();
    assert_eq!(result, Err("Unable to add service".to_string()));

    send_request(&mut c1, &Request::Snapshot { group: "web".into() }).await;
    let entries = Response::decode_snapshot(&read_response(&mut c1).await).unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn s3_watcher_sees_join_and_two_leaves_on_disconnect() {
    let addr = start_server().await;

    // The subscriber's callback dial targets (its own IP, DefaultCallbackPort),
    // so it needs a listener of its own to accept the coordinator's dial-back.
    let callback_listener = TcpListener::bind("127.0.0.1:3472").await;
    let callback_listener = match callback_listener {
        Ok(l) => l,
        Err(_) => return, // port already in use in this environment; skip
    };

    let mut watcher = TcpStream::connect(addr).await.unwrap();
    send_request(&mut watcher, &Request::Watch { groups: vec!["web".into()] }).await;

    let accept = tokio::spawn(async move {
        let (socket, _) = callback_listener.accept().await.unwrap();
        socket
    });

    let ack = Response::decode_ack(&read_response(&mut watcher).await).unwrap();
    assert_eq!(ack, Ok(()));

    let callback_socket = accept.await.unwrap();
    let mut callback_reader = tokio::io::BufReader::new(callback_socket);

    let mut publisher = TcpStream::connect(addr).await.unwrap();
    send_request(
        &mut publisher,
        &Request::Join {
            host: Some("10.0.0.2".into()),
            port: 80,
            group: "web".into(),
            custom_data: None,
        },
    )
    .await;
    assert_eq!(
        Response::decode_ack(&read_response(&mut publisher).await).unwrap(),
        Ok(())
    );

    let mut line = String::new();
    use tokio::io::AsyncBufReadExt;
    tokio::time::timeout(Duration::from_secs(1), callback_reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert!(line.contains("DiscoveryClient.Join"));
    assert!(line.contains("10.0.0.2"));

    drop(publisher);

    let mut second_line = String::new();
    tokio::time::timeout(
        Duration::from_secs(1),
        callback_reader.read_line(&mut second_line),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(second_line.contains("DiscoveryClient.Leave"));
}

#[tokio::test]
async fn s4_correct_checksum_is_accepted() {
    let addr = start_server().await;
    let mut socket = TcpStream::connect(addr).await.unwrap();

    let mut payload = vec![0u8];
    payload.extend_from_slice(b"{\"group\":\"g\",\"port\":1}");
    assert_eq!(payload.len(), 23);

    let frame = codec::encode_payload(&payload);
    socket.write_all(&frame).await.unwrap();

    let ack = Response::decode_ack(&read_response(&mut socket).await).unwrap();
    assert_eq!(ack, Ok(()));
}

#[tokio::test]
async fn s5_oversized_frame_closes_the_connection() {
    let addr = start_server().await;
    let mut socket = TcpStream::connect(addr).await.unwrap();

    let mut header = Vec::with_capacity(12);
    header.extend_from_slice(&codec::MAGIC.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    header.extend_from_slice(&(2 * 1024 * 1024u32).to_be_bytes());
    socket.write_all(&header).await.unwrap();

    let mut buf = [0u8; 16];
    let read = socket.read(&mut buf).await.unwrap();
    assert_eq!(read, 0, "server should close without echoing anything");
}

#[tokio::test]
async fn s6_empty_host_resolves_to_remote_ip() {
    let addr = start_server().await;
    let mut socket = TcpStream::connect(addr).await.unwrap();

    send_request(
        &mut socket,
        &Request::Join {
            host: None,
            port: 80,
            group: "web".into(),
            custom_data: None,
        },
    )
    .await;
    assert_eq!(Response::decode_ack(&read_response(&mut socket).await).unwrap(), Ok(()));

    send_request(&mut socket, &Request::Snapshot { group: "web".into() }).await;
    let entries = Response::decode_snapshot(&read_response(&mut socket).await).unwrap();
    assert_eq!(entries[0].host.as_deref(), Some("127.0.0.1"));
}
