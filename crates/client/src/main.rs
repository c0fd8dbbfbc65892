//! Thin CLI front end over the discovery wire protocol (spec §6 — the
//! front end itself is out of scope; only its names and defaults are
//! fixed by the specification).

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use codec::request::Request;
use codec::response::Response;
use codec::Decoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(about = env!("CARGO_PKG_DESCRIPTION"), version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = service_default_port())]
    port: u16,

    #[command(subcommand)]
    verb: Verb,
}

fn service_default_port() -> u16 {
    3472
}

#[derive(Subcommand)]
enum Verb {
    Join {
        group: String,
        port: u16,
        #[arg(long)]
        host: Option<String>,
    },
    Leave {
        group: String,
        port: u16,
        #[arg(long)]
        host: Option<String>,
    },
    Watch {
        groups: Vec<String>,
    },
    Snapshot {
        group: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let mut socket = TcpStream::connect(addr).await?;

    let request = match cli.verb {
        Verb::Join { group, port, host } => Request::Join {
            host,
            port,
            group,
            custom_data: None,
        },
        Verb::Leave { group, port, host } => Request::Leave { host, port, group },
        Verb::Watch { groups } => Request::Watch { groups },
        Verb::Snapshot { group } => Request::Snapshot { group },
    };
    let is_snapshot = matches!(request, Request::Snapshot { .. });

    let frame = codec::encode_request(&request);
    socket.write_all(&frame).await?;

    let mut buf = bytes::BytesMut::with_capacity(4096);
    let response_frame = loop {
        match Decoder::frame_size(&buf) {
            Ok(size) if buf.len() >= size => break buf.split_to(size),
            Ok(_) | Err(codec::Error::Truncated) => {}
            Err(err) => anyhow::bail!("malformed response frame: {err}"),
        }
        let mut chunk = [0u8; 4096];
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            anyhow::bail!("connection closed before a response arrived");
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    // Responses carry no tag byte, so the payload is interpreted
    // according to which request we sent.
    let payload = &response_frame[codec::HEADER_SIZE..];
    if is_snapshot {
        let entries = Response::decode_snapshot(payload)?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        match Response::decode_ack(payload)? {
            Ok(()) => println!("ok"),
            Err(message) => anyhow::bail!(message),
        }
    }

    Ok(())
}
