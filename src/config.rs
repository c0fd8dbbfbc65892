use std::fs::read_to_string;
use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Listen {
    /// Address the inbound publishing/watching listener binds to.
    #[serde(default = "Listen::addr")]
    pub addr: SocketAddr,
}

impl Listen {
    fn addr() -> SocketAddr {
        "127.0.0.1:3472".parse().unwrap()
    }
}

impl Default for Listen {
    fn default() -> Self {
        Self { addr: Self::addr() }
    }
}

#[derive(Deserialize, Debug)]
pub struct Callback {
    /// Port dialed back on the subscriber's IP to deliver Join/Leave
    /// notifications, unless a subscriber requires a different one.
    #[serde(default = "Callback::port")]
    pub port: u16,

    /// How long the dispatcher waits for an event-loop reply before
    /// returning "Method timeout" to the caller.
    #[serde(default = "Callback::dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Read deadline applied to each session's inbound socket, used to
    /// detect dead peers (spec §5).
    #[serde(default = "Callback::read_deadline_secs")]
    pub read_deadline_secs: u64,
}

impl Callback {
    fn port() -> u16 {
        service::DEFAULT_PORT
    }

    fn dispatch_timeout_secs() -> u64 {
        2
    }

    fn read_deadline_secs() -> u64 {
        60
    }
}

impl Default for Callback {
    fn default() -> Self {
        Self {
            port: Self::port(),
            dispatch_timeout_secs: Self::dispatch_timeout_secs(),
            read_deadline_secs: Self::read_deadline_secs(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub listen: Listen,
    #[serde(default)]
    pub callback: Callback,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: Listen::default(),
            callback: Callback::default(),
            log: Log::default(),
        }
    }
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to a JSON5 configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Overrides `listen.addr`'s port.
    #[arg(long)]
    port: Option<u16>,
}

impl Config {
    /// Reads `--config` if given, falling back to built-in defaults
    /// otherwise; `--port` always overrides whatever the file specifies.
    pub fn load() -> anyhow::Result<Self> {
        let cli = Cli::parse();

        let mut config: Self = match cli.config {
            Some(path) => {
                let raw = read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
                serde_json5::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("failed to parse config file {path}: {e}"))?
            }
            None => Self::default(),
        };

        if let Some(port) = cli.port {
            config.listen.addr.set_port(port);
        }

        Ok(config)
    }
}
