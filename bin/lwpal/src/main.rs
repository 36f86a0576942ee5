//! lwpal - Operator CLI for the LwM2M platform adaptation layer.
//!
//! Provides:
//! - `probe`: open a datagram connection, send a payload and wait for a reply
//!   through the multiplexer, optionally with a producer thread interrupting
//!   the wait
//! - `credentials`: run the PSK lookup against the configured table

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use lwpal_core::{
    ConnectionType, Handle, PlatformConfig, SecurityData, SecurityMode, SecurityOperation,
};
use lwpal_net::{ConnectionObserver, PlatformContext};

/// LwM2M platform layer probe.
#[derive(Parser)]
#[command(name = "lwpal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.lwpal/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a connection, send a payload and wait for the reply
    Probe {
        /// Server hostname or IPv4 address
        #[arg(long)]
        host: String,

        /// Server port
        #[arg(long, default_value = "5683")]
        port: String,

        /// Payload to send
        #[arg(long, default_value = "ping")]
        payload: String,

        /// Wait timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u32,

        /// Interrupt the wait from a producer thread every N milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,
    },

    /// Look up credentials for a peer URI
    Credentials {
        /// Peer URI, e.g. coaps://192.0.2.2:5684
        #[arg(long)]
        peer: String,

        /// Requested security mode
        #[arg(long, value_enum, default_value_t = ModeArg::Psk)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    None,
    Psk,
    Rpk,
    Certificate,
    Oscore,
}

impl From<ModeArg> for SecurityMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::None => SecurityMode::None,
            ModeArg::Psk => SecurityMode::PreSharedKey,
            ModeArg::Rpk => SecurityMode::RawPublicKey,
            ModeArg::Certificate => SecurityMode::Certificate,
            ModeArg::Oscore => SecurityMode::Oscore,
        }
    }
}

/// Remembers that the multiplexer found the connection closed.
///
/// A closed connection stays readable, so the wait loop has to stop on this
/// flag instead of waiting again.
#[derive(Default)]
struct ClosureObserver {
    closed: AtomicBool,
}

impl ClosureObserver {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ConnectionObserver for ClosureObserver {
    fn connection_closed(&self, handle: Handle) {
        warn!(%handle, "Server closed the connection");
        self.closed.store(true, Ordering::Release);
    }
}

/// Expand ~ to home directory.
fn expand_tilde(path: &PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.clone()
}

fn probe(
    config: PlatformConfig,
    host: &str,
    port: &str,
    payload: &str,
    timeout: u32,
    tick_ms: Option<u64>,
) -> Result<()> {
    let context = Arc::new(PlatformContext::new(config).context("Failed to create platform context")?);
    let observer = Arc::new(ClosureObserver::default());
    context.attach_observer(observer.clone());

    let handle = context
        .open(ConnectionType::Datagram, host, port)
        .with_context(|| format!("Failed to open {}:{}", host, port))?;
    context
        .send(handle, payload.as_bytes())
        .context("Failed to send payload")?;
    info!(%handle, bytes = payload.len(), "Payload sent");

    // Producer thread standing in for application code that changes engine
    // state and needs the step loop to re-evaluate.
    let running = Arc::new(AtomicBool::new(true));
    let producer = tick_ms.map(|tick| {
        let context = Arc::clone(&context);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(tick));
                let _guard = context.lock();
                debug!("Producer tick");
                context.interrupt();
            }
        })
    });

    let outcome = await_reply(&context, handle, &observer, timeout);

    running.store(false, Ordering::Relaxed);
    if let Some(producer) = producer {
        join_producer(producer);
    }
    context.close(handle).context("Failed to close connection")?;

    match outcome? {
        Some(reply) => {
            println!("Reply ({} bytes): {}", reply.len(), String::from_utf8_lossy(&reply));
            Ok(())
        }
        None => bail!("No reply within {} seconds", timeout),
    }
}

/// Joins the producer thread; returns false if it panicked.
fn join_producer(producer: thread::JoinHandle<()>) -> bool {
    let joined = producer.join().is_ok();
    if !joined {
        warn!("Producer thread panicked");
    }
    joined
}

/// Waits until `handle` has a reply, the server closes the connection or
/// `timeout` seconds pass. Interrupts only restart the wait.
fn await_reply(
    context: &PlatformContext,
    handle: Handle,
    observer: &ClosureObserver,
    timeout: u32,
) -> Result<Option<Vec<u8>>> {
    let deadline = context.uptime_secs().saturating_add(timeout);
    loop {
        let remaining = deadline.saturating_sub(context.uptime_secs());
        let mut set = [Some(handle)];
        let ready = context.wait(&mut set, remaining.max(1))?;

        if observer.is_closed() {
            bail!("Server closed the connection");
        }
        if ready > 0 {
            let mut buf = [0u8; 2048];
            let n = context.recv(handle, &mut buf).context("Failed to receive reply")?;
            return Ok(Some(buf[..n].to_vec()));
        }
        if context.uptime_secs() >= deadline {
            return Ok(None);
        }
        debug!("Woken without data, waiting again");
    }
}

fn credentials(config: PlatformConfig, peer: &str, mode: ModeArg) -> Result<()> {
    let context = PlatformContext::new(config).context("Failed to create platform context")?;
    match context.security_lookup(peer.as_bytes(), mode.into(), SecurityOperation::Read) {
        Ok(SecurityData::Psk(psk)) => {
            println!("Peer: {}", peer);
            println!("  Identity: {}", String::from_utf8_lossy(&psk.identity));
            println!("  Secret length: {} bytes", psk.secret.len());
        }
        Ok(SecurityData::Released) => println!("Peer: {} (nothing held)", peer),
        Err(e) => {
            let code = e.coap_code();
            println!("Peer: {}: {} ({}.{:02})", peer, e, code >> 5, code & 0x1F);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let config = PlatformConfig::load(&expand_tilde(&cli.config))?;

    match cli.command {
        Commands::Probe {
            host,
            port,
            payload,
            timeout,
            tick_ms,
        } => probe(config, &host, &port, &payload, timeout, tick_ms),
        Commands::Credentials { peer, mode } => credentials(config, &peer, mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let path = PathBuf::from("~/.lwpal/config.toml");
        let expanded = expand_tilde(&path);

        if let Some(home) = dirs::home_dir() {
            assert!(expanded.starts_with(&home));
            assert!(expanded.ends_with(".lwpal/config.toml"));
        }
    }

    #[test]
    fn test_absolute_path_unchanged() {
        let path = PathBuf::from("/etc/lwpal/config.toml");
        assert_eq!(expand_tilde(&path), path);
    }

    #[test]
    fn test_cli_parses_probe() {
        let cli = Cli::try_parse_from([
            "lwpal", "-vv", "probe", "--host", "127.0.0.1", "--port", "5683", "--tick-ms", "250",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Probe { host, tick_ms, timeout, .. } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(tick_ms, Some(250));
                assert_eq!(timeout, 5);
            }
            Commands::Credentials { .. } => panic!("expected probe"),
        }
    }

    /// Context with a connection to a fresh loopback server.
    fn connected() -> (
        PlatformContext,
        Arc<ClosureObserver>,
        Handle,
        std::net::UdpSocket,
        std::net::SocketAddr,
    ) {
        let context = PlatformContext::new(PlatformConfig::default()).unwrap();
        let observer = Arc::new(ClosureObserver::default());
        context.attach_observer(observer.clone());

        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = server.local_addr().unwrap().port().to_string();
        let handle = context
            .open(ConnectionType::Datagram, "127.0.0.1", &port)
            .unwrap();

        context.send(handle, b"ping").unwrap();
        let mut buf = [0u8; 16];
        let (_, client) = server.recv_from(&mut buf).unwrap();
        (context, observer, handle, server, client)
    }

    #[test]
    fn test_await_reply_returns_payload() {
        let (context, observer, handle, server, client) = connected();
        server.send_to(b"pong", client).unwrap();

        let reply = await_reply(&context, handle, &observer, 5).unwrap();
        assert_eq!(reply.as_deref(), Some(&b"pong"[..]));
        context.close(handle).unwrap();
    }

    #[test]
    fn test_await_reply_stops_on_closed_connection() {
        let (context, observer, handle, server, client) = connected();
        // Zero-length datagram: the server hung up.
        server.send_to(b"", client).unwrap();

        let start = std::time::Instant::now();
        let err = await_reply(&context, handle, &observer, 5).unwrap_err();
        assert!(err.to_string().contains("closed"), "{err}");
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(observer.is_closed());
        context.close(handle).unwrap();
    }

    #[test]
    fn test_join_producer_survives_panic() {
        assert!(join_producer(thread::spawn(|| {})));
        assert!(!join_producer(thread::spawn(|| panic!("producer failed"))));
    }

    #[test]
    fn test_mode_mapping() {
        assert_eq!(SecurityMode::from(ModeArg::Psk), SecurityMode::PreSharedKey);
        assert_eq!(SecurityMode::from(ModeArg::Rpk), SecurityMode::RawPublicKey);
    }
}
