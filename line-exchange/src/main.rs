//! Entry point for `line-exchange`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, file locations).

use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use line_exchange::config::{
    default_item_names, DEFAULT_ARTIFACT_NAME, DEFAULT_CLIENT_OUTPUT, DEFAULT_PORT,
};
use line_exchange::connection::Connection;
use line_exchange::lines::{DirSinks, FileSink};
use line_exchange::scheduler::RandomPick;
use line_exchange::session::{self, ServerOptions};
use line_exchange::socket::Socket;
use line_exchange::ExchangeConfig;

/// Reliable exchange of line-oriented files over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct Tuning {
    /// Milliseconds to wait for an acknowledgment before retransmitting.
    #[arg(long, global = true, default_value_t = 500)]
    ack_timeout_ms: u64,

    /// Milliseconds to keep answering a repeated END.
    #[arg(long, global = true, default_value_t = 1000)]
    grace_ms: u64,

    /// Give up after this many retransmissions of one packet.
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Seed for the chunk scheduler.
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive files, merge them and send the result back.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
        bind: SocketAddr,

        /// Directory for received files and the merged artifact.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// File name of the merged artifact.
        #[arg(short, long, default_value = DEFAULT_ARTIFACT_NAME)]
        artifact: String,

        /// Item names the client is expected to send.
        #[arg(long = "expect", value_name = "NAME")]
        expected: Vec<String>,
    },
    /// Send files to a server and fetch the merged result.
    Client {
        /// Server as HOST or HOST:PORT.
        #[arg(short, long)]
        server: String,

        /// Where to write the merged file received back.
        #[arg(short, long, default_value = DEFAULT_CLIENT_OUTPUT)]
        output: PathBuf,

        /// Files to send (default: file_1.txt … file_10.txt).
        files: Vec<PathBuf>,
    },
}

impl Tuning {
    fn config(&self) -> ExchangeConfig {
        ExchangeConfig {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            grace: Duration::from_millis(self.grace_ms),
            max_retries: self.max_retries,
            ..ExchangeConfig::default()
        }
    }

    fn pick(&self) -> RandomPick<rand::rngs::StdRng> {
        match self.seed {
            Some(seed) => RandomPick::seeded(seed),
            None => RandomPick::from_entropy(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let mut pick = cli.tuning.pick();
    let mut config = cli.tuning.config();

    match cli.mode {
        Mode::Server {
            bind,
            out_dir,
            artifact,
            expected,
        } => {
            config.artifact_name = artifact;
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            log::info!("Listening on {}", socket.local_addr);

            let options = ServerOptions {
                artifact_path: Some(out_dir.join(&config.artifact_name)),
                expected_items: expected,
            };
            let mut conn = Connection::new(socket, config);
            let report =
                session::run_server(&mut conn, DirSinks::new(out_dir), &mut pick, &options)
                    .await
                    .context("server session failed")?;
            log::info!(
                "Served {} item(s) as {} line(s) in {} packet(s)",
                report.items.len(),
                report.artifact.len(),
                report.download.packets
            );
        }
        Mode::Client {
            server,
            output,
            files,
        } => {
            let files = if files.is_empty() {
                default_item_names().into_iter().map(PathBuf::from).collect()
            } else {
                files
            };
            // Every file must open before anything goes on the wire.
            let sources = session::open_sources(&files)?;

            let target = server_target(&server);
            let socket = Socket::connect(&target)
                .await
                .with_context(|| format!("cannot reach {target}"))?;
            log::info!("Sending {} file(s) to {target}", sources.len());

            let out = output.clone();
            let sinks = move |_item: &str| FileSink::create(out.clone());
            let mut conn = Connection::new(socket, config);
            let report = session::run_client(&mut conn, sources, &mut pick, sinks)
                .await
                .context("client session failed")?;

            if !output.exists() {
                // Nothing was uploaded, so nothing came back; still leave the file.
                File::create(&output)
                    .with_context(|| format!("cannot create {}", output.display()))?;
            }
            log::info!(
                "Uploaded {} item(s) in {} packet(s); {} line(s) written to {}",
                report.upload.items,
                report.upload.packets,
                report.artifact.len(),
                output.display()
            );
        }
    }
    Ok(())
}

/// `HOST[:PORT]` with the well-known port filled in when absent.
fn server_target(server: &str) -> String {
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    match server.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => server.to_string(),
        _ => format!("{server}:{DEFAULT_PORT}"),
    }
}
