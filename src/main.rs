//! mcom - Simple IP Multicast Communication Tool
//!
//! Sends and receives small JSON messages over a UDP multicast group.
//! Send mode reads one JSON value from stdin and ships it as a single
//! datagram; listen mode joins the group and prints every message.

mod config;
mod protocol;
mod transport;

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use protocol::DEFAULT_GROUP;
use transport::{Handler, Mcom, McomContext, McomError, TransportError};

/// mcom - Simple IP multicast communication tool
#[derive(Parser)]
#[command(name = "mcom")]
#[command(version = "0.1.0")]
#[command(about = "Send and receive small JSON messages over UDP multicast", long_about = None)]
struct Cli {
    /// Multicast group address
    #[arg(value_name = "MADDR", default_value_t = DEFAULT_GROUP.to_string())]
    maddr: String,

    /// Listen mode: print received messages
    #[arg(short, long)]
    listen: bool,

    /// UDP port (default from config file, then 23344)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Prints each received message as `sender --> message`
struct StreamDumpHandler<W: Write + Send> {
    out: W,
}

impl StreamDumpHandler<std::io::Stdout> {
    fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> Handler for StreamDumpHandler<W> {
    fn handle(&mut self, _ctx: &McomContext, sender: SocketAddr, message: &Value) {
        if let Err(e) = writeln!(self.out, "{} --> {}", sender, message) {
            tracing::warn!("Could not write message to output: {}", e);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    let port = cli.port.unwrap_or(config.network.port);
    let mcast = config.mcast_config();

    let mut mcom = Mcom::with_config(&cli.maddr, port, mcast).await?;
    tracing::debug!("Using multicast endpoint {}", mcom.endpoint());

    if cli.listen {
        listen(mcom).await
    } else {
        let message: Value = serde_json::from_reader(std::io::stdin().lock())
            .map_err(|e| anyhow::anyhow!("could not read JSON from stdin: {}", e))?;
        mcom.send(&message).await?;
        Ok(())
    }
}

/// Block in the watch loop until a fatal error or Ctrl-C
async fn listen(mut mcom: Mcom) -> anyhow::Result<()> {
    mcom.add_handler(Box::new(StreamDumpHandler::stdout()));

    let stop = mcom.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            stop.stop().await;
        }
    });

    mcom.watch().await?;
    Ok(())
}

/// Map errors to the documented exit codes: 1 data-size, 2 transport,
/// 3 framing, 4 anything else
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<McomError>() {
        Some(McomError::DataSize { .. }) => 1,
        Some(McomError::Transport(_)) | Some(McomError::NoHandlers) => 2,
        Some(McomError::Framing(_)) => 3,
        None => match err.downcast_ref::<TransportError>() {
            Some(_) => 2,
            None => 4,
        },
    }
}
