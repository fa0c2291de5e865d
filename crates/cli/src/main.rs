//! `natalg`: run either side of the SIP ALG connect-back.
//!
//! ```text
//! # public side
//! natalg -l --lp 5060
//! # behind the NAT
//! natalg --lp 4444 --rp 5060 --ip 192.168.1.20 --host 203.0.113.7
//! ```

use std::net::IpAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use natalg_traversal::logging::{parse_log_level, setup_logging, LoggingConfig};
use natalg_traversal::message::precompile;
use natalg_traversal::{Initiator, Responder, Role, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "natalg",
    about = "Open a reverse TCP connection into a NAT through its SIP ALG",
    version
)]
struct Cli {
    /// Listen for incoming connections; this makes it a server
    #[arg(short = 'l', long = "listen")]
    listen: bool,

    /// The port to listen on locally (server and client)
    #[arg(long = "lp", value_name = "PORT", env = "NATALG_LOCAL_PORT")]
    local_port: Option<String>,

    /// The port to connect to (client)
    #[arg(long = "rp", value_name = "PORT")]
    remote_port: Option<String>,

    /// The local NAT ip to connect back to (client)
    #[arg(long = "ip", value_name = "ADDR")]
    local_ip: Option<String>,

    /// The host to connect to (client)
    #[arg(long = "host")]
    host: Option<String>,

    /// Interface address to bind listening sockets on
    #[arg(long = "bind", value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// Reject inbound messages larger than this many bytes (server)
    #[arg(long = "max-message-size", value_name = "BYTES")]
    max_message_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info", env = "NATALG_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long = "log-json")]
    log_json: bool,

    /// Include source file and line in log events
    #[arg(long = "log-file-info")]
    log_file_info: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            listen: self.listen,
            local_port: self.local_port.clone(),
            remote_port: self.remote_port.clone(),
            local_ip: self.local_ip.clone(),
            host: self.host.clone(),
            bind_ip: self.bind,
            max_message_size: self.max_message_size,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let level = parse_log_level(&cli.log_level)?;
    let mut logging = LoggingConfig::new(level);
    if cli.log_json {
        logging = logging.with_json();
    }
    if cli.log_file_info {
        logging = logging.with_file_info();
    }
    setup_logging(logging)?;

    precompile().context("message templates are malformed")?;

    match cli.settings().resolve()? {
        Role::Responder(config) => {
            let responder = Responder::bind(config)
                .await
                .context("unable to start SIP server")?;

            responder
                .serve_with_shutdown(async {
                    if tokio::signal::ctrl_c().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
        }
        Role::Initiator(config) => {
            let initiator = Initiator::arm(config)
                .await
                .context("unable to open socket for listening")?;

            let receipt = initiator.run().await?;
            info!("connect-back from {}", receipt.peer);
            println!("received message from remote server: `{}`", receipt.line);
        }
    }

    Ok(())
}
