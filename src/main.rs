use clap::Parser;
use postbox::{MailConfig, MailServer, StaticCredentials};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Store-and-forward mail server
#[derive(Debug, Parser)]
#[command(name = "postbox", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:6543")]
    listen: String,

    /// Directory holding the per-user mailboxes
    #[arg(long, default_value = "spool")]
    spool: PathBuf,

    /// Ban list file, one origin address per line
    #[arg(long, default_value = "blacklist.txt")]
    ban_file: PathBuf,

    /// Number of worker threads serving connections
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Credentials file of user:password lines
    #[arg(long)]
    users: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let args = Args::parse();

    let auth = StaticCredentials::from_file(&args.users)?;
    info!(users = auth.len(), "credentials loaded");

    let config = MailConfig {
        addr: args.listen,
        spool_dir: args.spool,
        ban_file: args.ban_file,
        workers: args.workers,
    };
    let server = MailServer::new(config, Arc::new(auth))?;

    let handle = server.shutdown_handle();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("shutdown requested");
            handle.shutdown();
        }
    });

    server.start()?;
    Ok(())
}
