use std::net::TcpListener;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use mailingset::{Config, LettreTransport, SmtpServer, Universe};

/// SMTP server for set-algebraic operations on mailing lists.
#[derive(Debug, Parser)]
#[command(name = "mailingset", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Listen address, overriding the configured bind and port
    #[arg(long)]
    listen: Option<String>,
}

fn main() {
    let env = env_logger::Env::new().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env).init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("cannot load {}: {e}", args.config.display());
            process::exit(1);
        }
    };

    let universe = match Universe::load(&config.data.lists_dir, &config.data.symbols_file) {
        Ok(universe) => universe,
        Err(e) => {
            error!("cannot load lists: {e}");
            process::exit(1);
        }
    };
    info!(
        "serving {} lists and {} aliases for {}",
        universe.list_count(),
        universe.alias_count(),
        config.incoming.domain,
    );

    let server = match SmtpServer::new(config, universe, Arc::new(LettreTransport)) {
        Ok(server) => server,
        Err(e) => {
            error!("cannot start server: {e}");
            process::exit(1);
        }
    };

    let result = match &args.listen {
        Some(addr) => match TcpListener::bind(addr) {
            Ok(listener) => {
                info!("listening on {addr}");
                server.serve(listener)
            }
            Err(e) => {
                error!("cannot bind {addr}: {e}");
                process::exit(1);
            }
        },
        None => server.start(),
    };

    if let Err(e) = result {
        error!("server terminated: {e}");
        process::exit(1);
    }
}
