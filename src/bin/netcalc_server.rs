use std::{
    error::Error,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use clap::Parser;
use log::info;
use netcalc::protocol::CalcServer;

/// Equation-solving network service.
///
/// Listens on 0.0.0.0 and answers each connection's equation batch with
/// computed results.
#[derive(Debug, Parser)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 31337, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// Number of worker threads to use
    #[arg(short = 'n', long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..))]
    threads: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    ctrlc::set_handler(|| {
        info!("interrupt received, shutting down");
        std::process::exit(0);
    })?;

    let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cli.port);
    let server = CalcServer::new(address, cli.threads)?;

    server.listen()?;
    Ok(())
}
