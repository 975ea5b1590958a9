use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use urft::{DatagramEndpoint, Sender, UdpEndpoint};

fn usage() -> ! {
    eprintln!("usage: urft-send <file> <server-ip> <server-port>");
    std::process::exit(2);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let (Some(file), Some(ip), Some(port)) = (args.next(), args.next(), args.next()) else {
        usage();
    };
    if args.next().is_some() {
        usage();
    }

    let peer: SocketAddr = match format!("{ip}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid server address {ip}:{port}: {e}");
            return ExitCode::from(2);
        }
    };

    let endpoint = match UdpEndpoint::bind_ephemeral() {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("failed to open a socket: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Ok(local) = endpoint.local_addr() {
        log::info!("bound {local}, sending to {peer}");
    }

    let mut sender = Sender::new(endpoint, peer);
    match sender.send_file(&PathBuf::from(file)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("transfer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
