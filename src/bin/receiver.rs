use std::net::SocketAddr;
use std::process::ExitCode;

use urft::{DatagramEndpoint, Receiver, UdpEndpoint};

fn usage() -> ! {
    eprintln!("usage: urft-recv <bind-ip> <bind-port>");
    std::process::exit(2);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let (Some(ip), Some(port)) = (args.next(), args.next()) else {
        usage();
    };
    if args.next().is_some() {
        usage();
    }

    let bind_addr: SocketAddr = match format!("{ip}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid bind address {ip}:{port}: {e}");
            return ExitCode::from(2);
        }
    };

    let endpoint = match UdpEndpoint::bind(bind_addr) {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("failed to bind {bind_addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Ok(local) = endpoint.local_addr() {
        log::info!("listening on {local}");
    }

    let mut receiver = Receiver::new(endpoint);
    match receiver.receive() {
        Ok(path) => {
            println!("wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("transfer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
