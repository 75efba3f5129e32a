mod checksum;
mod cli;
mod config;
mod error;
mod packet;
mod range;
mod report;
mod session;
mod transport;

use std::net::Ipv4Addr;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use rand::random;

use config::{Destination, SessionConfig};
use error::PingError;
use report::Reporter;
use session::EchoSession;
use transport::Transport;

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    // Exit only once everything, the socket included, has been dropped.
    process::exit(run());
}

fn run() -> i32 {
    let config = match cli::parse_from(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => {
            if e.exit_code() == 0 {
                println!("{}", e);
            } else {
                eprintln!("{}", e);
            }
            return e.exit_code();
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    if config.repeat_until_stopped {
        let s = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            s.store(true, Ordering::SeqCst);
        }) {
            eprintln!("pingme: unable to set Ctrl-C handler: {}", e);
            return 1;
        }
    }

    let outcome = match config.destination {
        Destination::Single(address) => ping(&config, address, &stop),
        Destination::Range(addresses) => range::sweep(&config, addresses, stop, |_| open_transport(&config))
            .map(|report| Reporter::stdio(&config).sweep(&report)),
    };

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("pingme: {}", e);
            1
        }
    }
}

fn open_transport(config: &SessionConfig) -> Result<Transport, PingError> {
    let mut transport = Transport::open()?;
    transport.configure(config.timeout, config.ttl)?;
    Ok(transport)
}

fn ping(config: &SessionConfig, destination: Ipv4Addr, stop: &AtomicBool) -> Result<(), PingError> {
    let transport = open_transport(config)?;
    let mut session = EchoSession::new(
        transport,
        destination,
        random::<u16>(),
        config.timeout,
        packet::payload(config.payload_size),
    )
    .with_buffer_size(config.receive_buffer_size());
    debug!("pinging {} with identifier {:#06x}", destination, session.identifier());

    let mut reporter = Reporter::stdio(config);
    session.run(config.repeat_until_stopped, config.interval, stop, &mut reporter)
}
