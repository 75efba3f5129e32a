use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use log::{debug, info};
use rand::random;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::error::PingError;
use crate::packet;
use crate::session::{EchoSession, ProbeObserver, ProbeResult, FIRST_SEQUENCE};
use crate::transport::Link;

// Every address gets its own socket and thread.
pub const MAX_TARGETS: u64 = 256;

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("invalid IP-address {0}")]
    Address(String),
    #[error("invalid prefix length {0}")]
    Prefix(String),
    #[error("range start {0} is after its end {1}")]
    Reversed(Ipv4Addr, Ipv4Addr),
    #[error("range holds {0} addresses, at most {} are allowed", MAX_TARGETS)]
    TooLarge(u64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddressRange {
    start: u32,
    end: u32,
}

impl AddressRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, RangeError> {
        let (s, e) = (u32::from(start), u32::from(end));
        if s > e {
            return Err(RangeError::Reversed(start, end));
        }
        let range = AddressRange { start: s, end: e };
        if range.len() > MAX_TARGETS {
            return Err(RangeError::TooLarge(range.len()));
        }
        Ok(range)
    }

    pub fn len(&self) -> u64 {
        (self.end - self.start) as u64 + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (self.start..=self.end).map(Ipv4Addr::from)
    }
}

fn address(text: &str) -> Result<Ipv4Addr, RangeError> {
    text.parse().map_err(|_| RangeError::Address(text.to_string()))
}

impl FromStr for AddressRange {
    type Err = RangeError;

    // 10.0.0.1-10.0.0.9, 10.0.0.1-9, 10.0.0.0/29 or a lone address
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Some(dash) = text.find('-') {
            let (first, last) = (&text[..dash], &text[dash + 1..]);
            let start = address(first)?;
            let end = if last.contains('.') {
                address(last)?
            } else {
                let octet: u8 = last.parse().map_err(|_| RangeError::Address(text.to_string()))?;
                let [a, b, c, _] = start.octets();
                Ipv4Addr::new(a, b, c, octet)
            };
            return AddressRange::new(start, end);
        }

        if let Some(slash) = text.find('/') {
            let base = address(&text[..slash])?;
            let prefix: u32 = match text[slash + 1..].parse() {
                Ok(p) if p <= 32 => p,
                _ => return Err(RangeError::Prefix(text[slash + 1..].to_string())),
            };
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            let network = u32::from(base) & mask;
            let broadcast = network | !mask;
            // Network and broadcast addresses are not hosts below /31.
            let (start, end) = if prefix < 31 {
                (network + 1, broadcast - 1)
            } else {
                (network, broadcast)
            };
            if (end - start) as u64 + 1 > MAX_TARGETS {
                return Err(RangeError::TooLarge((end - start) as u64 + 1));
            }
            return AddressRange::new(Ipv4Addr::from(start), Ipv4Addr::from(end));
        }

        let single = address(text)?;
        AddressRange::new(single, single)
    }
}

#[derive(Debug)]
pub enum ProbeEvent {
    Sent { destination: Ipv4Addr, packet: Vec<u8> },
    Finished(ProbeResult),
    SendFailed { sequence: u16, error: String },
}

impl ProbeEvent {
    pub fn replay(&self, observer: &mut dyn ProbeObserver) {
        match self {
            ProbeEvent::Sent { destination, packet } => observer.sent(*destination, packet),
            ProbeEvent::Finished(result) => observer.finished(result),
            ProbeEvent::SendFailed { sequence, error } => observer.send_failed(*sequence, error),
        }
    }
}

struct ChannelObserver {
    target: Ipv4Addr,
    tx: Sender<(Ipv4Addr, ProbeEvent)>,
}

impl ChannelObserver {
    fn forward(&self, event: ProbeEvent) {
        // The aggregator outlives every worker, so a send only fails if it
        // is already gone and nobody is left to read the event.
        let _ = self.tx.send((self.target, event));
    }
}

impl ProbeObserver for ChannelObserver {
    fn sent(&mut self, destination: Ipv4Addr, packet: &[u8]) {
        self.forward(ProbeEvent::Sent {
            destination,
            packet: packet.to_vec(),
        });
    }

    fn finished(&mut self, result: &ProbeResult) {
        self.forward(ProbeEvent::Finished(result.clone()));
    }

    fn send_failed(&mut self, sequence: u16, error: &str) {
        self.forward(ProbeEvent::SendFailed {
            sequence,
            error: error.to_string(),
        });
    }
}

pub type SweepReport = BTreeMap<Ipv4Addr, Vec<ProbeEvent>>;

/// Ping every address in `range` concurrently. Only socket setup errors fail
/// the sweep; a target whose send fails keeps that failure as its own event.
pub fn sweep<L, F>(
    config: &SessionConfig,
    range: AddressRange,
    stop: Arc<AtomicBool>,
    open: F,
) -> Result<SweepReport, PingError>
where
    L: Link + Send + 'static,
    F: Fn(Ipv4Addr) -> Result<L, PingError>,
{
    info!("pinging {} addresses", range.len());

    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::new();

    // Sockets are opened up front so setup failures stop the sweep
    // before any probe is sent.
    let links = range
        .iter()
        .map(|target| open(target).map(|link| (target, link)))
        .collect::<Result<Vec<_>, _>>()?;

    for (target, link) in links {
        let tx = tx.clone();
        let stop = stop.clone();
        let config = config.clone();

        let handle = thread::spawn(move || {
            let mut session = EchoSession::new(
                link,
                target,
                random::<u16>(),
                config.timeout,
                packet::payload(config.payload_size),
            )
            .with_buffer_size(config.receive_buffer_size());
            let mut observer = ChannelObserver { target, tx };
            match session.run(config.repeat_until_stopped, config.interval, &stop, &mut observer) {
                Err(e @ PingError::SendFailed(_)) => {
                    observer.send_failed(FIRST_SEQUENCE, &e.to_string());
                    Ok(())
                }
                other => other,
            }
        });
        workers.push((target, handle));
    }
    drop(tx);

    let report = collect(rx.iter());

    for (target, handle) in workers {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(PingError::WorkerPanicked(target)),
        }
        debug!("worker for {} finished", target);
    }

    Ok(report)
}

pub fn collect<I>(events: I) -> SweepReport
where
    I: IntoIterator<Item = (Ipv4Addr, ProbeEvent)>,
{
    let mut report = SweepReport::new();
    for (target, event) in events {
        report.entry(target).or_insert_with(Vec::new).push(event);
    }
    report
}
