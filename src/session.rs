use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, warn};

use crate::config::MAX_TIMEOUT;
use crate::error::PingError;
use crate::packet;
use crate::transport::{Link, Reception};

const DEFAULT_BUFFER_SIZE: usize = 1024;

pub const FIRST_SEQUENCE: u16 = 1;

#[derive(Debug, Clone)]
pub struct Reply {
    pub from: Ipv4Addr,
    pub bytes_received: usize, // ICMP only, IPv4 header excluded
    pub datagram: Vec<u8>,
    pub received_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub sequence: u16,
    pub destination: Ipv4Addr,
    pub bytes_sent: usize,
    pub sent_at: SystemTime,
    pub reply: Option<Reply>,
}

impl ProbeResult {
    /// Time between sending and receiving. A clock that stepped backwards is
    /// measured as the size of the step rather than a negative time.
    pub fn round_trip(&self) -> Option<Duration> {
        let reply = self.reply.as_ref()?;
        Some(match reply.received_at.duration_since(self.sent_at) {
            Ok(rtt) => rtt,
            Err(skew) => skew.duration(),
        })
    }

    pub fn round_trip_millis(&self) -> Option<f64> {
        self.round_trip().map(|rtt| rtt.as_micros() as f64 / 1000f64)
    }
}

pub trait ProbeObserver {
    fn sent(&mut self, destination: Ipv4Addr, packet: &[u8]);
    fn finished(&mut self, result: &ProbeResult);
    fn send_failed(&mut self, sequence: u16, error: &str);
}

pub struct EchoSession<L> {
    link: L,
    destination: Ipv4Addr,
    identifier: u16, // Used as 'identifier' word to match echo requests/replies
    timeout: Duration,
    payload: Vec<u8>,
    buffer: Vec<u8>,
    first_sequence: u16,
}

impl<L: Link> EchoSession<L> {
    pub fn new(link: L, destination: Ipv4Addr, identifier: u16, timeout: Duration, payload: Vec<u8>) -> Self {
        EchoSession {
            link,
            destination,
            identifier,
            timeout,
            payload,
            buffer: vec![0; DEFAULT_BUFFER_SIZE],
            first_sequence: FIRST_SEQUENCE,
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer = vec![0; size];
        self
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    #[cfg(test)]
    pub(crate) fn starting_at(mut self, sequence: u16) -> Self {
        self.first_sequence = sequence;
        self
    }

    #[cfg(test)]
    pub fn into_link(self) -> L {
        self.link
    }

    pub fn run_probe(&mut self, sequence: u16, observer: &mut dyn ProbeObserver) -> Result<ProbeResult, PingError> {
        let request = packet::build_echo_request(self.identifier, sequence, &self.payload)?;

        let sent_at = SystemTime::now();
        let bytes_sent = self.link.send(&request, self.destination)?;
        observer.sent(self.destination, &request[..bytes_sent.min(request.len())]);

        let reply = self.await_reply(sequence)?;
        if let Some(reply) = &reply {
            if reply.received_at < sent_at {
                warn!("system clock moved backwards during probe {}", sequence);
            }
        }

        let result = ProbeResult {
            sequence,
            destination: self.destination,
            bytes_sent,
            sent_at,
            reply,
        };
        observer.finished(&result);
        Ok(result)
    }

    fn await_reply(&mut self, sequence: u16) -> Result<Option<Reply>, PingError> {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.timeout)
            .unwrap_or_else(|| start + MAX_TIMEOUT);

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (len, from) = match self.link.receive(&mut self.buffer, deadline - now)? {
                Reception::TimedOut => return Ok(None),
                Reception::Datagram { len, from } => (len, from),
            };
            let datagram = &self.buffer[..len];

            let message = match packet::decode(datagram) {
                Ok(m) => m,
                Err(e) => {
                    debug!("discarding datagram from {}: {}", from, e);
                    continue;
                }
            };

            // Make sure that this is the packet that we were looking for
            if !message.is_echo_reply_to(self.identifier, sequence) {
                debug!(
                    "ignoring ICMP type {} code {} id {} seq {} from {}",
                    message.header.message_type,
                    message.header.message_code,
                    message.header.identifier,
                    message.header.sequence_num,
                    from
                );
                continue;
            }
            debug!(
                "echo reply seq {} from {} ttl {} ({} byte IP header)",
                sequence, from, message.ttl, message.ip_header_len
            );

            return Ok(Some(Reply {
                from,
                bytes_received: message.icmp_len,
                datagram: datagram.to_vec(),
                received_at: SystemTime::now(),
            }));
        }
    }

    /// One probe, or, with `repeat`, probes every `interval` until `stop` is
    /// raised. Sequence numbers wrap after 65535.
    pub fn run(
        &mut self,
        repeat: bool,
        interval: Duration,
        stop: &AtomicBool,
        observer: &mut dyn ProbeObserver,
    ) -> Result<(), PingError> {
        if !repeat {
            self.run_probe(self.first_sequence, observer)?;
            return Ok(());
        }

        let mut sequence = self.first_sequence;
        while !stop.load(Ordering::SeqCst) {
            match self.run_probe(sequence, observer) {
                Ok(_) => {}
                Err(e @ PingError::SendFailed(_)) => {
                    observer.send_failed(sequence, &e.to_string());
                }
                Err(e) => return Err(e),
            }
            sequence = sequence.wrapping_add(1);

            if stop.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(interval);
        }

        Ok(())
    }
}
