use std::net::Ipv4Addr;
use std::time::Duration;

use crate::packet::{ICMP_HEADER_LEN, IPV4_MAX_HEADER_LEN};
use crate::range::AddressRange;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TTL: u32 = 56;
pub const DEFAULT_PAYLOAD_SIZE: usize = 0;

pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Largest payload that still fits a 65535 byte IPv4 datagram.
pub const MAX_PAYLOAD_SIZE: usize = 65535 - 20 - ICMP_HEADER_LEN;

const RECEIVE_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Single(Ipv4Addr),
    Range(AddressRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub destination: Destination,
    pub repeat_until_stopped: bool,
    pub show_raw_sent: bool,
    pub show_raw_received: bool,
    pub timeout: Duration,
    pub interval: Duration,
    pub ttl: u32,
    pub payload_size: usize,
}

impl SessionConfig {
    pub fn new(destination: Destination) -> Self {
        SessionConfig {
            destination,
            repeat_until_stopped: false,
            show_raw_sent: false,
            show_raw_received: false,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
            ttl: DEFAULT_TTL,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }

    pub fn address_range(&self) -> bool {
        matches!(self.destination, Destination::Range(_))
    }

    pub fn receive_buffer_size(&self) -> usize {
        RECEIVE_BUFFER_SIZE.max(IPV4_MAX_HEADER_LEN + ICMP_HEADER_LEN + self.payload_size)
    }
}
