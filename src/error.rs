use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingError {
    #[error("permission denied opening raw ICMP socket (are you root?): {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("unable to create socket: {0}")]
    SocketCreateFailed(#[source] io::Error),

    #[error("unable to set {option}: {source}")]
    ConfigurationFailed {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    #[error("socket is closed")]
    SocketClosed,

    #[error("unable to encode packet: {0}")]
    Encode(#[from] bincode::Error),

    #[error("worker for {0} panicked")]
    WorkerPanicked(std::net::Ipv4Addr),
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),

    #[error("not an IPv4 datagram (version {0})")]
    NotIpv4(u8),

    #[error("not an ICMP datagram (protocol {0})")]
    NotIcmp(u8),

    #[error("bad IPv4 header length {0}")]
    BadHeaderLength(usize),

    #[error("ICMP checksum mismatch")]
    BadChecksum,

    #[error("malformed header: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for DecodeError {
    fn from(e: bincode::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}
