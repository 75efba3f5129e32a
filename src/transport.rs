use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket};

use crate::error::PingError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reception {
    Datagram { len: usize, from: Ipv4Addr },
    TimedOut,
}

pub trait Link {
    fn send(&mut self, packet: &[u8], destination: Ipv4Addr) -> Result<usize, PingError>;

    /// Block for at most `wait` for the next datagram from any sender.
    fn receive(&mut self, buf: &mut [u8], wait: Duration) -> Result<Reception, PingError>;
}

pub struct Transport {
    socket: Option<Socket>,
    read_timeout: Option<Duration>,
}

impl Transport {
    pub fn open() -> Result<Self, PingError> {
        let stype = socket2::Type::raw().cloexec();
        let socket = Socket::new(Domain::ipv4(), stype, Some(Protocol::icmpv4())).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                PingError::PermissionDenied(e)
            } else {
                PingError::SocketCreateFailed(e)
            }
        })?;
        debug!("opened raw ICMP socket");

        Ok(Transport::from_socket(socket))
    }

    pub(crate) fn from_socket(socket: Socket) -> Self {
        Transport {
            socket: Some(socket),
            read_timeout: None,
        }
    }

    pub fn configure(&mut self, receive_timeout: Duration, ttl: u32) -> Result<(), PingError> {
        let socket = self.socket()?;
        socket
            .set_read_timeout(Some(receive_timeout))
            .map_err(|source| PingError::ConfigurationFailed {
                option: "socket receive timeout",
                source,
            })?;
        socket.set_ttl(ttl).map_err(|source| PingError::ConfigurationFailed {
            option: "IP TTL",
            source,
        })?;

        self.read_timeout = Some(receive_timeout);
        debug!("receive timeout {:?}, ttl {}", receive_timeout, ttl);
        Ok(())
    }

    /// Release the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("closed raw ICMP socket");
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn socket(&self) -> Result<&Socket, PingError> {
        self.socket.as_ref().ok_or(PingError::SocketClosed)
    }
}

impl Link for Transport {
    fn send(&mut self, packet: &[u8], destination: Ipv4Addr) -> Result<usize, PingError> {
        // Port is ignored for ICMP
        let address = SockAddr::from(SocketAddr::from((destination, 0)));
        self.socket()?
            .send_to(packet, &address)
            .map_err(PingError::SendFailed)
    }

    fn receive(&mut self, buf: &mut [u8], wait: Duration) -> Result<Reception, PingError> {
        // A zero read timeout means "block forever" to the OS.
        if wait == Duration::from_secs(0) {
            return Ok(Reception::TimedOut);
        }

        if self.read_timeout != Some(wait) {
            self.socket()?
                .set_read_timeout(Some(wait))
                .map_err(|source| PingError::ConfigurationFailed {
                    option: "socket receive timeout",
                    source,
                })?;
            self.read_timeout = Some(wait);
        }

        loop {
            match self.socket()?.recv_from(buf) {
                Ok((len, from)) => {
                    let from = from
                        .as_inet()
                        .map(|a| *a.ip())
                        .unwrap_or(Ipv4Addr::UNSPECIFIED);
                    trace!("{} bytes from {}", len, from);
                    return Ok(Reception::Datagram { len, from });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Ok(Reception::TimedOut);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PingError::ReceiveFailed(e)),
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;

    use socket2::Type;

    use super::*;

    fn udp_transport() -> (Transport, SocketAddr) {
        let socket = Socket::new(Domain::ipv4(), Type::dgram(), None).unwrap();
        socket
            .bind(&SockAddr::from(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))))
            .unwrap();
        let local = socket.local_addr().unwrap().as_std().unwrap();
        (Transport::from_socket(socket), local)
    }

    #[test]
    fn receive_times_out_without_traffic() {
        let (mut transport, _) = udp_transport();
        transport.configure(Duration::from_millis(50), 56).unwrap();

        let mut buf = [0u8; 64];
        let got = transport.receive(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(got, Reception::TimedOut);
    }

    #[test]
    fn zero_wait_is_an_immediate_timeout() {
        let (mut transport, _) = udp_transport();
        let mut buf = [0u8; 64];
        let got = transport.receive(&mut buf, Duration::from_secs(0)).unwrap();
        assert_eq!(got, Reception::TimedOut);
    }

    #[test]
    fn receive_reports_sender() {
        let (mut transport, local) = udp_transport();
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        peer.send_to(b"pong", local).unwrap();

        let mut buf = [0u8; 64];
        match transport.receive(&mut buf, Duration::from_secs(2)).unwrap() {
            Reception::Datagram { len, from } => {
                assert_eq!(&buf[..len], b"pong");
                assert_eq!(from, Ipv4Addr::LOCALHOST);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let (mut transport, _) = udp_transport();
        assert!(transport.is_open());
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }

    #[test]
    fn closed_transport_refuses_io() {
        let (mut transport, _) = udp_transport();
        transport.close();

        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(10)),
            Err(PingError::SocketClosed)
        ));
        assert!(matches!(
            transport.send(&[0; 8], Ipv4Addr::LOCALHOST),
            Err(PingError::SocketClosed)
        ));
        assert!(matches!(
            transport.configure(Duration::from_secs(1), 56),
            Err(PingError::SocketClosed)
        ));
    }
}
