use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::error::{DecodeError, PingError};

pub const ECHO_REQUEST: u8 = 8;
pub const ECHO_REPLY: u8 = 0;

pub const IPPROTO_ICMP: u8 = 1;

pub const ICMP_HEADER_LEN: usize = 8;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV4_MAX_HEADER_LEN: usize = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IcmpEchoHeader {
    pub message_type: u8,
    pub message_code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence_num: u16,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Ipv4Header {
    pub version_and_header_len: u8,
    pub type_of_service: u8,
    pub datagram_length: u16,
    pub ip_identifier: u16,
    pub flags_and_frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source_ip: u32,
    pub destination_ip: u32,
}

impl Ipv4Header {
    pub fn version(&self) -> u8 {
        self.version_and_header_len >> 4
    }

    /// Header length in bytes; the field counts 32 bit words.
    pub fn header_len(&self) -> usize {
        4 * (self.version_and_header_len & 0x0F) as usize
    }
}

// ICMP headers are big endian with fixed width integers.
fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Result<Vec<u8>, PingError> {
    let header = IcmpEchoHeader {
        message_type: ECHO_REQUEST,
        message_code: 0,
        checksum: 0,
        identifier,
        sequence_num: sequence,
    };

    let mut packet = wire().serialize(&header)?;
    packet.extend_from_slice(payload);
    checksum::set_checksum(&mut packet, 1);

    Ok(packet)
}

pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct IcmpMessage {
    pub header: IcmpEchoHeader,
    pub ip_header_len: usize,
    pub icmp_len: usize,
    pub ttl: u8,
}

impl IcmpMessage {
    pub fn is_echo_reply_to(&self, identifier: u16, sequence: u16) -> bool {
        self.header.message_type == ECHO_REPLY
            && self.header.message_code == 0
            && self.header.identifier == identifier
            && self.header.sequence_num == sequence
    }
}

/// Strip the IPv4 header (by its IHL, options included) and validate the ICMP
/// message behind it.
pub fn decode(datagram: &[u8]) -> Result<IcmpMessage, DecodeError> {
    if datagram.len() < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::Truncated(datagram.len()));
    }

    let ip: Ipv4Header = wire().deserialize(datagram)?;
    if ip.version() != 4 {
        return Err(DecodeError::NotIpv4(ip.version()));
    }
    if ip.protocol != IPPROTO_ICMP {
        return Err(DecodeError::NotIcmp(ip.protocol));
    }

    let data_offset = ip.header_len();
    if data_offset < IPV4_MIN_HEADER_LEN || data_offset > datagram.len() {
        return Err(DecodeError::BadHeaderLength(data_offset));
    }

    // The ICMP portion will be located after the IP Header
    let icmp = &datagram[data_offset..];
    if icmp.len() < ICMP_HEADER_LEN {
        return Err(DecodeError::Truncated(datagram.len()));
    }
    if !checksum::verify(icmp) {
        return Err(DecodeError::BadChecksum);
    }

    let header: IcmpEchoHeader = wire().deserialize(icmp)?;

    Ok(IcmpMessage {
        header,
        ip_header_len: data_offset,
        icmp_len: icmp.len(),
        ttl: ip.ttl,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::Ipv4Addr;

    use super::*;

    // `options` bytes of NOP options follow the fixed header.
    pub fn datagram(from: Ipv4Addr, icmp: &[u8], options: usize) -> Vec<u8> {
        assert_eq!(options % 4, 0);
        let header_len = IPV4_MIN_HEADER_LEN + options;
        let mut out = Vec::with_capacity(header_len + icmp.len());
        out.push(0x40 | (header_len / 4) as u8);
        out.push(0);
        out.extend_from_slice(&((header_len + icmp.len()) as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.push(57);
        out.push(IPPROTO_ICMP);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&from.octets());
        out.extend_from_slice(&[127, 0, 0, 1]);
        out.resize(header_len, 1); // NOP options
        checksum::set_checksum(&mut out[..header_len], 5);
        out.extend_from_slice(icmp);
        out
    }

    pub fn icmp(message_type: u8, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![message_type, 0, 0, 0];
        packet.extend_from_slice(&identifier.to_be_bytes());
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(payload);
        checksum::set_checksum(&mut packet, 1);
        packet
    }

    pub fn echo_reply(from: Ipv4Addr, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        datagram(from, &icmp(ECHO_REPLY, identifier, sequence, payload), 0)
    }
}
