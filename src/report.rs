use std::io::{self, Write};
use std::net::Ipv4Addr;

use colored::*;
use log::debug;

use crate::config::SessionConfig;
use crate::range::SweepReport;
use crate::session::{ProbeObserver, ProbeResult};

/// `0x08 0x00 0xF7 ...`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// Colour only ever applies to stdout; stderr lines stay plain.
pub struct Reporter<O, E> {
    out: O,
    err: E,
    show_raw_sent: bool,
    show_raw_received: bool,
    color: bool,
}

impl Reporter<io::Stdout, io::Stderr> {
    pub fn stdio(config: &SessionConfig) -> Self {
        Reporter::new(io::stdout(), io::stderr(), config).with_color(true)
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(out: O, err: E, config: &SessionConfig) -> Self {
        Reporter {
            out,
            err,
            show_raw_sent: config.show_raw_sent,
            show_raw_received: config.show_raw_received,
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn bold(&self, text: String) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text
        }
    }

    fn yellow(&self, text: String) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text
        }
    }

    pub fn sweep(&mut self, report: &SweepReport) {
        for (target, events) in report {
            let heading = self.yellow(format!("--- {} ---", target));
            let _ = writeln!(self.out, "{}", heading);
            for event in events {
                event.replay(self);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write, E: Write> ProbeObserver for Reporter<O, E> {
    fn sent(&mut self, destination: Ipv4Addr, packet: &[u8]) {
        let mut line = format!("Sent {} bytes to {}:", packet.len(), self.bold(destination.to_string()));
        if self.show_raw_sent {
            line.push(' ');
            line.push_str(&hex_dump(packet));
        }
        let _ = writeln!(self.out, "{}", line);
    }

    fn finished(&mut self, result: &ProbeResult) {
        debug!(
            "probe {} to {} ({} bytes) answered: {}",
            result.sequence,
            result.destination,
            result.bytes_sent,
            result.reply.is_some()
        );

        let reply = match &result.reply {
            Some(reply) => reply,
            None => {
                let _ = writeln!(self.err, "Timeout");
                return;
            }
        };

        if self.show_raw_received {
            let _ = writeln!(
                self.out,
                "Received {} bytes from {}: {}",
                reply.datagram.len(),
                reply.from,
                hex_dump(&reply.datagram)
            );
        }

        let rtt = result.round_trip_millis().unwrap_or_default();
        let _ = writeln!(
            self.out,
            "Reply from {}, data:{} bytes, round trip time:{} ms",
            self.yellow(reply.from.to_string()),
            reply.bytes_received,
            self.bold(format!("{:.3}", rtt))
        );
    }

    fn send_failed(&mut self, sequence: u16, error: &str) {
        let _ = writeln!(self.err, "Send failed (icmp_seq={}): {}", sequence, error);
    }
}
