use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{App, AppSettings, Arg, ArgMatches, ErrorKind};
use thiserror::Error;

use crate::config::{Destination, SessionConfig, MAX_PAYLOAD_SIZE, MAX_TIMEOUT};
use crate::range::{AddressRange, RangeError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("pingme: illegal option {0}")]
    IllegalOption(String),

    #[error("{0}")]
    Usage(String),

    #[error("pingme: invalid IP-address {0}")]
    InvalidAddress(String),

    #[error("pingme: {0}")]
    InvalidRange(#[from] RangeError),

    #[error("pingme: invalid {what} {value:?} ({hint})")]
    InvalidValue {
        what: &'static str,
        value: String,
        hint: &'static str,
    },

    #[error("{0}")]
    Info(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Info(_) => 0,
            _ => 1,
        }
    }
}

fn app() -> App<'static, 'static> {
    App::new("pingme")
        .setting(AppSettings::ColoredHelp)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Send ICMP Echo Requests to an IPv4 host and report the replies.\nOpening the raw socket needs root (or CAP_NET_RAW).")
        .arg(Arg::with_name("DESTINATION")
            .help("IPv4 address (with -d: A-B, A-N or A/prefix)")
            .required(true)
            .index(1))
        .arg(Arg::with_name("raw-sent")
            .help("Display raw data sent to end device")
            .short("a"))
        .arg(Arg::with_name("raw-received")
            .help("Display raw data received from end device")
            .short("b"))
        .arg(Arg::with_name("continuous")
            .help("Ping until stopped (Ctrl-C)")
            .short("c"))
        .arg(Arg::with_name("range")
            .help("Ping a range of addresses")
            .short("d"))
        .arg(Arg::with_name("timeout")
            .help("Set how long to wait for each reply before timing out (Default 5s)")
            .short("W")
            .takes_value(true))
        .arg(Arg::with_name("interval")
            .help("Set how long to wait in between pings (Default 1s)")
            .short("I")
            .takes_value(true))
        .arg(Arg::with_name("ttl")
            .help("Set ttl on outgoing packets (Default 56)")
            .short("t")
            .takes_value(true))
        .arg(Arg::with_name("size")
            .help("Number of payload bytes after the ICMP header (Default 0)")
            .short("s")
            .takes_value(true))
}

/// Parse the full argument vector, program name first. A lone argument is
/// always the destination, even when it looks like a flag.
pub fn parse_from<I, T>(args: I) -> Result<SessionConfig, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if let [_, destination] = args.as_slice() {
        let address = single_address(&destination.to_string_lossy())?;
        return Ok(SessionConfig::new(Destination::Single(address)));
    }

    let matches = app().get_matches_from_safe(args).map_err(from_clap)?;
    config_from(&matches)
}

fn single_address(text: &str) -> Result<Ipv4Addr, CliError> {
    text.parse().map_err(|_| CliError::InvalidAddress(text.to_string()))
}

fn from_clap(e: clap::Error) -> CliError {
    match e.kind {
        ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => CliError::Info(e.message),
        ErrorKind::UnknownArgument => {
            let arg = e.info.as_ref().and_then(|info| info.first()).cloned().unwrap_or_default();
            if arg.starts_with("--") {
                CliError::IllegalOption(arg.trim_start_matches('-').to_string())
            } else if arg.starts_with('-') {
                // Bundled short flags are reported one character at a time.
                CliError::IllegalOption(arg.chars().nth(1).map(String::from).unwrap_or_default())
            } else {
                // A second positional argument.
                CliError::Usage(e.message)
            }
        }
        _ => CliError::Usage(e.message),
    }
}

fn duration(matches: &ArgMatches, name: &'static str, default: Duration) -> Result<Duration, CliError> {
    match matches.value_of(name) {
        None => Ok(default),
        Some(text) => humantime::parse_duration(text).map_err(|_| CliError::InvalidValue {
            what: name,
            value: text.to_string(),
            hint: "ex: 1s, 400ms, 1m",
        }),
    }
}

fn config_from(matches: &ArgMatches) -> Result<SessionConfig, CliError> {
    let text = matches.value_of("DESTINATION").unwrap_or_default();
    let destination = if matches.is_present("range") {
        Destination::Range(text.parse::<AddressRange>()?)
    } else {
        Destination::Single(single_address(text)?)
    };

    let mut config = SessionConfig::new(destination);
    config.show_raw_sent = matches.is_present("raw-sent");
    config.show_raw_received = matches.is_present("raw-received");
    config.repeat_until_stopped = matches.is_present("continuous");

    config.timeout = duration(matches, "timeout", config.timeout)?;
    if config.timeout == Duration::from_secs(0) || config.timeout > MAX_TIMEOUT {
        return Err(CliError::InvalidValue {
            what: "timeout",
            value: matches.value_of("timeout").unwrap_or_default().to_string(),
            hint: "more than 0s, at most 1h",
        });
    }
    config.interval = duration(matches, "interval", config.interval)?;

    if let Some(ttl) = matches.value_of("ttl") {
        config.ttl = match ttl.parse::<u8>() {
            Ok(t) if t > 0 => t as u32,
            _ => {
                return Err(CliError::InvalidValue {
                    what: "ttl",
                    value: ttl.to_string(),
                    hint: "ex: 64, between 1 and 255",
                })
            }
        };
    }

    if let Some(size) = matches.value_of("size") {
        config.payload_size = match size.parse::<usize>() {
            Ok(s) if s <= MAX_PAYLOAD_SIZE => s,
            _ => {
                return Err(CliError::InvalidValue {
                    what: "size",
                    value: size.to_string(),
                    hint: "ex: 56, at most 65507",
                })
            }
        };
    }

    Ok(config)
}
