use std::net::SocketAddr;

use clap::Parser;

use crate::{
    message::DEFAULT_MARKER,
    relay::{DEFAULT_LISTEN, DEFAULT_READ_BUFFER_SIZE, RelayConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Byte prepended to every relayed message.
    #[arg(long, default_value_t = DEFAULT_MARKER)]
    pub marker: u8,

    /// Maximum bytes taken from a client per read; longer writes are relayed in pieces.
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    pub read_buffer_size: usize,

    /// Messages held per client while its writer is busy. With 0 a client only
    /// receives broadcasts made while it is ready to write them.
    #[arg(long, default_value_t = 0)]
    pub mailbox_capacity: usize,

    /// Reads buffered ahead of the broadcast loop before clients are throttled.
    #[arg(long, default_value_t = 0)]
    pub inbound_capacity: usize,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            listen: cli.listen,
            marker: cli.marker,
            read_buffer_size: cli.read_buffer_size,
            mailbox_capacity: cli.mailbox_capacity,
            inbound_capacity: cli.inbound_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_config() {
        let cli = Cli::try_parse_from(["broadcast_relay"]).expect("parse defaults");
        assert_eq!(RelayConfig::from(cli), RelayConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "broadcast_relay",
            "--listen",
            "0.0.0.0:7000",
            "--marker",
            "33",
            "--read-buffer-size",
            "64",
            "--mailbox-capacity",
            "4",
            "--inbound-capacity",
            "2",
        ])
        .expect("parse flags");

        let config = RelayConfig::from(cli);
        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.marker, b'!');
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(config.mailbox_capacity, 4);
        assert_eq!(config.inbound_capacity, 2);
    }

    #[test]
    fn marker_must_fit_in_a_byte() {
        assert!(Cli::try_parse_from(["broadcast_relay", "--marker", "256"]).is_err());
    }
}
