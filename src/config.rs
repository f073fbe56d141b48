use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3141;

#[derive(Debug, Clone, Parser)]
#[command(name = "tabledb", version, about = "In-memory table store with snapshot persistence")]
pub struct Config {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1024..=49151))]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Directory holding `data.bin` and `metadata.bin`.
    #[arg(long, default_value = ".store")]
    pub data_dir: PathBuf,

    /// Commands that may wait for the store before callers are held back.
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    pub queue_depth: u32,
}

impl Config {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["tabledb"]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.address().to_string(), "0.0.0.0:3141");
        assert_eq!(config.data_dir, PathBuf::from(".store"));
        assert_eq!(config.queue_depth, 1024);
    }

    #[test]
    fn reserved_and_ephemeral_ports_are_rejected() {
        assert!(Config::try_parse_from(["tabledb", "--port", "80"]).is_err());
        assert!(Config::try_parse_from(["tabledb", "--port", "50000"]).is_err());
        let config = Config::try_parse_from(["tabledb", "--port", "8080"]).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        assert!(Config::try_parse_from(["tabledb", "--queue-depth", "0"]).is_err());
    }
}
