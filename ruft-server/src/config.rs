use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::{env, time::Duration};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STORAGE_DIR: &str = "server_data";
const DEFAULT_TIMEOUT_MS: u64 = 2000; // ms

/// Number of receive timeouts a session may sit idle for before it is evicted
const STALE_SESSION_MULTIPLIER: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// The address the UDP socket binds to
    bind_addr: SocketAddr,

    /// Directory uploads are stored in and downloads are served from
    storage_dir: PathBuf,

    /// Duration to wait for a datagram before checking for due retransmissions
    timeout: Duration,
}

impl Config {
    pub fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Parses `[HOST] [PORT] [STORAGE_DIR]`, all optional, from the command line.
    pub fn new_from_args() -> Result<Self> {
        let mut args = env::args().skip(1);
        let mut config = Self::default();

        if let Some(host) = args.next() {
            let port = match args.next() {
                Some(port) => port
                    .parse::<u16>()
                    .with_context(|| format!("could not parse port: {}", port))?,
                None => DEFAULT_PORT,
            };

            config.bind_addr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("could not parse bind address: {}:{}", host, port))?;
        }

        if let Some(dir) = args.next() {
            config.storage_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn with_bind_addr(mut self, value: SocketAddr) -> Self {
        self.bind_addr = value;

        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn with_storage_dir(mut self, value: PathBuf) -> Self {
        self.storage_dir = value;

        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = value;

        self
    }

    pub fn stale_session_ttl(&self) -> Duration {
        self.timeout * STALE_SESSION_MULTIPLIER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.bind_addr().port(), DEFAULT_PORT);
        assert_eq!(config.storage_dir(), Path::new(DEFAULT_STORAGE_DIR));
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(
            config.stale_session_ttl(),
            Duration::from_millis(DEFAULT_TIMEOUT_MS * STALE_SESSION_MULTIPLIER as u64)
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 9999)))
            .with_storage_dir(PathBuf::from("other_dir"))
            .with_timeout(Duration::from_millis(50));

        assert_eq!(config.bind_addr().port(), 9999);
        assert_eq!(config.storage_dir(), Path::new("other_dir"));
        assert_eq!(config.timeout(), Duration::from_millis(50));
        assert_eq!(config.stale_session_ttl(), Duration::from_millis(250));
    }
}
