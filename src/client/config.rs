//! Client configuration

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A parsed `\\host\share` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareAddress {
    pub host: String,
    pub share: String,
}

impl ShareAddress {
    /// Accepts `\\host\share` with an optional trailing backslash
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = || Error::InvalidShare(address.to_string());

        let rest = address.strip_prefix("\\\\").ok_or_else(invalid)?;
        let rest = rest.strip_suffix('\\').unwrap_or(rest);
        let (host, share) = rest.split_once('\\').ok_or_else(invalid)?;
        if host.is_empty() || share.is_empty() || share.contains('\\') {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            share: share.to_string(),
        })
    }

    /// `\\host\share` as sent in TREE_CONNECT
    pub fn unc_path(&self) -> String {
        format!("\\\\{}\\{}", self.host, self.share)
    }
}

impl FromStr for ShareAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ShareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unc_path())
    }
}

/// SMB client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// `\\host\share`
    pub share: String,
    /// Domain for authentication
    pub domain: String,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Workstation name
    pub workstation: String,
    pub port: u16,
    /// Packets kept in flight per transfer
    pub packet_concurrency: usize,
    /// Upper bound on a single read or write packet
    pub max_packet_size: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            share: String::new(),
            domain: String::new(),
            username: String::new(),
            password: String::new(),
            workstation: String::from("RUST-SMB-CLIENT"),
            port: 445,
            packet_concurrency: 20,
            max_packet_size: 0x10000,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(share: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self.domain = domain.into();
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("share", &self.share)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("workstation", &self.workstation)
            .field("port", &self.port)
            .field("packet_concurrency", &self.packet_concurrency)
            .field("max_packet_size", &self.max_packet_size)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
