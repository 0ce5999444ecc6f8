use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::date::NATIVE_TIME_FORMAT;
use crate::error::{Error, Result};

pub const DEFAULT_NETWORK: &str = "VG";
pub const DEFAULT_LOCATION: &str = "00";
pub const DEFAULT_COMPONENT: &str = "Z";
pub const ARCLINK_DEFAULT_PORT: u16 = 18001;
pub const SEEDLINK_DEFAULT_PORT: u16 = 18000;

/// Which fetch utility a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Point-to-point archive retrieval (`arclink_fetch`), one window per record.
    Archive,
    /// Windowed streaming retrieval (`slinktool`), one window shared by all streams.
    Stream,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Archive => "arclink",
            Protocol::Stream => "seedlink",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default field values filled into requests, passed explicitly into each client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub network: String,
    pub location: String,
    /// Component used by magnitude consumers of the artifact; not sent to the utilities.
    pub component: String,
    /// strftime pattern for the archive request file timestamps. Defaults to the
    /// comma-separated native layout; a layout containing spaces would split a
    /// timestamp across request file columns.
    pub archive_time_format: String,
    pub archive_port: u16,
    pub stream_port: u16,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            archive_time_format: NATIVE_TIME_FORMAT.to_string(),
            archive_port: ARCLINK_DEFAULT_PORT,
            stream_port: SEEDLINK_DEFAULT_PORT,
        }
    }
}

impl RequestDefaults {
    pub fn port_for(&self, protocol: Protocol) -> u16 {
        match protocol {
            Protocol::Archive => self.archive_port,
            Protocol::Stream => self.stream_port,
        }
    }

    /// Parse `host[:port]`, filling the protocol's default port when omitted.
    pub fn parse_address(&self, raw: &str, protocol: Protocol) -> Result<Address> {
        Address::parse(raw, self.port_for(protocol))
    }
}

/// Server endpoint of a fetch utility. Checked for syntax only, never for reachability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("address must not be empty".into()));
        }
        if trimmed.contains("://") || trimmed.contains(['/', '?', '#', '@']) {
            return Err(Error::Validation(format!(
                "address must be host:port, got {trimmed}"
            )));
        }

        // Reuse the URL authority grammar for host and port validation.
        let url = Url::parse(&format!("link://{trimmed}"))
            .map_err(|e| Error::Validation(format!("invalid address {trimmed}: {e}")))?;
        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => format!("[{ip}]"),
            _ => {
                return Err(Error::Validation(format!(
                    "address has no host: {trimmed}"
                )));
            }
        };
        if trimmed.ends_with(':') {
            return Err(Error::Validation(format!(
                "address has an empty port: {trimmed}"
            )));
        }
        let port = url.port().unwrap_or(default_port);

        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let d = RequestDefaults::default();
        assert_eq!(d.network, "VG");
        assert_eq!(d.location, "00");
        assert_eq!(d.component, "Z");
        assert_eq!(d.port_for(Protocol::Archive), 18001);
        assert_eq!(d.port_for(Protocol::Stream), 18000);
    }

    #[test]
    fn parses_host_and_port() {
        let a = Address::parse("192.168.0.25:18001", 1).unwrap();
        assert_eq!(a.host(), "192.168.0.25");
        assert_eq!(a.port(), 18001);
        assert_eq!(a.to_string(), "192.168.0.25:18001");

        let a = Address::parse("geofon.gfz-potsdam.de:18000", 1).unwrap();
        assert_eq!(a.host(), "geofon.gfz-potsdam.de");
    }

    #[test]
    fn missing_port_uses_protocol_default() {
        let d = RequestDefaults::default();
        let a = d.parse_address("localhost", Protocol::Stream).unwrap();
        assert_eq!(a.to_string(), "localhost:18000");
    }

    #[test]
    fn archive_timestamps_use_native_layout() {
        assert_eq!(RequestDefaults::default().archive_time_format, NATIVE_TIME_FORMAT);
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "host:notaport", "host:99999", "http://host:80", "host:", "a/b:1"] {
            let err = Address::parse(bad, 18000).unwrap_err();
            assert!(err.is_validation(), "{bad:?} gave {err:?}");
        }
    }
}
