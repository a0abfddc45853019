//! SOCKS5 wire types (RFC 1928 subset)

mod codec;

pub use codec::{decode_greeting, decode_request, encode_greeting_reply, encode_reply};

use std::fmt;
use std::net::Ipv4Addr;

/// Protocol version byte carried by every SOCKS5 message
pub const SOCKS_VERSION: u8 = 0x05;

/// Host reported for every IPv6 destination.
///
/// The 16 address bytes are consumed from the request but not rendered.
pub const IPV6_PLACEHOLDER_HOST: &str = "::1";

/// SOCKS5 authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuth = 0x00,
    GssApi = 0x01,
    UserPass = 0x02,
    NoAcceptable = 0xFF,
}

impl AuthMethod {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::NoAuth),
            0x01 => Some(Self::GssApi),
            0x02 => Some(Self::UserPass),
            0xFF => Some(Self::NoAcceptable),
            _ => None,
        }
    }
}

/// SOCKS5 command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
    Unknown(u8),
}

impl Command {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::Connect,
            0x02 => Self::Bind,
            0x03 => Self::UdpAssociate,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Connect => 0x01,
            Self::Bind => 0x02,
            Self::UdpAssociate => 0x03,
            Self::Unknown(byte) => *byte,
        }
    }
}

/// Address type tags
pub mod atyp {
    pub const IPV4: u8 = 0x01;
    pub const DOMAIN: u8 = 0x03;
    pub const IPV6: u8 = 0x04;
}

/// Destination address carried by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4([u8; 4]),
    Domain(String),
    Ipv6([u8; 16]),
}

impl Address {
    pub fn atyp(&self) -> u8 {
        match self {
            Self::Ipv4(_) => atyp::IPV4,
            Self::Domain(_) => atyp::DOMAIN,
            Self::Ipv6(_) => atyp::IPV6,
        }
    }

    /// Textual host handed to the connector
    pub fn host(&self) -> String {
        match self {
            Self::Ipv4(octets) => Ipv4Addr::from(*octets).to_string(),
            Self::Domain(name) => name.clone(),
            Self::Ipv6(_) => IPV6_PLACEHOLDER_HOST.to_string(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host())
    }
}

/// SOCKS5 reply code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl Reply {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GeneralFailure => "general_failure",
            Self::ConnectionNotAllowed => "connection_not_allowed",
            Self::NetworkUnreachable => "network_unreachable",
            Self::HostUnreachable => "host_unreachable",
            Self::ConnectionRefused => "connection_refused",
            Self::TtlExpired => "ttl_expired",
            Self::CommandNotSupported => "command_not_supported",
            Self::AddressTypeNotSupported => "address_type_not_supported",
        }
    }
}

/// Method-selection message sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingRequest {
    pub version: u8,
    pub methods: Vec<u8>,
}

/// Request message sent by the client after the greeting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub version: u8,
    pub command: Command,
    pub reserved: u8,
    pub address: Address,
    pub port: u16,
}

impl ConnectRequest {
    pub fn host(&self) -> String {
        self.address.host()
    }

    /// `host:port` for logging
    pub fn target(&self) -> String {
        match &self.address {
            Address::Ipv6(_) => format!("[{}]:{}", self.host(), self.port),
            _ => format!("{}:{}", self.host(), self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_from_byte() {
        assert_eq!(AuthMethod::from_byte(0x00), Some(AuthMethod::NoAuth));
        assert_eq!(AuthMethod::from_byte(0x02), Some(AuthMethod::UserPass));
        assert_eq!(AuthMethod::from_byte(0xFF), Some(AuthMethod::NoAcceptable));
        assert_eq!(AuthMethod::from_byte(0x99), None);
    }

    #[test]
    fn test_command_from_byte() {
        assert_eq!(Command::from_byte(0x01), Command::Connect);
        assert_eq!(Command::from_byte(0x02), Command::Bind);
        assert_eq!(Command::from_byte(0x03), Command::UdpAssociate);
        assert_eq!(Command::from_byte(0x99), Command::Unknown(0x99));
        assert_eq!(Command::Unknown(0x99).as_byte(), 0x99);
    }

    #[test]
    fn test_address_host_rendering() {
        assert_eq!(Address::Ipv4([10, 0, 0, 7]).host(), "10.0.0.7");
        assert_eq!(Address::Domain("example.com".into()).host(), "example.com");
        assert_eq!(Address::Ipv6([0xfe; 16]).host(), "::1");
    }

    #[test]
    fn test_request_target() {
        let request = ConnectRequest {
            version: SOCKS_VERSION,
            command: Command::Connect,
            reserved: 0,
            address: Address::Ipv6([0; 16]),
            port: 443,
        };
        assert_eq!(request.target(), "[::1]:443");
    }
}
