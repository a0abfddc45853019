//! Stateless encoding and decoding of SOCKS5 messages
//!
//! Decoders work on a single inbound unit and return the decoded value
//! together with the number of bytes it occupied, so that a transport which
//! coalesces messages can hand the remainder to the next phase.

use super::{atyp, Address, AuthMethod, Command, ConnectRequest, GreetingRequest, Reply, SOCKS_VERSION};
use crate::error::DecodeError;
use std::net::IpAddr;

fn check_version(buf: &[u8]) -> Result<(), DecodeError> {
    match buf.first() {
        None => Err(DecodeError::Truncated),
        Some(&SOCKS_VERSION) => Ok(()),
        Some(&other) => Err(DecodeError::UnsupportedVersion(other)),
    }
}

fn take<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let end = offset.checked_add(len).ok_or(DecodeError::Truncated)?;
    let bytes = buf.get(*offset..end).ok_or(DecodeError::Truncated)?;
    *offset = end;
    Ok(bytes)
}

/// Decode `[0x05, n, m1..mn]`.
///
/// The offered methods are returned as-is; nothing here decides whether any
/// of them is acceptable.
pub fn decode_greeting(buf: &[u8]) -> Result<(GreetingRequest, usize), DecodeError> {
    check_version(buf)?;

    let mut offset = 1;
    let count = take(buf, &mut offset, 1)?[0] as usize;
    let methods = take(buf, &mut offset, count)?.to_vec();

    Ok((
        GreetingRequest {
            version: SOCKS_VERSION,
            methods,
        },
        offset,
    ))
}

/// Encode the method-selection reply `[0x05, method]`
pub fn encode_greeting_reply(method: AuthMethod) -> [u8; 2] {
    [SOCKS_VERSION, method as u8]
}

/// Decode `[0x05, cmd, rsv, atyp, addr.., port_hi, port_lo]`
pub fn decode_request(buf: &[u8]) -> Result<(ConnectRequest, usize), DecodeError> {
    check_version(buf)?;

    let mut offset = 0;
    let header = take(buf, &mut offset, 4)?;
    let command = Command::from_byte(header[1]);
    let reserved = header[2];

    let address = match header[3] {
        atyp::IPV4 => {
            let bytes = take(buf, &mut offset, 4)?;
            Address::Ipv4([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        atyp::DOMAIN => {
            let len = take(buf, &mut offset, 1)?[0] as usize;
            let name = take(buf, &mut offset, len)?;
            Address::Domain(String::from_utf8_lossy(name).into_owned())
        }
        atyp::IPV6 => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(take(buf, &mut offset, 16)?);
            Address::Ipv6(bytes)
        }
        other => return Err(DecodeError::UnsupportedAddressType(other)),
    };

    let port_bytes = take(buf, &mut offset, 2)?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);

    Ok((
        ConnectRequest {
            version: SOCKS_VERSION,
            command,
            reserved,
            address,
            port,
        },
        offset,
    ))
}

/// Encode a reply carrying the bound address.
///
/// IPv4 yields the 10-byte form; IPv6 uses address type 0x04.
pub fn encode_reply(reply: Reply, bound_addr: IpAddr, bound_port: u16) -> Vec<u8> {
    let mut response = Vec::with_capacity(22);
    response.extend_from_slice(&[SOCKS_VERSION, reply as u8, 0x00]);

    match bound_addr {
        IpAddr::V4(ip) => {
            response.push(atyp::IPV4);
            response.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            response.push(atyp::IPV6);
            response.extend_from_slice(&ip.octets());
        }
    }

    response.extend_from_slice(&bound_port.to_be_bytes());
    response
}
