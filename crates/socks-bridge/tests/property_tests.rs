use proptest::prelude::*;
use socks_bridge::error::DecodeError;
use socks_bridge::socks5::{
    decode_greeting, decode_request, encode_greeting_reply, encode_reply, Address, AuthMethod,
    Command, Reply,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const REPLIES: [Reply; 9] = [
    Reply::Success,
    Reply::GeneralFailure,
    Reply::ConnectionNotAllowed,
    Reply::NetworkUnreachable,
    Reply::HostUnreachable,
    Reply::ConnectionRefused,
    Reply::TtlExpired,
    Reply::CommandNotSupported,
    Reply::AddressTypeNotSupported,
];

/// Minimal client-side reply parser: (code, address, port)
fn parse_reply(bytes: &[u8]) -> Option<(u8, IpAddr, u16)> {
    if bytes.len() < 4 || bytes[0] != 0x05 || bytes[2] != 0x00 {
        return None;
    }
    let (addr, rest): (IpAddr, &[u8]) = match bytes[3] {
        0x01 if bytes.len() == 10 => {
            let octets: [u8; 4] = bytes[4..8].try_into().ok()?;
            (Ipv4Addr::from(octets).into(), &bytes[8..])
        }
        0x04 if bytes.len() == 22 => {
            let octets: [u8; 16] = bytes[4..20].try_into().ok()?;
            (Ipv6Addr::from(octets).into(), &bytes[20..])
        }
        _ => return None,
    };
    Some((bytes[1], addr, u16::from_be_bytes([rest[0], rest[1]])))
}

proptest! {
    #[test]
    fn test_greeting_reply_is_always_no_auth(methods in prop::collection::vec(any::<u8>(), 0..=255)) {
        let mut greeting = vec![0x05, methods.len() as u8];
        greeting.extend_from_slice(&methods);

        let (decoded, consumed) = decode_greeting(&greeting).unwrap();
        prop_assert_eq!(decoded.methods, methods);
        prop_assert_eq!(consumed, greeting.len());
        prop_assert_eq!(encode_greeting_reply(AuthMethod::NoAuth), [0x05, 0x00]);
    }

    #[test]
    fn test_greeting_rejects_other_versions(version in any::<u8>(), rest in prop::collection::vec(any::<u8>(), 0..8)) {
        prop_assume!(version != 0x05);
        let mut greeting = vec![version];
        greeting.extend_from_slice(&rest);
        prop_assert_eq!(decode_greeting(&greeting), Err(DecodeError::UnsupportedVersion(version)));
    }

    #[test]
    fn test_ipv4_host_and_port_extraction(octets in any::<[u8; 4]>(), port in any::<u16>(), trailing in prop::collection::vec(any::<u8>(), 0..16)) {
        let mut request = vec![0x05, 0x01, 0x00, 0x01];
        request.extend_from_slice(&octets);
        request.extend_from_slice(&port.to_be_bytes());
        let expected_len = request.len();
        request.extend_from_slice(&trailing);

        let (decoded, consumed) = decode_request(&request).unwrap();
        prop_assert_eq!(decoded.command, Command::Connect);
        prop_assert_eq!(&decoded.address, &Address::Ipv4(octets));
        prop_assert_eq!(
            decoded.host(),
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        );
        prop_assert_eq!(decoded.port, port);
        prop_assert_eq!(consumed, expected_len);
    }

    #[test]
    fn test_domain_truncation_is_never_partial(name in "[a-z0-9.-]{1,64}", port in any::<u16>(), cut in 1usize..200) {
        let mut request = vec![0x05, 0x01, 0x00, 0x03, name.len() as u8];
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(&port.to_be_bytes());

        let (decoded, _) = decode_request(&request).unwrap();
        prop_assert_eq!(decoded.host(), name.clone());

        let cut = cut.min(request.len());
        let truncated = &request[..request.len() - cut];
        prop_assert_eq!(decode_request(truncated), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_domain_names_never_rejected_for_encoding(name in prop::collection::vec(any::<u8>(), 0..=255)) {
        let mut request = vec![0x05, 0x01, 0x00, 0x03, name.len() as u8];
        request.extend_from_slice(&name);
        request.extend_from_slice(&443u16.to_be_bytes());

        let (decoded, _) = decode_request(&request).unwrap();
        prop_assert_eq!(decoded.host(), String::from_utf8_lossy(&name).into_owned());
    }

    #[test]
    fn test_ipv6_always_renders_loopback(octets in any::<[u8; 16]>(), port in any::<u16>()) {
        let mut request = vec![0x05, 0x01, 0x00, 0x04];
        request.extend_from_slice(&octets);
        request.extend_from_slice(&port.to_be_bytes());

        let (decoded, consumed) = decode_request(&request).unwrap();
        prop_assert_eq!(decoded.host(), "::1");
        prop_assert_eq!(decoded.port, port);
        prop_assert_eq!(consumed, 22);
    }

    #[test]
    fn test_unknown_address_types_are_rejected(atyp in any::<u8>()) {
        prop_assume!(![0x01, 0x03, 0x04].contains(&atyp));
        let request = [0x05, 0x01, 0x00, atyp, 127, 0, 0, 1, 0x1F, 0x90];
        prop_assert_eq!(decode_request(&request), Err(DecodeError::UnsupportedAddressType(atyp)));
    }

    #[test]
    fn test_reply_round_trip(index in 0usize..9, octets in any::<[u8; 4]>(), port in any::<u16>()) {
        let reply = REPLIES[index];
        let addr = IpAddr::V4(Ipv4Addr::from(octets));

        let encoded = encode_reply(reply, addr, port);
        prop_assert_eq!(encoded.len(), 10);
        prop_assert_eq!(parse_reply(&encoded), Some((reply as u8, addr, port)));
    }

    #[test]
    fn test_ipv6_reply_round_trip(octets in any::<[u8; 16]>(), port in any::<u16>()) {
        let addr = IpAddr::V6(Ipv6Addr::from(octets));

        let encoded = encode_reply(Reply::Success, addr, port);
        prop_assert_eq!(encoded.len(), 22);
        prop_assert_eq!(parse_reply(&encoded), Some((0x00, addr, port)));
    }
}
