//! Minimal IPv4 header inspection for the filter loop.

use std::net::Ipv4Addr;

/// Smallest valid IPv4 header (no options).
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Offset of the destination address in an IPv4 header.
const IPV4_DST_OFFSET: usize = 16;

/// Returns the destination of an IPv4 packet, or `None` for anything else.
///
/// Non-IPv4 packets (IPv6, garbage) and packets shorter than a minimal header
/// yield `None` so the caller can let them through untouched.
#[must_use]
pub fn ipv4_destination(packet: &[u8]) -> Option<Ipv4Addr> {
    if packet.len() < IPV4_MIN_HEADER_LEN || packet[0] >> 4 != 4 {
        return None;
    }

    let dst: [u8; 4] = packet[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].try_into().ok()?;
    Some(Ipv4Addr::from(dst))
}

/// Builds a minimal IPv4 header from `src` to `dst`, for tests.
#[cfg(test)]
pub(crate) fn ipv4_header(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let mut packet = vec![0u8; IPV4_MIN_HEADER_LEN];
    packet[0] = 0x45;
    packet[3] = 20;
    packet[8] = 64;
    packet[9] = 17;
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_destination() {
        let packet = ipv4_header(Ipv4Addr::new(10, 8, 0, 1), Ipv4Addr::new(192, 168, 0, 102));
        assert_eq!(ipv4_destination(&packet), Some(Ipv4Addr::new(192, 168, 0, 102)));
    }

    #[test]
    fn test_ignores_ipv6() {
        let mut packet = vec![0u8; 40];
        packet[0] = 0x60;
        assert_eq!(ipv4_destination(&packet), None);
    }

    #[test]
    fn test_ignores_truncated() {
        let packet = ipv4_header(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        assert_eq!(ipv4_destination(&packet[..19]), None);
        assert_eq!(ipv4_destination(&[]), None);
    }
}
