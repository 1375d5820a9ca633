//! Pushes statically-configured NAT forwards into the pinned
//! `nat-static-v4`/`nat-static-v6` LPM tries at startup.
//!
//! The BPF-side lookup (`try_static_mapping_v4`/`try_static_mapping_v6` in
//! `flowgate-ebpf-programs`) queries with an exact-length key covering
//! direction, protocol, port and the packet's destination address. A static
//! forward is declared here with a short prefix that only covers direction,
//! protocol and port, wildcarding the address bytes, so the LPM trie's
//! longest-prefix match hits it regardless of which of the router's own
//! addresses the packet actually arrived on.

use aya::maps::lpm_trie::{Key, LpmTrie};
use aya::maps::MapData;
use flowgate_ebpf::DataPlane;
use flowgate_ebpf_common::maps::NatStaticValue;
use flowgate_ebpf_common::{Direction, InetAddr, L3Proto, L4Proto};

use crate::config::{NatProtocol, StaticMapping};
use crate::error::{FlowgateError, Result};

/// Bits of a `nat-static-v4` key covered by direction + l3 + l4 + port,
/// leaving the trailing 4 address bytes wildcarded.
const V4_PREFIX_BITS: u32 = 5 * 8;
/// Bits of a `nat-static-v6` key covered by direction + l4 + port, leaving
/// the trailing 16 address bytes (plus the unused padding byte) wildcarded.
const V6_PREFIX_BITS: u32 = 4 * 8;

fn l4_proto_of(protocol: NatProtocol) -> L4Proto {
    match protocol {
        NatProtocol::Tcp => L4Proto::Tcp,
        NatProtocol::Udp => L4Proto::Udp,
    }
}

fn static_key_v4(l4_proto: L4Proto, port: u16) -> [u8; 9] {
    let mut bytes = [0u8; 9];
    bytes[0] = Direction::Ingress as u8;
    bytes[1] = L3Proto::V4 as u8;
    bytes[2] = l4_proto as u8;
    bytes[3] = (port >> 8) as u8;
    bytes[4] = port as u8;
    bytes
}

fn static_key_v6(l4_proto: L4Proto, port: u16) -> [u8; 21] {
    let mut bytes = [0u8; 21];
    bytes[0] = Direction::Ingress as u8;
    bytes[1] = l4_proto as u8;
    bytes[2] = (port >> 8) as u8;
    bytes[3] = port as u8;
    bytes
}

/// Installs every `static_mappings` entry from the NAT config into the
/// pinned static-forward tries so ingress traffic addressed to the
/// configured external port is redirected to its internal target even
/// before any dynamic mapping exists for it.
pub fn apply_static_mappings(data_plane: &DataPlane, mappings: &[StaticMapping]) -> Result<()> {
    let v4_map =
        data_plane.map("nat_static_v4").ok_or(FlowgateError::MapNotFound { name: "nat_static_v4" })?;
    let mut v4: LpmTrie<&MapData, [u8; 9], NatStaticValue> = LpmTrie::try_from(v4_map)?;

    let v6_map =
        data_plane.map("nat_static_v6").ok_or(FlowgateError::MapNotFound { name: "nat_static_v6" })?;
    let mut v6: LpmTrie<&MapData, [u8; 21], NatStaticValue> = LpmTrie::try_from(v6_map)?;

    for mapping in mappings {
        let l4_proto = l4_proto_of(mapping.protocol);
        match mapping.internal_addr {
            std::net::IpAddr::V4(addr) => {
                let key = Key::new(V4_PREFIX_BITS, static_key_v4(l4_proto, mapping.external_port));
                let value = NatStaticValue::new(InetAddr::from_v4(addr.octets()), mapping.internal_port, false);
                v4.insert(&key, value, 0)?;
            }
            std::net::IpAddr::V6(addr) => {
                let key = Key::new(V6_PREFIX_BITS, static_key_v6(l4_proto, mapping.external_port));
                let value = NatStaticValue::new(InetAddr::from_v6(addr.octets()), mapping.internal_port, false);
                v6.insert(&key, value, 0)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_v4_layout_matches_ebpf_side_query() {
        let key = static_key_v4(L4Proto::Tcp, 8080);
        assert_eq!(key[0], Direction::Ingress as u8);
        assert_eq!(key[1], L3Proto::V4 as u8);
        assert_eq!(key[2], L4Proto::Tcp as u8);
        assert_eq!(u16::from_be_bytes([key[3], key[4]]), 8080);
        assert_eq!(&key[5..9], &[0, 0, 0, 0]);
    }

    #[test]
    fn static_key_v6_layout_matches_ebpf_side_query() {
        let key = static_key_v6(L4Proto::Udp, 53);
        assert_eq!(key[0], Direction::Ingress as u8);
        assert_eq!(key[1], L4Proto::Udp as u8);
        assert_eq!(u16::from_be_bytes([key[2], key[3]]), 53);
        assert_eq!(&key[4..21], &[0u8; 17]);
    }

    #[test]
    fn l4_proto_of_maps_config_protocols() {
        assert_eq!(l4_proto_of(NatProtocol::Tcp), L4Proto::Tcp);
        assert_eq!(l4_proto_of(NatProtocol::Udp), L4Proto::Udp);
    }
}
