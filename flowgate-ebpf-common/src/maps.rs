//! Key and value layouts for the pinned, cross-program maps listed in the
//! data model. Every struct here is `#[repr(C)]` and plain-old-data so the
//! same bytes are meaningful whether written by a kernel program or read
//! back by the userspace control plane.

use crate::addr::{InetAddr, Tuple};

/// An LPM-trie key: a 4-byte prefix length (bits, as the trie implementation
/// requires) followed by the address bytes. `N` is 4 for IPv4-only lookups
/// and 16 for dual-stack ones stored in the wider [`InetAddr`] shape.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpmKey<const N: usize> {
    pub prefix_len: u32,
    pub addr: [u8; N],
}

impl<const N: usize> LpmKey<N> {
    pub const fn new(prefix_len: u32, addr: [u8; N]) -> Self {
        LpmKey { prefix_len, addr }
    }
}

pub type Ipv4LpmKey = LpmKey<4>;
pub type Ipv6LpmKey = LpmKey<16>;

/// 1. `wan-ip-binding`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WanIpBindingKey {
    pub ifindex: u32,
    pub l3_proto: u8,
    _pad: [u8; 3],
}

impl WanIpBindingKey {
    pub const fn new(ifindex: u32, l3_proto: u8) -> Self {
        WanIpBindingKey { ifindex, l3_proto, _pad: [0; 3] }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WanIpBindingValue {
    pub wan_addr: InetAddr,
    pub gateway_addr: InetAddr,
}

/// 2. `lan-route`, keyed by [`Ipv4LpmKey`]/[`Ipv6LpmKey`] over `{prefix_len, l3_proto, addr}`
/// (the proto is folded into which of the two pinned maps is consulted,
/// matching the original ipv4/ipv6 map split).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LanRouteValue {
    pub ifindex: u32,
    pub has_link_layer: u8,
    pub link_layer_mac: [u8; 6],
    pub is_next_hop: u8,
    pub next_hop_addr: InetAddr,
}

/// 3. `flow-target`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTargetKey {
    pub flow_id: u8,
    pub l3_proto: u8,
    _pad: [u8; 2],
}

impl FlowTargetKey {
    pub const fn new(flow_id: u8, l3_proto: u8) -> Self {
        FlowTargetKey { flow_id, l3_proto, _pad: [0; 2] }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowTargetValue {
    pub ifindex: u32,
    pub gateway_addr: InetAddr,
    pub has_link_layer: u8,
    pub is_container_netns: u8,
    pub dest_mac: [u8; 6],
}

/// 4. `flow-match`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowMatchKey {
    pub src_addr: InetAddr,
    pub src_mac: [u8; 6],
    pub l3_proto: u8,
    pub l4_proto: u8,
    pub vlan_id: u16,
    pub qos_class: u8,
    _pad: [u8; 3],
}

impl FlowMatchKey {
    pub const fn new(
        src_addr: InetAddr,
        src_mac: [u8; 6],
        l3_proto: u8,
        l4_proto: u8,
        vlan_id: u16,
        qos_class: u8,
    ) -> Self {
        FlowMatchKey { src_addr, src_mac, l3_proto, l4_proto, vlan_id, qos_class, _pad: [0; 3] }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowId(pub u8);

/// 5. `per-flow-ip` / 6. `per-flow-dns` shared leaf value
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkAction {
    pub mark_action: u32,
    pub priority: u16,
    _pad: [u8; 2],
}

impl MarkAction {
    pub const fn new(mark_action: u32, priority: u16) -> Self {
        MarkAction { mark_action, priority, _pad: [0; 2] }
    }
}

/// 6. `per-flow-dns` inner-map key
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsMatchKey {
    pub dst_addr: InetAddr,
    pub l3_proto: u8,
    _pad: [u8; 3],
}

impl DnsMatchKey {
    pub const fn new(dst_addr: InetAddr, l3_proto: u8) -> Self {
        DnsMatchKey { dst_addr, l3_proto, _pad: [0; 3] }
    }
}

/// 6. `per-flow-dns` outer+inner key, flattened into one lookup since this
/// crate models the nested map as a single flat hash (see crate-level note
/// in `flowgate-ebpf-programs::maps`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowDnsKey {
    pub flow_id: FlowId,
    pub match_key: DnsMatchKey,
}

impl FlowDnsKey {
    pub const fn new(flow_id: FlowId, match_key: DnsMatchKey) -> Self {
        FlowDnsKey { flow_id, match_key }
    }
}

/// 7. `route-cache`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCacheKey {
    pub local_addr: InetAddr,
    pub remote_addr: InetAddr,
}

impl RouteCacheKey {
    pub const fn new(local_addr: InetAddr, remote_addr: InetAddr) -> Self {
        RouteCacheKey { local_addr, remote_addr }
    }
}

/// WAN-side caches an output ifindex; LAN-side caches a mark word to apply
/// directly. Both fit in one `u32`, so a single value type serves either
/// submap — the route-cache *direction* (which submap holds the entry) is
/// what tells a reader which meaning applies.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteCacheValue {
    pub ifindex_or_mark: u32,
}

/// 8. `nat-mapping` (IPv4)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatMappingKey {
    pub direction: u8,
    pub l4_proto: u8,
    pub from_port: u16,
    pub from_addr: InetAddr,
}

impl NatMappingKey {
    pub const fn new(direction: u8, l4_proto: u8, from_port: u16, from_addr: InetAddr) -> Self {
        NatMappingKey { direction, l4_proto, from_port, from_addr }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NatMappingValue {
    pub mapped_addr: InetAddr,
    pub mapped_port: u16,
    pub trigger_addr: InetAddr,
    pub trigger_port: u16,
    pub is_static: u8,
    pub is_allow_reuse: u8,
    pub last_active: u64,
    _pad: [u8; 4],
}

impl NatMappingValue {
    pub fn new(
        mapped_addr: InetAddr,
        mapped_port: u16,
        trigger_addr: InetAddr,
        trigger_port: u16,
        is_static: bool,
        is_allow_reuse: bool,
        last_active: u64,
    ) -> Self {
        NatMappingValue {
            mapped_addr,
            mapped_port,
            trigger_addr,
            trigger_port,
            is_static: is_static as u8,
            is_allow_reuse: is_allow_reuse as u8,
            last_active,
            _pad: [0; 4],
        }
    }
}

/// 9. `nat-static-mapping`, keyed by [`Ipv4LpmKey`]/[`Ipv6LpmKey`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NatStaticValue {
    pub mapped_addr: InetAddr,
    pub mapped_port: u16,
    pub is_allow_reuse: u8,
    _pad: u8,
}

impl NatStaticValue {
    pub fn new(mapped_addr: InetAddr, mapped_port: u16, is_allow_reuse: bool) -> Self {
        NatStaticValue { mapped_addr, mapped_port, is_allow_reuse: is_allow_reuse as u8, _pad: 0 }
    }
}

/// 10. `nat-conntrack`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConntrackKey {
    pub l4_proto: u8,
    _pad: [u8; 7],
    pub tuple: Tuple,
}

impl ConntrackKey {
    pub const fn new(l4_proto: u8, tuple: Tuple) -> Self {
        ConntrackKey { l4_proto, _pad: [0; 7], tuple }
    }
}

/// `timer` from the original design (a kernel-managed callback) becomes
/// `deadline`: an absolute monotonic-clock tick after which a userspace
/// sweep treats the entry as expired and removes it plus its paired
/// mapping entries.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConntrackValue {
    pub state: u8,
    pub direction: u8,
    _pad: [u8; 6],
    pub trigger_addr: InetAddr,
    pub trigger_port: u16,
    _pad2: [u8; 6],
    pub create_time: u64,
    pub deadline: u64,
}

impl ConntrackValue {
    pub fn new(
        state: u8,
        direction: u8,
        trigger_addr: InetAddr,
        trigger_port: u16,
        create_time: u64,
        deadline: u64,
    ) -> Self {
        ConntrackValue {
            state,
            direction,
            _pad: [0; 6],
            trigger_addr,
            trigger_port,
            _pad2: [0; 6],
            create_time,
            deadline,
        }
    }
}

/// 11. `fragment-cache`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentKey {
    pub l3_proto: u8,
    pub l4_proto: u8,
    _pad: [u8; 2],
    pub id: u32,
    pub src: InetAddr,
    pub dst: InetAddr,
}

impl FragmentKey {
    pub const fn new(l3_proto: u8, l4_proto: u8, id: u32, src: InetAddr, dst: InetAddr) -> Self {
        FragmentKey { l3_proto, l4_proto, _pad: [0; 2], id, src, dst }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentValue {
    pub src_port: u16,
    pub dst_port: u16,
}

/// 12. `firewall-block-v4` / `firewall-block-v6`, keyed by [`Ipv4LpmKey`]/[`Ipv6LpmKey`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirewallBlockValue {
    pub action: u8,
    _pad: [u8; 3],
}

impl FirewallBlockValue {
    pub const fn new(action: u8) -> Self {
        FirewallBlockValue { action, _pad: [0; 3] }
    }
}

/// 13. `firewall-pinhole`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinholeKey {
    pub l3_proto: u8,
    pub l4_proto: u8,
    pub local_port: u16,
    pub local_addr: InetAddr,
}

impl PinholeKey {
    pub const fn new(l3_proto: u8, l4_proto: u8, local_port: u16, local_addr: InetAddr) -> Self {
        PinholeKey { l3_proto, l4_proto, local_port, local_addr }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinholeValue {
    pub status: u8,
    _pad: [u8; 7],
    pub trigger_addr: InetAddr,
    pub trigger_port: u16,
    _pad2: [u8; 6],
    pub deadline: u64,
}

impl PinholeValue {
    pub fn new(status: u8, trigger_addr: InetAddr, trigger_port: u16, deadline: u64) -> Self {
        PinholeValue { status, _pad: [0; 7], trigger_addr, trigger_port, _pad2: [0; 6], deadline }
    }
}

/// 14. `neighbour-cache` (v4/v6)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourKey {
    pub addr: InetAddr,
}

impl NeighbourKey {
    pub const fn new(addr: InetAddr) -> Self {
        NeighbourKey { addr }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighbourValue {
    pub mac: [u8; 6],
    _pad: [u8; 2],
    pub ifindex: u32,
    pub dev_mac: [u8; 6],
    _pad2: [u8; 2],
}

impl NeighbourValue {
    pub const fn new(mac: [u8; 6], ifindex: u32, dev_mac: [u8; 6]) -> Self {
        NeighbourValue { mac, _pad: [0; 2], ifindex, dev_mac, _pad2: [0; 2] }
    }
}

/// 15. `ipv6-client-prefix-cache`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6PrefixCacheKey {
    pub client_suffix: [u8; 8],
    pub client_port: u16,
    pub id_byte: u8,
    pub l4_proto: u8,
}

impl Ipv6PrefixCacheKey {
    pub const fn new(client_suffix: [u8; 8], client_port: u16, id_byte: u8, l4_proto: u8) -> Self {
        Ipv6PrefixCacheKey { client_suffix, client_port, id_byte, l4_proto }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6PrefixCacheValue {
    pub client_prefix: [u8; 8],
    pub trigger_addr: InetAddr,
    pub trigger_port: u16,
    pub is_allow_reuse: u8,
    _pad: u8,
}

impl Ipv6PrefixCacheValue {
    pub fn new(
        client_prefix: [u8; 8],
        trigger_addr: InetAddr,
        trigger_port: u16,
        is_allow_reuse: bool,
    ) -> Self {
        Ipv6PrefixCacheValue {
            client_prefix,
            trigger_addr,
            trigger_port,
            is_allow_reuse: is_allow_reuse as u8,
            _pad: 0,
        }
    }
}

// 16. `reuseport-socket-map` uses `FlowId` as its key directly; the value
// is a raw socket held by a SOCKMAP, not a struct defined here.

#[cfg(feature = "aya-pod")]
mod pod_impls {
    use super::*;

    macro_rules! impl_pod {
        ($($t:ty),* $(,)?) => {
            $(unsafe impl aya::Pod for $t {})*
        };
    }

    impl_pod!(
        InetAddr,
        Tuple,
        LpmKey<4>,
        LpmKey<16>,
        WanIpBindingKey,
        WanIpBindingValue,
        LanRouteValue,
        FlowTargetKey,
        FlowTargetValue,
        FlowMatchKey,
        FlowId,
        MarkAction,
        DnsMatchKey,
        FlowDnsKey,
        RouteCacheKey,
        RouteCacheValue,
        NatMappingKey,
        NatMappingValue,
        NatStaticValue,
        ConntrackKey,
        ConntrackValue,
        FragmentKey,
        FragmentValue,
        FirewallBlockValue,
        PinholeKey,
        PinholeValue,
        NeighbourKey,
        NeighbourValue,
        Ipv6PrefixCacheKey,
        Ipv6PrefixCacheValue,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_lpm_key_matches_prefixlen_plus_address_layout() {
        assert_eq!(core::mem::size_of::<Ipv4LpmKey>(), 4 + 4);
        let k = Ipv4LpmKey::new(24, [192, 168, 1, 0]);
        assert_eq!(k.prefix_len, 24);
        assert_eq!(k.addr, [192, 168, 1, 0]);
    }

    #[test]
    fn nat_mapping_key_and_value_are_plain_data_and_fixed_size() {
        let k = NatMappingKey::new(0, 6, 443, InetAddr::from_v4([1, 2, 3, 4]));
        assert_eq!(k.from_port, 443);
        let v = NatMappingValue::new(
            InetAddr::from_v4([9, 9, 9, 9]),
            51234,
            InetAddr::UNSPEC,
            0,
            false,
            true,
            1_000,
        );
        assert_eq!(v.mapped_port, 51234);
        assert!(v.is_allow_reuse != 0);
        assert_eq!(v.is_static, 0);
    }

    #[test]
    fn conntrack_key_packs_l4_proto_and_tuple() {
        let tuple = Tuple {
            src_addr: InetAddr::from_v4([10, 0, 0, 1]),
            dst_addr: InetAddr::from_v4([93, 184, 216, 34]),
            src_port: 51000,
            dst_port: 443,
        };
        let k = ConntrackKey::new(6, tuple);
        assert_eq!(k.l4_proto, 6);
        assert_eq!(k.tuple.dst_port, 443);
    }

    #[test]
    fn ipv6_prefix_cache_value_stores_reuse_flag_as_byte() {
        let v = Ipv6PrefixCacheValue::new([0; 8], InetAddr::UNSPEC, 0, true);
        assert_eq!(v.is_allow_reuse, 1);
    }
}
