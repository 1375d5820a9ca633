//! Pinned map declarations shared across processor binaries. Each binary
//! links this module and therefore declares the same map names and
//! layouts; the loader (`flowgate-ebpf`) pins every one of them under a
//! single directory at load time so every processor attached by the
//! control plane sees the same underlying map object.

use aya_ebpf::macros::map;
use aya_ebpf::maps::{Array, HashMap, LpmTrie, LruHashMap, RingBuf};

use flowgate_ebpf_common::limits::{
    FIREWALL_LPM_ENTRIES, FRAGMENT_CACHE_ENTRIES, IPV6_CLIENT_PREFIX_CACHE_ENTRIES,
    NAT_CONNTRACK_ENTRIES, NAT_MAPPING_ENTRIES, NEIGHBOUR_CACHE_ENTRIES,
    ROUTE_CACHE_ENTRIES_PER_DIRECTION,
};
use flowgate_ebpf_common::maps::{
    ConntrackKey, ConntrackValue, FirewallBlockValue, FlowDnsKey, FlowId, FlowMatchKey,
    FlowTargetKey, FlowTargetValue, FragmentKey, FragmentValue, Ipv6PrefixCacheKey,
    Ipv6PrefixCacheValue, MarkAction, NatMappingKey, NatMappingValue, NatStaticValue,
    NeighbourKey, NeighbourValue, PinholeKey, PinholeValue, RouteCacheKey, RouteCacheValue,
    WanIpBindingKey, WanIpBindingValue,
};

#[map(name = "wan_ip_binding", pinning = "by_name")]
pub static WAN_IP_BINDING: HashMap<WanIpBindingKey, WanIpBindingValue> =
    HashMap::with_max_entries(64, 0);

#[map(name = "lan_route_v4", pinning = "by_name")]
pub static LAN_ROUTE_V4: LpmTrie<[u8; 4], flowgate_ebpf_common::maps::LanRouteValue> =
    LpmTrie::with_max_entries(4096, 0);

#[map(name = "lan_route_v6", pinning = "by_name")]
pub static LAN_ROUTE_V6: LpmTrie<[u8; 16], flowgate_ebpf_common::maps::LanRouteValue> =
    LpmTrie::with_max_entries(4096, 0);

#[map(name = "flow_target", pinning = "by_name")]
pub static FLOW_TARGET: HashMap<FlowTargetKey, FlowTargetValue> = HashMap::with_max_entries(2048, 0);

#[map(name = "flow_match", pinning = "by_name")]
pub static FLOW_MATCH: HashMap<FlowMatchKey, FlowId> = HashMap::with_max_entries(4096, 0);

/// A flattened stand-in for the nested `{flow_id} -> LPM{dst_addr}` map:
/// the flow id is folded into the LPM key's low byte alongside the prefix
/// length field rather than selecting a per-flow inner trie, since
/// `BPF_MAP_TYPE_HASH_OF_MAPS` has no safe `aya-ebpf` binding yet.
#[map(name = "per_flow_ip_v4", pinning = "by_name")]
pub static PER_FLOW_IP_V4: LpmTrie<[u8; 5], MarkAction> = LpmTrie::with_max_entries(16384, 0);

#[map(name = "per_flow_ip_v6", pinning = "by_name")]
pub static PER_FLOW_IP_V6: LpmTrie<[u8; 17], MarkAction> = LpmTrie::with_max_entries(16384, 0);

#[map(name = "per_flow_dns", pinning = "by_name")]
pub static PER_FLOW_DNS: HashMap<FlowDnsKey, MarkAction> = HashMap::with_max_entries(8192, 0);

#[map(name = "route_cache_wan", pinning = "by_name")]
pub static ROUTE_CACHE_WAN: HashMap<RouteCacheKey, RouteCacheValue> =
    HashMap::with_max_entries(ROUTE_CACHE_ENTRIES_PER_DIRECTION, 0);

#[map(name = "route_cache_lan", pinning = "by_name")]
pub static ROUTE_CACHE_LAN: HashMap<RouteCacheKey, RouteCacheValue> =
    HashMap::with_max_entries(ROUTE_CACHE_ENTRIES_PER_DIRECTION, 0);

#[map(name = "nat_mapping", pinning = "by_name")]
pub static NAT_MAPPING: HashMap<NatMappingKey, NatMappingValue> =
    HashMap::with_max_entries(NAT_MAPPING_ENTRIES, 0);

#[map(name = "nat_static_v4", pinning = "by_name")]
pub static NAT_STATIC_V4: LpmTrie<[u8; 9], NatStaticValue> = LpmTrie::with_max_entries(1024, 0);

#[map(name = "nat_static_v6", pinning = "by_name")]
pub static NAT_STATIC_V6: LpmTrie<[u8; 21], NatStaticValue> = LpmTrie::with_max_entries(1024, 0);

#[map(name = "nat_conntrack", pinning = "by_name")]
pub static NAT_CONNTRACK: LruHashMap<ConntrackKey, ConntrackValue> =
    LruHashMap::with_max_entries(NAT_CONNTRACK_ENTRIES, 0);

#[map(name = "fragment_cache", pinning = "by_name")]
pub static FRAGMENT_CACHE: LruHashMap<FragmentKey, FragmentValue> =
    LruHashMap::with_max_entries(FRAGMENT_CACHE_ENTRIES, 0);

#[map(name = "firewall_block_v4", pinning = "by_name")]
pub static FIREWALL_BLOCK_V4: LpmTrie<[u8; 4], FirewallBlockValue> =
    LpmTrie::with_max_entries(FIREWALL_LPM_ENTRIES, 0);

#[map(name = "firewall_block_v6", pinning = "by_name")]
pub static FIREWALL_BLOCK_V6: LpmTrie<[u8; 16], FirewallBlockValue> =
    LpmTrie::with_max_entries(FIREWALL_LPM_ENTRIES, 0);

#[map(name = "firewall_pinhole", pinning = "by_name")]
pub static FIREWALL_PINHOLE: HashMap<PinholeKey, PinholeValue> =
    HashMap::with_max_entries(16384, 0);

#[map(name = "neighbour_cache_v4", pinning = "by_name")]
pub static NEIGHBOUR_CACHE_V4: HashMap<NeighbourKey, NeighbourValue> =
    HashMap::with_max_entries(NEIGHBOUR_CACHE_ENTRIES, 0);

#[map(name = "neighbour_cache_v6", pinning = "by_name")]
pub static NEIGHBOUR_CACHE_V6: HashMap<NeighbourKey, NeighbourValue> =
    HashMap::with_max_entries(NEIGHBOUR_CACHE_ENTRIES, 0);

#[map(name = "ipv6_client_prefix_cache", pinning = "by_name")]
pub static IPV6_CLIENT_PREFIX_CACHE: LruHashMap<Ipv6PrefixCacheKey, Ipv6PrefixCacheValue> =
    LruHashMap::with_max_entries(IPV6_CLIENT_PREFIX_CACHE_ENTRIES, 0);

// `reuseport-socket-map` (flow_id -> socket) is declared directly in
// `dns_dispatch.rs`: aya-ebpf's `SockMap` does not implement the traits
// this module's other maps share, and no other binary touches it.

/// Global counter of dropped packets per cause, read by the loader for
/// `flowgate_dropped_packets_total`.
#[map(name = "drop_counters", pinning = "by_name")]
pub static DROP_COUNTERS: Array<u64> = Array::with_max_entries(16, 0);

/// Carries enough of an oversize PPPoE-uplink packet for userspace to
/// synthesize an ICMP/ICMPv6 "too big" reply; the kernel side never builds
/// the ICMP message itself.
#[map(name = "icmp_notice", pinning = "by_name")]
pub static ICMP_NOTICE: RingBuf = RingBuf::with_byte_size(64 * 1024, 0);
