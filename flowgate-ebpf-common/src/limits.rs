//! Map capacities and timer durations. All maps are sized at load time —
//! the in-kernel execution environment has no heap, so these are the hard
//! ceiling on concurrent flows, mappings, and cached fragments.

pub const FRAGMENT_CACHE_ENTRIES: u32 = 32 * 1024;
pub const NAT_MAPPING_ENTRIES: u32 = 128 * 1024;
pub const NAT_CONNTRACK_ENTRIES: u32 = 128 * 1024;
pub const ROUTE_CACHE_ENTRIES_PER_DIRECTION: u32 = 64 * 1024;
pub const FIREWALL_LPM_ENTRIES: u32 = 64 * 1024;
pub const IPV6_CLIENT_PREFIX_CACHE_ENTRIES: u32 = 16 * 1024;
pub const NEIGHBOUR_CACHE_ENTRIES: u32 = 8 * 1024;

/// Default NAT egress port probe range, used when the client's own source
/// port is already taken by another mapping.
pub const NAT_PORT_RANGE: core::ops::RangeInclusive<u16> = 32768..=65535;
/// Bounded-loop iteration cap for the port probe above; the verifier
/// requires the loop trip count to be statically bounded.
pub const NAT_PORT_PROBE_MAX_ATTEMPTS: u32 = 256;

pub const CONNTRACK_TIMEOUT_TCP_SYN_SECS: u64 = 6;
pub const CONNTRACK_TIMEOUT_TCP_TRANS_SECS: u64 = 240;
pub const CONNTRACK_TIMEOUT_TCP_SECS: u64 = 600;
pub const CONNTRACK_TIMEOUT_UDP_SECS: u64 = 300;

/// Maximum supported IPv6 extension header chain length before a packet is
/// treated as unparseable and dropped.
pub const MAX_IPV6_EXT_HEADERS: u8 = 6;

/// Mask isolating the 4-bit client id nibble preserved across IPv6 prefix
/// translation (bits 56-59 of the address, big-endian).
pub const IPV6_CLIENT_NIBBLE_BYTE: usize = 7;
