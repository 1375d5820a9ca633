//! Header definitions and packet-access helpers shared by every
//! in-kernel processor binary in this crate. `no_std`, no entry point —
//! each `src/bin/*.rs` links this as an ordinary library and supplies its
//! own `#[xdp]`/`#[classifier]`/`#[kprobe]`/`#[sk_reuseport]` program plus
//! `#[panic_handler]`.
#![no_std]

pub mod fragment;
pub mod headers;
pub mod maps;
pub mod ptr;
pub mod scan;

pub use headers::{EthHdr, Ipv4Hdr, Ipv6Hdr, TcpHdr, UdpHdr, VlanHdr};
pub use ptr::ptr_at;

pub const ETH_P_IP: u16 = 0x0800_u16.swap_bytes();
pub const ETH_P_IPV6: u16 = 0x86DD_u16.swap_bytes();
pub const ETH_P_8021Q: u16 = 0x8100_u16.swap_bytes();
pub const ETH_P_8021AD: u16 = 0x88A8_u16.swap_bytes();
pub const ETH_P_PPPOE_SESSION: u16 = 0x8864_u16.swap_bytes();

pub const PPP_PROTO_IPV4: u16 = 0x0021_u16.swap_bytes();
pub const PPP_PROTO_IPV6: u16 = 0x0057_u16.swap_bytes();

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

/// Builds an `aya-ebpf` LPM-trie lookup key (`prefix_len` as bits, data
/// right behind it) for an exact-match address lookup.
#[inline(always)]
pub fn exact_lpm_key<const N: usize>(addr: [u8; N]) -> aya_ebpf::maps::lpm_trie::Key<[u8; N]> {
    aya_ebpf::maps::lpm_trie::Key::new((N as u32) * 8, addr)
}
