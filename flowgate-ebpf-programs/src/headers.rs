//! Minimal network header layouts. `aya-ebpf` ships BPF-specific bindings
//! only; these are the UAPI network headers, defined here the same way the
//! kernel programs in this data plane have always defined them.

use flowgate_ebpf_common::classify::{ipv4_fragment_type, ipv4_ihl, TcpFlags};
use flowgate_ebpf_common::proto::FragmentType;

#[repr(C)]
pub struct EthHdr {
    pub h_dest: [u8; 6],
    pub h_source: [u8; 6],
    pub h_proto: u16, // network byte order
}

#[repr(C)]
pub struct VlanHdr {
    pub tci: u16,
    pub encapsulated_proto: u16, // network byte order
}

/// Full 8-byte PPPoE session header: version/type, code, session id, payload
/// length, and the 2-byte PPP protocol field (0x0021 for IPv4, 0x0057 for
/// IPv6) that `try_decap` needs to restore the original ether-type.
#[repr(C)]
pub struct PppoeHdr {
    pub version_type: u8,
    pub code: u8,
    pub session_id: u16, // network byte order
    pub length: u16,     // network byte order, payload length after this header
    pub ppp_proto: u16,  // network byte order
}

/// Fixed 20-byte IPv4 header (no options).
#[repr(C)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: u16,  // network byte order
    pub id: u16,       // network byte order
    pub frag_off: u16, // network byte order; DF/MF flags + 13-bit offset
    pub ttl: u8,
    pub protocol: u8,
    pub check: u16,
    pub saddr: u32, // network byte order
    pub daddr: u32, // network byte order
}

impl Ipv4Hdr {
    #[inline(always)]
    pub fn ihl(&self) -> u8 {
        ipv4_ihl(self.version_ihl)
    }

    #[inline(always)]
    pub fn fragment_type(&self) -> FragmentType {
        ipv4_fragment_type(u16::from_be(self.frag_off))
    }
}

#[repr(C)]
pub struct Ipv6Hdr {
    pub version_tc_fl: u32,
    pub payload_len: u16, // network byte order
    pub next_header: u8,
    pub hop_limit: u8,
    pub saddr: [u8; 16],
    pub daddr: [u8; 16],
}

/// Generic IPv6 extension header (Hop-by-Hop, Routing, Destination, Auth):
/// next-header byte, length-in-8-octet-units byte, then payload.
#[repr(C)]
pub struct Ipv6ExtHdr {
    pub next_header: u8,
    pub hdr_ext_len: u8,
}

/// IPv6 Fragment extension header (fixed 8 bytes, no length field — its
/// size is implicit).
#[repr(C)]
pub struct Ipv6FragHdr {
    pub next_header: u8,
    pub reserved: u8,
    pub frag_off_res_m: u16, // network byte order: 13-bit offset, 2 reserved, M flag
    pub id: u32,             // network byte order
}

pub const NEXTHDR_HOP: u8 = 0;
pub const NEXTHDR_ROUTING: u8 = 43;
pub const NEXTHDR_FRAGMENT: u8 = 44;
pub const NEXTHDR_DEST: u8 = 60;
pub const NEXTHDR_AUTH: u8 = 51;

/// Fixed 20-byte TCP header (no options).
#[repr(C)]
pub struct TcpHdr {
    pub source: u16,  // network byte order
    pub dest: u16,    // network byte order
    pub seq: u32,     // network byte order
    pub ack_seq: u32, // network byte order
    pub doff_flags: u16,
    pub window: u16, // network byte order
    pub check: u16,
    pub urg_ptr: u16,
}

impl TcpHdr {
    #[inline(always)]
    pub fn doff(&self) -> u8 {
        ((u16::from_be(self.doff_flags) >> 12) & 0xF) as u8
    }

    #[inline(always)]
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte((u16::from_be(self.doff_flags) & 0x00FF) as u8)
    }
}

#[repr(C)]
pub struct UdpHdr {
    pub source: u16, // network byte order
    pub dest: u16,   // network byte order
    pub len: u16,    // network byte order
    pub check: u16,
}

/// Shared ICMPv4/ICMPv6 header shape: for query types (echo request/reply)
/// `id`/`seq` carry the echo identifier and sequence; for error types they
/// are unused padding and the original packet follows immediately after.
#[repr(C)]
pub struct IcmpHdr {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub id: u16,  // network byte order
    pub seq: u16, // network byte order
}
