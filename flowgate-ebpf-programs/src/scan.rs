//! Packet Scanner: walks an IPv4/IPv6 header (plus, for IPv6, its
//! extension-header chain) down to the real L4 protocol, and parses the
//! embedded original packet carried inside an ICMP/ICMPv6 error message.
//! Every processor that needs to know "what L4 header starts at which
//! offset" goes through here instead of repeating the walk itself.

use flowgate_ebpf_common::addr::InetAddr;
use flowgate_ebpf_common::classify::IP_OFFSET_MASK;
use flowgate_ebpf_common::limits::MAX_IPV6_EXT_HEADERS;
use flowgate_ebpf_common::proto::FragmentType;

use crate::headers::{
    IcmpHdr, Ipv4Hdr, Ipv6ExtHdr, Ipv6FragHdr, Ipv6Hdr, NEXTHDR_AUTH, NEXTHDR_DEST, NEXTHDR_FRAGMENT,
    NEXTHDR_HOP, NEXTHDR_ROUTING,
};
use crate::ptr::ptr_at;
use crate::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP, IPPROTO_UDP};

const IPV6_HDR_LEN: usize = core::mem::size_of::<Ipv6Hdr>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// A header the scan needed to read runs past `data_end`.
    Truncated,
    /// The chain is structurally valid but this processor doesn't handle
    /// it: more than [`MAX_IPV6_EXT_HEADERS`] extension headers, a
    /// fragmented ICMP error, or an ICMP error nested inside another.
    Unsupported,
}

/// Where the L4 header starts and what it is, plus the fragmentation state
/// of the packet it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3Scan {
    pub l4_proto: u8,
    pub l4_off: usize,
    pub fragment_type: FragmentType,
    pub frag_id: u32,
}

pub fn scan_ipv4(data: usize, data_end: usize, ip_off: usize) -> Result<L3Scan, ScanError> {
    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ip_off) }.ok_or(ScanError::Truncated)?;
    let ip_hdr_len = unsafe { (*ip).ihl() as usize } * 4;
    Ok(L3Scan {
        l4_proto: unsafe { (*ip).protocol },
        l4_off: ip_off + ip_hdr_len,
        fragment_type: unsafe { (*ip).fragment_type() },
        frag_id: u32::from(u16::from_be(unsafe { (*ip).id })),
    })
}

/// Walks Hop-by-Hop/Routing/Fragment/Destination/Authentication extension
/// headers until the real L4 protocol is reached or [`MAX_IPV6_EXT_HEADERS`]
/// have been consumed. A 7th extension header is `Unsupported`, matching the
/// scanner's documented ceiling.
pub fn scan_ipv6(data: usize, data_end: usize, ip_off: usize) -> Result<L3Scan, ScanError> {
    let ip = unsafe { ptr_at::<Ipv6Hdr>(data, data_end, ip_off) }.ok_or(ScanError::Truncated)?;
    let mut next_header = unsafe { (*ip).next_header };
    let mut offset = ip_off + IPV6_HDR_LEN;
    let mut fragment_type = FragmentType::Single;
    let mut frag_id: u32 = 0;

    for _ in 0..MAX_IPV6_EXT_HEADERS {
        match next_header {
            NEXTHDR_FRAGMENT => {
                let frag =
                    unsafe { ptr_at::<Ipv6FragHdr>(data, data_end, offset) }.ok_or(ScanError::Truncated)?;
                let raw = u16::from_be(unsafe { (*frag).frag_off_res_m });
                let more_fragments = raw & 0x1 != 0;
                let frag_offset = (raw >> 3) & 0x1FFF;
                fragment_type = match (more_fragments, frag_offset) {
                    (false, 0) => FragmentType::Single,
                    (true, 0) => FragmentType::First,
                    (true, _) => FragmentType::Middle,
                    (false, _) => FragmentType::Last,
                };
                frag_id = u32::from_be(unsafe { (*frag).id });
                next_header = unsafe { (*frag).next_header };
                offset += core::mem::size_of::<Ipv6FragHdr>();
            }
            NEXTHDR_HOP | NEXTHDR_ROUTING | NEXTHDR_DEST => {
                let ext =
                    unsafe { ptr_at::<Ipv6ExtHdr>(data, data_end, offset) }.ok_or(ScanError::Truncated)?;
                let len = (unsafe { (*ext).hdr_ext_len } as usize + 1) * 8;
                next_header = unsafe { (*ext).next_header };
                offset += len;
            }
            NEXTHDR_AUTH => {
                let ext =
                    unsafe { ptr_at::<Ipv6ExtHdr>(data, data_end, offset) }.ok_or(ScanError::Truncated)?;
                let len = (unsafe { (*ext).hdr_ext_len } as usize + 2) * 4;
                next_header = unsafe { (*ext).next_header };
                offset += len;
            }
            _ => return Ok(L3Scan { l4_proto: next_header, l4_off: offset, fragment_type, frag_id }),
        }
    }

    match next_header {
        NEXTHDR_HOP | NEXTHDR_ROUTING | NEXTHDR_DEST | NEXTHDR_AUTH | NEXTHDR_FRAGMENT => {
            Err(ScanError::Unsupported)
        }
        _ => Ok(L3Scan { l4_proto: next_header, l4_off: offset, fragment_type, frag_id }),
    }
}

/// The original flow an ICMPv4 error message was raised about, read out of
/// the embedded IP+L4 headers the error carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpInnerV4 {
    pub l4_proto: u8,
    pub src_addr: InetAddr,
    pub dst_addr: InetAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Refuses a second nested error and refuses an inner packet whose
/// fragment offset is non-zero (the original source/port can't be trusted
/// without the first fragment).
pub fn parse_icmpv4_error_inner(
    data: usize,
    data_end: usize,
    icmp_off: usize,
) -> Result<IcmpInnerV4, ScanError> {
    let inner_ip_off = icmp_off + core::mem::size_of::<IcmpHdr>();
    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, inner_ip_off) }.ok_or(ScanError::Truncated)?;
    let protocol = unsafe { (*ip).protocol };
    if protocol == IPPROTO_ICMP {
        return Err(ScanError::Unsupported);
    }
    let frag_off = u16::from_be(unsafe { (*ip).frag_off }) & IP_OFFSET_MASK;
    if frag_off != 0 {
        return Err(ScanError::Unsupported);
    }
    if protocol != IPPROTO_TCP && protocol != IPPROTO_UDP {
        return Err(ScanError::Unsupported);
    }

    let ip_hdr_len = unsafe { (*ip).ihl() as usize } * 4;
    let l4_off = inner_ip_off + ip_hdr_len;
    let ports = unsafe { ptr_at::<[u16; 2]>(data, data_end, l4_off) }.ok_or(ScanError::Truncated)?;

    Ok(IcmpInnerV4 {
        l4_proto: protocol,
        src_addr: InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes()),
        dst_addr: InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes()),
        src_port: unsafe { (*ports)[0] },
        dst_port: unsafe { (*ports)[1] },
    })
}

/// Same shape as [`IcmpInnerV4`] for an ICMPv6 error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpInnerV6 {
    pub l4_proto: u8,
    pub src_addr: InetAddr,
    pub dst_addr: InetAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

pub fn parse_icmpv6_error_inner(
    data: usize,
    data_end: usize,
    icmp_off: usize,
) -> Result<IcmpInnerV6, ScanError> {
    let inner_ip_off = icmp_off + core::mem::size_of::<IcmpHdr>();
    let ip = unsafe { ptr_at::<Ipv6Hdr>(data, data_end, inner_ip_off) }.ok_or(ScanError::Truncated)?;
    if unsafe { (*ip).next_header } == IPPROTO_ICMPV6 {
        return Err(ScanError::Unsupported);
    }

    let scanned = scan_ipv6(data, data_end, inner_ip_off)?;
    if scanned.l4_proto != IPPROTO_TCP && scanned.l4_proto != IPPROTO_UDP {
        return Err(ScanError::Unsupported);
    }
    let ports = unsafe { ptr_at::<[u16; 2]>(data, data_end, scanned.l4_off) }.ok_or(ScanError::Truncated)?;

    Ok(IcmpInnerV6 {
        l4_proto: scanned.l4_proto,
        src_addr: InetAddr::from_v6(unsafe { (*ip).saddr }),
        dst_addr: InetAddr::from_v6(unsafe { (*ip).daddr }),
        src_port: unsafe { (*ports)[0] },
        dst_port: unsafe { (*ports)[1] },
    })
}
