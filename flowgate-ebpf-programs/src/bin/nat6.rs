//! TC classifier: IPv6 Prefix Translator.
//!
//! Not full NAPT: the low 64 bits of the client address (minus the 4-bit
//! client id nibble carried at byte 7's high nibble) are preserved as-is
//! and ports are never remapped. Egress replaces the high 64 bits with
//! the router's current WAN prefix and remembers the original prefix,
//! plus the packet's destination as a pinhole trigger, in a cache keyed
//! by the low 64 bits, source port (or ICMPv6 echo id), id nibble and
//! protocol, so ingress can restore it and enforce restricted-cone
//! filtering. ICMPv6 echo reuses the same cache keyed on the echo
//! identifier; ICMPv6 error messages get their embedded original packet
//! rewritten instead of the envelope. A miss falls back to any
//! operator-declared static mapping before being passed to the kernel.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::bindings::TC_ACT_SHOT;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::checksum::{update_addr128, update_u16};
use flowgate_ebpf_common::classify::{classify_icmpv6, IcmpClass};
use flowgate_ebpf_common::maps::{
    FragmentKey, Ipv6PrefixCacheKey, Ipv6PrefixCacheValue, NatStaticValue, WanIpBindingKey,
};
use flowgate_ebpf_common::proto::{FragmentType, L3Proto};
use flowgate_ebpf_common::{Direction, InetAddr, L4Proto};
use flowgate_ebpf_programs::headers::IcmpHdr;
use flowgate_ebpf_programs::maps::{IPV6_CLIENT_PREFIX_CACHE, NAT_STATIC_V6, WAN_IP_BINDING};
use flowgate_ebpf_programs::ptr::ptr_at_mut;
use flowgate_ebpf_programs::scan::{self, ScanError};
use flowgate_ebpf_programs::{
    exact_lpm_key, fragment, ptr_at, EthHdr, Ipv6Hdr, TcpHdr, UdpHdr, ETH_P_IPV6, IPPROTO_ICMPV6, IPPROTO_TCP,
    IPPROTO_UDP,
};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_nat6_egress(ctx: TcContext) -> i32 {
    match try_nat6(&ctx, Direction::Egress) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

#[classifier]
pub fn flowgate_nat6_ingress(ctx: TcContext) -> i32 {
    match try_nat6(&ctx, Direction::Ingress) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

fn try_nat6(ctx: &TcContext, direction: Direction) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IPV6 {
        return Ok(TC_ACT_OK);
    }

    let ip = unsafe { ptr_at_mut::<Ipv6Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let scanned = match scan::scan_ipv6(data, data_end, ETH_HDR_LEN) {
        Ok(s) => s,
        Err(ScanError::Truncated) => return Err(()),
        Err(ScanError::Unsupported) => return Ok(TC_ACT_OK),
    };

    if scanned.l4_proto == IPPROTO_ICMPV6 {
        return nat6_icmp(ctx, data, data_end, ip, scanned.l4_off, direction);
    }
    let l4_proto = match scanned.l4_proto {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(TC_ACT_OK),
    };

    match direction {
        Direction::Egress => nat6_egress(
            ctx, data, data_end, ip, l4_proto, scanned.l4_off, scanned.fragment_type, scanned.frag_id,
        ),
        Direction::Ingress => {
            nat6_ingress(data, data_end, ip, l4_proto, scanned.l4_off, scanned.fragment_type, scanned.frag_id)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn nat6_egress(
    ctx: &TcContext,
    data: usize,
    data_end: usize,
    ip: *mut Ipv6Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    fragment_type: FragmentType,
    frag_id: u32,
) -> Result<i32, ()> {
    let ifindex = ctx.skb.ifindex();
    let src = InetAddr::from_v6(unsafe { (*ip).saddr });
    let dst = InetAddr::from_v6(unsafe { (*ip).daddr });

    let fragment_key = FragmentKey::new(L3Proto::V6 as u8, l4_proto as u8, frag_id, src, dst);
    let header_ports = match fragment_type {
        FragmentType::Single | FragmentType::First => Some(read_ports(data, data_end, l4_proto, l4_off)?),
        FragmentType::Middle | FragmentType::Last => None,
    };
    let (src_port, dst_port) = fragment::resolve_ports(fragment_type, fragment_key, header_ports)?;
    let touch_l4 = matches!(fragment_type, FragmentType::Single | FragmentType::First);

    let binding = unsafe { WAN_IP_BINDING.get(&WanIpBindingKey::new(ifindex, L3Proto::V6 as u8)) }.ok_or(())?;
    let wan_prefix = binding.wan_addr;

    let mut client_suffix = [0u8; 8];
    client_suffix.copy_from_slice(&src.v6_octets()[8..16]);
    let id_byte = src.ipv6_client_nibble();

    let cache_key = Ipv6PrefixCacheKey::new(client_suffix, src_port, id_byte, l4_proto as u8);
    let mut client_prefix = [0u8; 8];
    client_prefix.copy_from_slice(&src.v6_octets()[..8]);
    let cache_value = Ipv6PrefixCacheValue::new(client_prefix, dst, dst_port, false);
    let _ = IPV6_CLIENT_PREFIX_CACHE.insert(&cache_key, &cache_value, 0);

    let mut new_addr_bytes = wan_prefix.v6_octets();
    new_addr_bytes[8..16].copy_from_slice(&client_suffix);
    let new_addr = InetAddr::from_v6(new_addr_bytes).with_ipv6_client_nibble(id_byte);

    rewrite_address(ip, l4_proto, l4_off, data, data_end, src, new_addr, true, touch_l4)?;
    Ok(TC_ACT_OK)
}

#[allow(clippy::too_many_arguments)]
fn nat6_ingress(
    data: usize,
    data_end: usize,
    ip: *mut Ipv6Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    fragment_type: FragmentType,
    frag_id: u32,
) -> Result<i32, ()> {
    let src = InetAddr::from_v6(unsafe { (*ip).saddr });
    let dst = InetAddr::from_v6(unsafe { (*ip).daddr });
    let dst_with_nibble = dst.with_ipv6_client_nibble(0);
    let id_byte = dst.ipv6_client_nibble();

    let fragment_key = FragmentKey::new(L3Proto::V6 as u8, l4_proto as u8, frag_id, src, dst);
    let header_ports = match fragment_type {
        FragmentType::Single | FragmentType::First => Some(read_ports(data, data_end, l4_proto, l4_off)?),
        FragmentType::Middle | FragmentType::Last => None,
    };
    let (src_port, dst_port) = fragment::resolve_ports(fragment_type, fragment_key, header_ports)?;
    let touch_l4 = matches!(fragment_type, FragmentType::Single | FragmentType::First);

    let mut client_suffix = [0u8; 8];
    client_suffix.copy_from_slice(&dst_with_nibble.v6_octets()[8..16]);

    let cache_key = Ipv6PrefixCacheKey::new(client_suffix, dst_port, id_byte, l4_proto as u8);
    let entry = match unsafe { IPV6_CLIENT_PREFIX_CACHE.get(&cache_key) } {
        Some(e) => *e,
        None => return try_static_mapping_v6(ip, data, data_end, l4_proto, l4_off, dst, dst_port, touch_l4),
    };

    if entry.is_allow_reuse == 0 && (src != entry.trigger_addr || src_port != entry.trigger_port) {
        return Ok(TC_ACT_SHOT);
    }

    let mut restored_bytes = [0u8; 16];
    restored_bytes[..8].copy_from_slice(&entry.client_prefix);
    restored_bytes[8..16].copy_from_slice(&client_suffix);
    let restored = InetAddr::from_v6(restored_bytes).with_ipv6_client_nibble(id_byte);

    rewrite_address(ip, l4_proto, l4_off, data, data_end, dst, restored, false, touch_l4)?;
    Ok(TC_ACT_OK)
}

fn read_ports(data: usize, data_end: usize, l4_proto: L4Proto, l4_off: usize) -> Result<(u16, u16), ()> {
    match l4_proto {
        L4Proto::Tcp => {
            let tcp = unsafe { ptr_at::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
            Ok((unsafe { (*tcp).source }, unsafe { (*tcp).dest }))
        }
        L4Proto::Udp => {
            let udp = unsafe { ptr_at::<UdpHdr>(data, data_end, l4_off).ok_or(())? };
            Ok((unsafe { (*udp).source }, unsafe { (*udp).dest }))
        }
        _ => Err(()),
    }
}

/// Direction/l4/port key for `NAT_STATIC_V6`; the address bytes are only
/// meaningful when the entry was inserted with a prefix long enough to
/// cover them.
fn static_key_v6(direction: Direction, l4_proto: L4Proto, port: u16, addr: [u8; 16]) -> [u8; 21] {
    let mut bytes = [0u8; 21];
    bytes[0] = direction as u8;
    bytes[1] = l4_proto as u8;
    bytes[2] = (port >> 8) as u8;
    bytes[3] = port as u8;
    bytes[4..20].copy_from_slice(&addr);
    bytes
}

#[allow(clippy::too_many_arguments)]
fn try_static_mapping_v6(
    ip: *mut Ipv6Hdr,
    data: usize,
    data_end: usize,
    l4_proto: L4Proto,
    l4_off: usize,
    dst_addr: InetAddr,
    dst_port: u16,
    touch_l4: bool,
) -> Result<i32, ()> {
    let query = exact_lpm_key(static_key_v6(Direction::Ingress, l4_proto, dst_port, dst_addr.v6_octets()));
    let entry: NatStaticValue = match unsafe { NAT_STATIC_V6.get(&query) } {
        Some(e) => *e,
        None => return Ok(TC_ACT_OK),
    };
    if entry.mapped_addr == InetAddr::UNSPEC {
        return Ok(TC_ACT_OK);
    }
    rewrite_address(ip, l4_proto, l4_off, data, data_end, dst_addr, entry.mapped_addr, false, touch_l4)?;
    Ok(TC_ACT_OK)
}

fn rewrite_address(
    ip: *mut Ipv6Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    data: usize,
    data_end: usize,
    old_addr: InetAddr,
    new_addr: InetAddr,
    rewrite_src: bool,
    touch_l4: bool,
) -> Result<(), ()> {
    unsafe {
        if rewrite_src {
            (*ip).saddr = new_addr.v6_octets();
        } else {
            (*ip).daddr = new_addr.v6_octets();
        }
    }

    if !touch_l4 {
        return Ok(());
    }

    match l4_proto {
        L4Proto::Tcp => {
            let tcp = unsafe { ptr_at_mut::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
            unsafe {
                (*tcp).check = update_addr128((*tcp).check, &old_addr.v6_octets(), &new_addr.v6_octets());
            }
        }
        L4Proto::Udp => {
            let udp = unsafe { ptr_at_mut::<UdpHdr>(data, data_end, l4_off).ok_or(())? };
            unsafe {
                if (*udp).check != 0 {
                    (*udp).check = update_addr128((*udp).check, &old_addr.v6_octets(), &new_addr.v6_octets());
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn nat6_icmp(
    ctx: &TcContext,
    data: usize,
    data_end: usize,
    ip: *mut Ipv6Hdr,
    icmp_off: usize,
    direction: Direction,
) -> Result<i32, ()> {
    let icmp = unsafe { ptr_at_mut::<IcmpHdr>(data, data_end, icmp_off).ok_or(())? };
    match classify_icmpv6(unsafe { (*icmp).icmp_type }) {
        IcmpClass::Query => nat6_icmp_echo(ctx, ip, icmp, direction),
        IcmpClass::Error => nat6_icmp_error(data, data_end, ip, icmp_off, direction),
        IcmpClass::Unspec => Ok(TC_ACT_OK),
    }
}

/// Treats the echo identifier as the "port" slot of the prefix cache key:
/// no port translation happens, but the id still has to match on ingress
/// the way a real port would (restricted-cone minus the address check,
/// since the prefix rewrite already proves the source).
fn nat6_icmp_echo(ctx: &TcContext, ip: *mut Ipv6Hdr, icmp: *mut IcmpHdr, direction: Direction) -> Result<i32, ()> {
    let id = unsafe { (*icmp).id };
    match direction {
        Direction::Egress => {
            let ifindex = ctx.skb.ifindex();
            let src = InetAddr::from_v6(unsafe { (*ip).saddr });
            let dst = InetAddr::from_v6(unsafe { (*ip).daddr });
            let binding =
                unsafe { WAN_IP_BINDING.get(&WanIpBindingKey::new(ifindex, L3Proto::V6 as u8)) }.ok_or(())?;
            let wan_prefix = binding.wan_addr;

            let mut client_suffix = [0u8; 8];
            client_suffix.copy_from_slice(&src.v6_octets()[8..16]);
            let id_byte = src.ipv6_client_nibble();

            let cache_key = Ipv6PrefixCacheKey::new(client_suffix, id, id_byte, L4Proto::Icmpv6 as u8);
            let mut client_prefix = [0u8; 8];
            client_prefix.copy_from_slice(&src.v6_octets()[..8]);
            let cache_value = Ipv6PrefixCacheValue::new(client_prefix, dst, 0, false);
            let _ = IPV6_CLIENT_PREFIX_CACHE.insert(&cache_key, &cache_value, 0);

            let mut new_addr_bytes = wan_prefix.v6_octets();
            new_addr_bytes[8..16].copy_from_slice(&client_suffix);
            let new_addr = InetAddr::from_v6(new_addr_bytes).with_ipv6_client_nibble(id_byte);

            rewrite_icmp_addr(ip, icmp, src, new_addr, true);
            Ok(TC_ACT_OK)
        }
        Direction::Ingress => {
            let dst = InetAddr::from_v6(unsafe { (*ip).daddr });
            let dst_with_nibble = dst.with_ipv6_client_nibble(0);
            let id_byte = dst.ipv6_client_nibble();
            let mut client_suffix = [0u8; 8];
            client_suffix.copy_from_slice(&dst_with_nibble.v6_octets()[8..16]);

            let cache_key = Ipv6PrefixCacheKey::new(client_suffix, id, id_byte, L4Proto::Icmpv6 as u8);
            let entry = match unsafe { IPV6_CLIENT_PREFIX_CACHE.get(&cache_key) } {
                Some(e) => *e,
                None => return Ok(TC_ACT_OK),
            };
            if entry.is_allow_reuse == 0 {
                let src = InetAddr::from_v6(unsafe { (*ip).saddr });
                if src != entry.trigger_addr {
                    return Ok(TC_ACT_SHOT);
                }
            }

            let mut restored_bytes = [0u8; 16];
            restored_bytes[..8].copy_from_slice(&entry.client_prefix);
            restored_bytes[8..16].copy_from_slice(&client_suffix);
            let restored = InetAddr::from_v6(restored_bytes).with_ipv6_client_nibble(id_byte);

            rewrite_icmp_addr(ip, icmp, dst, restored, false);
            Ok(TC_ACT_OK)
        }
    }
}

fn rewrite_icmp_addr(ip: *mut Ipv6Hdr, icmp: *mut IcmpHdr, old_addr: InetAddr, new_addr: InetAddr, rewrite_src: bool) {
    unsafe {
        (*icmp).checksum = update_addr128((*icmp).checksum, &old_addr.v6_octets(), &new_addr.v6_octets());
        if rewrite_src {
            (*ip).saddr = new_addr.v6_octets();
        } else {
            (*ip).daddr = new_addr.v6_octets();
        }
    }
}

/// Same embedded-packet rewrite idea as the IPv4 engine's ICMP error
/// handling, just with 128-bit checksum deltas and no port translation.
/// Only handles errors arriving from WAN (ingress): the embedded source
/// still carries the WAN-prefixed address and needs restoring to the
/// LAN client, the same way an ordinary ingress packet would. Errors
/// raised about our own egress traffic are left untranslated.
fn nat6_icmp_error(
    data: usize,
    data_end: usize,
    ip: *mut Ipv6Hdr,
    icmp_off: usize,
    direction: Direction,
) -> Result<i32, ()> {
    if direction == Direction::Egress {
        return Ok(TC_ACT_OK);
    }

    let inner = match scan::parse_icmpv6_error_inner(data, data_end, icmp_off) {
        Ok(inner) => inner,
        Err(ScanError::Truncated) => return Err(()),
        Err(ScanError::Unsupported) => return Ok(TC_ACT_OK),
    };
    let inner_l4 = match inner.l4_proto {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(TC_ACT_OK),
    };

    let old_addr = inner.src_addr;
    let id_byte = old_addr.ipv6_client_nibble();
    let mut client_suffix = [0u8; 8];
    client_suffix.copy_from_slice(&old_addr.with_ipv6_client_nibble(0).v6_octets()[8..16]);
    let cache_key = Ipv6PrefixCacheKey::new(client_suffix, inner.src_port, id_byte, inner_l4 as u8);
    let entry = match unsafe { IPV6_CLIENT_PREFIX_CACHE.get(&cache_key) } {
        Some(e) => *e,
        None => return Ok(TC_ACT_OK),
    };

    let mut restored_bytes = [0u8; 16];
    restored_bytes[..8].copy_from_slice(&entry.client_prefix);
    restored_bytes[8..16].copy_from_slice(&client_suffix);
    let new_addr = InetAddr::from_v6(restored_bytes).with_ipv6_client_nibble(id_byte);

    rewrite_icmp_error_inner(data, data_end, icmp_off, inner_l4, old_addr, new_addr, true)?;

    let outer_dst = InetAddr::from_v6(unsafe { (*ip).daddr });
    if outer_dst == old_addr {
        unsafe { (*ip).daddr = new_addr.v6_octets() };
    }

    Ok(TC_ACT_OK)
}

fn rewrite_icmp_error_inner(
    data: usize,
    data_end: usize,
    icmp_off: usize,
    inner_l4: L4Proto,
    old_addr: InetAddr,
    new_addr: InetAddr,
    rewrite_src: bool,
) -> Result<(), ()> {
    let inner_ip_off = icmp_off + core::mem::size_of::<IcmpHdr>();
    let icmp = unsafe { ptr_at_mut::<IcmpHdr>(data, data_end, icmp_off).ok_or(())? };
    let inner_ip = unsafe { ptr_at_mut::<Ipv6Hdr>(data, data_end, inner_ip_off).ok_or(())? };
    let inner_scan = scan::scan_ipv6(data, data_end, inner_ip_off).map_err(|_| ())?;

    unsafe {
        let mut icmp_check = (*icmp).checksum;

        match inner_l4 {
            L4Proto::Tcp => {
                let tcp = ptr_at_mut::<TcpHdr>(data, data_end, inner_scan.l4_off).ok_or(())?;
                let old_check = (*tcp).check;
                let new_check = update_addr128(old_check, &old_addr.v6_octets(), &new_addr.v6_octets());
                icmp_check = update_u16(icmp_check, old_check, new_check);
                (*tcp).check = new_check;
            }
            L4Proto::Udp => {
                let udp = ptr_at_mut::<UdpHdr>(data, data_end, inner_scan.l4_off).ok_or(())?;
                if (*udp).check != 0 {
                    let old_check = (*udp).check;
                    let new_check = update_addr128(old_check, &old_addr.v6_octets(), &new_addr.v6_octets());
                    icmp_check = update_u16(icmp_check, old_check, new_check);
                    (*udp).check = new_check;
                }
            }
            _ => {}
        }

        icmp_check = update_addr128(icmp_check, &old_addr.v6_octets(), &new_addr.v6_octets());
        (*icmp).checksum = icmp_check;

        if rewrite_src {
            (*inner_ip).saddr = new_addr.v6_octets();
        } else {
            (*inner_ip).daddr = new_addr.v6_octets();
        }
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
