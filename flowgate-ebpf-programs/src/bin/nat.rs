//! TC classifier: IPv4 NAT Engine.
//!
//! Egress: allocates (or refreshes) a NAPT mapping pair, captures the
//! packet's destination as the pinhole trigger, and rewrites the source
//! address/port plus checksums. Ingress: looks up the paired mapping by
//! destination address/port, enforces restricted-cone filtering, and
//! rewrites the destination back to the original client. A TCP conntrack
//! state machine tracks handshake/established/closing state per flow so
//! the sweep in `flowgate-lib` can reap it on the right timer. ICMP echo
//! reuses the same mapping machinery keyed on the echo identifier; ICMP
//! error messages get their embedded original packet rewritten instead of
//! the envelope. A packet with no dynamic mapping falls back to any
//! operator-declared static mapping before being passed to the kernel.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::bindings::TC_ACT_SHOT;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::checksum::{update_u16, update_u32};
use flowgate_ebpf_common::classify::{classify_icmpv4, classify_tcp, IcmpClass};
use flowgate_ebpf_common::limits::{
    CONNTRACK_TIMEOUT_TCP_SECS, CONNTRACK_TIMEOUT_TCP_SYN_SECS, CONNTRACK_TIMEOUT_TCP_TRANS_SECS,
    CONNTRACK_TIMEOUT_UDP_SECS, NAT_PORT_PROBE_MAX_ATTEMPTS, NAT_PORT_RANGE,
};
use flowgate_ebpf_common::maps::{
    ConntrackKey, ConntrackValue, FragmentKey, NatMappingKey, NatMappingValue, NatStaticValue,
    WanIpBindingKey,
};
use flowgate_ebpf_common::proto::{ConntrackState, FragmentType, L3Proto, PktClass};
use flowgate_ebpf_common::{Direction, InetAddr, L4Proto, Tuple};
use flowgate_ebpf_programs::maps::{NAT_CONNTRACK, NAT_MAPPING, NAT_STATIC_V4, WAN_IP_BINDING};
use flowgate_ebpf_programs::ptr::ptr_at_mut;
use flowgate_ebpf_programs::headers::IcmpHdr;
use flowgate_ebpf_programs::scan::{self, ScanError};
use flowgate_ebpf_programs::{
    exact_lpm_key, fragment, ptr_at, EthHdr, Ipv4Hdr, TcpHdr, UdpHdr, ETH_P_IP, IPPROTO_ICMP,
    IPPROTO_TCP, IPPROTO_UDP,
};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_nat_egress(ctx: TcContext) -> i32 {
    match try_nat(&ctx, Direction::Egress) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

#[classifier]
pub fn flowgate_nat_ingress(ctx: TcContext) -> i32 {
    match try_nat(&ctx, Direction::Ingress) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

fn try_nat(ctx: &TcContext, direction: Direction) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IP {
        return Ok(TC_ACT_OK);
    }

    let ip = unsafe { ptr_at_mut::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let scanned = match scan::scan_ipv4(data, data_end, ETH_HDR_LEN) {
        Ok(s) => s,
        Err(ScanError::Truncated) => return Err(()),
        Err(ScanError::Unsupported) => return Ok(TC_ACT_OK),
    };

    if scanned.l4_proto == IPPROTO_ICMP {
        return nat_icmp(ctx, data, data_end, ip, scanned.l4_off, direction);
    }
    let l4_proto = match scanned.l4_proto {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(TC_ACT_OK),
    };

    match direction {
        Direction::Egress => {
            nat_egress(ctx, data, data_end, ip, l4_proto, scanned.l4_off, scanned.fragment_type, scanned.frag_id)
        }
        Direction::Ingress => {
            nat_ingress(data, data_end, ip, l4_proto, scanned.l4_off, scanned.fragment_type, scanned.frag_id)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn nat_egress(
    ctx: &TcContext,
    data: usize,
    data_end: usize,
    ip: *mut Ipv4Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    fragment_type: FragmentType,
    frag_id: u32,
) -> Result<i32, ()> {
    let ifindex = ctx.skb.ifindex();
    let src_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let dst_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());

    let fragment_key = FragmentKey::new(L3Proto::V4 as u8, l4_proto as u8, frag_id, src_addr, dst_addr);
    let header_ports = match fragment_type {
        FragmentType::Single | FragmentType::First => Some(read_ports(data, data_end, l4_proto, l4_off)?),
        FragmentType::Middle | FragmentType::Last => None,
    };
    let (src_port, dst_port) = fragment::resolve_ports(fragment_type, fragment_key, header_ports)?;
    let touch_l4 = matches!(fragment_type, FragmentType::Single | FragmentType::First);

    let egress_key = NatMappingKey::new(Direction::Egress as u8, l4_proto as u8, src_port, src_addr);
    let now = now_secs();

    let mapping = match unsafe { NAT_MAPPING.get(&egress_key) } {
        Some(existing) => {
            let refreshed = NatMappingValue::new(
                existing.mapped_addr,
                existing.mapped_port,
                existing.trigger_addr,
                existing.trigger_port,
                existing.is_static != 0,
                existing.is_allow_reuse != 0,
                now,
            );
            let _ = NAT_MAPPING.insert(&egress_key, &refreshed, 0);
            refreshed
        }
        None => allocate_mapping(ifindex, l4_proto, src_addr, src_port, dst_addr, dst_port, now)?,
    };

    if touch_l4 {
        rewrite_ipv4_and_l4(
            ip, l4_proto, l4_off, data, data_end, src_addr, src_port, mapping.mapped_addr, mapping.mapped_port,
            true,
        )?;
    } else {
        rewrite_ipv4_addr_only(ip, src_addr, mapping.mapped_addr, true);
    }

    let (tcp_flags, payload_len) = if l4_proto == L4Proto::Tcp && touch_l4 {
        tcp_meta(data, data_end, l4_off)?
    } else {
        (Default::default(), 0)
    };
    bump_conntrack(
        l4_proto,
        mapping.mapped_addr,
        mapping.mapped_port,
        dst_addr,
        dst_port,
        Direction::Egress,
        tcp_flags,
        payload_len,
        now,
    );
    Ok(TC_ACT_OK)
}

#[allow(clippy::too_many_arguments)]
fn nat_ingress(
    data: usize,
    data_end: usize,
    ip: *mut Ipv4Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    fragment_type: FragmentType,
    frag_id: u32,
) -> Result<i32, ()> {
    let src_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let dst_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());

    let fragment_key = FragmentKey::new(L3Proto::V4 as u8, l4_proto as u8, frag_id, src_addr, dst_addr);
    let header_ports = match fragment_type {
        FragmentType::Single | FragmentType::First => Some(read_ports(data, data_end, l4_proto, l4_off)?),
        FragmentType::Middle | FragmentType::Last => None,
    };
    let (src_port, dst_port) = fragment::resolve_ports(fragment_type, fragment_key, header_ports)?;
    let touch_l4 = matches!(fragment_type, FragmentType::Single | FragmentType::First);

    let ingress_key = NatMappingKey::new(Direction::Ingress as u8, l4_proto as u8, dst_port, dst_addr);
    let mapping = match unsafe { NAT_MAPPING.get(&ingress_key) } {
        Some(m) => *m,
        None => return try_static_mapping_v4(ip, data, data_end, l4_proto, l4_off, dst_addr, dst_port, touch_l4),
    };

    if mapping.is_allow_reuse == 0 && (src_addr != mapping.trigger_addr || src_port != mapping.trigger_port) {
        return Ok(TC_ACT_SHOT);
    }

    if touch_l4 {
        rewrite_ipv4_and_l4(
            ip, l4_proto, l4_off, data, data_end, dst_addr, dst_port, mapping.mapped_addr, mapping.mapped_port,
            false,
        )?;
    } else {
        rewrite_ipv4_addr_only(ip, dst_addr, mapping.mapped_addr, false);
    }

    let (tcp_flags, payload_len) = if l4_proto == L4Proto::Tcp && touch_l4 {
        tcp_meta(data, data_end, l4_off)?
    } else {
        (Default::default(), 0)
    };
    bump_conntrack(
        l4_proto,
        dst_addr,
        dst_port,
        src_addr,
        src_port,
        Direction::Ingress,
        tcp_flags,
        payload_len,
        now_secs(),
    );
    Ok(TC_ACT_OK)
}

fn now_secs() -> u64 {
    unsafe { aya_ebpf::helpers::bpf_ktime_get_ns() } / 1_000_000_000
}

#[allow(clippy::too_many_arguments)]
fn allocate_mapping(
    ifindex: u32,
    l4_proto: L4Proto,
    src_addr: InetAddr,
    src_port: u16,
    dst_addr: InetAddr,
    dst_port: u16,
    now: u64,
) -> Result<NatMappingValue, ()> {
    let binding = unsafe { WAN_IP_BINDING.get(&WanIpBindingKey::new(ifindex, 0)) }.ok_or(())?;
    let wan_addr = binding.wan_addr;

    let mut chosen_port = src_port;
    let mut found = false;
    let range_start = *NAT_PORT_RANGE.start();
    let range_len = (*NAT_PORT_RANGE.end() - range_start) as u32 + 1;

    for attempt in 0..NAT_PORT_PROBE_MAX_ATTEMPTS {
        let candidate = if attempt == 0 {
            src_port
        } else {
            range_start.wrapping_add(((src_port as u32 + attempt) % range_len) as u16)
        };
        let probe_key = NatMappingKey::new(Direction::Ingress as u8, l4_proto as u8, candidate, wan_addr);
        let taken = match unsafe { NAT_MAPPING.get(&probe_key) } {
            Some(existing) => {
                let trans_timeout =
                    if l4_proto == L4Proto::Tcp { CONNTRACK_TIMEOUT_TCP_TRANS_SECS } else { CONNTRACK_TIMEOUT_UDP_SECS };
                now.saturating_sub(existing.last_active) < trans_timeout
            }
            None => false,
        };
        if !taken {
            chosen_port = candidate;
            found = true;
            break;
        }
    }
    if !found {
        return Err(());
    }

    let egress_key = NatMappingKey::new(Direction::Egress as u8, l4_proto as u8, src_port, src_addr);
    let ingress_key = NatMappingKey::new(Direction::Ingress as u8, l4_proto as u8, chosen_port, wan_addr);

    let egress_value = NatMappingValue::new(wan_addr, chosen_port, InetAddr::UNSPEC, 0, false, false, now);
    let ingress_value = NatMappingValue::new(src_addr, src_port, dst_addr, dst_port, false, false, now);

    NAT_MAPPING.insert(&egress_key, &egress_value, 0).map_err(|_| ())?;
    if NAT_MAPPING.insert(&ingress_key, &ingress_value, 0).is_err() {
        let _ = NAT_MAPPING.remove(&egress_key);
        return Err(());
    }

    Ok(egress_value)
}

/// Direction/L3/L4/port key for `NAT_STATIC_V4`; the address bytes are
/// only meaningful when the entry was inserted with a prefix long enough
/// to cover them (most static port-forwards aren't).
fn static_key_v4(direction: Direction, l4_proto: L4Proto, port: u16, addr: [u8; 4]) -> [u8; 9] {
    let mut bytes = [0u8; 9];
    bytes[0] = direction as u8;
    bytes[1] = L3Proto::V4 as u8;
    bytes[2] = l4_proto as u8;
    bytes[3] = (port >> 8) as u8;
    bytes[4] = port as u8;
    bytes[5..9].copy_from_slice(&addr);
    bytes
}

/// No dynamic mapping matched this ingress packet: consult the
/// operator-declared static forwards. A mapped address of `UNSPEC` is DMZ
/// mode (deliver to the local stack unchanged, only remapping the port if
/// one was given); otherwise the destination is rewritten like an
/// ordinary NAT ingress rewrite, just without a paired egress mapping or
/// conntrack entry.
#[allow(clippy::too_many_arguments)]
fn try_static_mapping_v4(
    ip: *mut Ipv4Hdr,
    data: usize,
    data_end: usize,
    l4_proto: L4Proto,
    l4_off: usize,
    dst_addr: InetAddr,
    dst_port: u16,
    touch_l4: bool,
) -> Result<i32, ()> {
    let query = exact_lpm_key(static_key_v4(Direction::Ingress, l4_proto, dst_port, dst_addr.v4_octets()));
    let entry = match unsafe { NAT_STATIC_V4.get(&query) } {
        Some(e) => *e,
        None => return Ok(TC_ACT_OK),
    };

    let new_port = if entry.mapped_port != 0 { entry.mapped_port } else { dst_port };
    if entry.mapped_addr == InetAddr::UNSPEC {
        if new_port == dst_port {
            return Ok(TC_ACT_OK);
        }
        if touch_l4 {
            rewrite_l4_port_only(l4_proto, l4_off, data, data_end, dst_port, new_port, false)?;
        }
        return Ok(TC_ACT_OK);
    }

    if touch_l4 {
        rewrite_ipv4_and_l4(ip, l4_proto, l4_off, data, data_end, dst_addr, dst_port, entry.mapped_addr, new_port, false)?;
    } else {
        rewrite_ipv4_addr_only(ip, dst_addr, entry.mapped_addr, false);
    }
    Ok(TC_ACT_OK)
}

fn classify_conntrack_bump(existing: Option<ConntrackValue>, direction: Direction, pkt_class: PktClass) -> (u8, u64) {
    match pkt_class {
        PktClass::TcpSyn | PktClass::TcpRst => (ConntrackState::Init as u8, CONNTRACK_TIMEOUT_TCP_SYN_SECS),
        PktClass::TcpFin => (ConntrackState::TcpFin as u8, CONNTRACK_TIMEOUT_TCP_TRANS_SECS),
        _ => {
            let prev_state = existing.map(|v| v.state).unwrap_or(ConntrackState::Init as u8);
            let prev_direction = existing.map(|v| v.direction).unwrap_or(direction as u8);
            let handshaking = prev_state == ConntrackState::Init as u8 || prev_state == ConntrackState::TcpSyn as u8;
            if handshaking && prev_direction != direction as u8 {
                (ConntrackState::TcpEst as u8, CONNTRACK_TIMEOUT_TCP_TRANS_SECS)
            } else {
                let held = if prev_state == ConntrackState::Init as u8 { ConntrackState::TcpEst as u8 } else { prev_state };
                (held, CONNTRACK_TIMEOUT_TCP_SECS)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn bump_conntrack(
    l4_proto: L4Proto,
    wan_addr: InetAddr,
    wan_port: u16,
    remote_addr: InetAddr,
    remote_port: u16,
    direction: Direction,
    tcp_flags: flowgate_ebpf_common::TcpFlags,
    payload_len: usize,
    now: u64,
) {
    let tuple = Tuple { src_addr: wan_addr, dst_addr: remote_addr, src_port: wan_port, dst_port: remote_port };
    let key = ConntrackKey::new(l4_proto as u8, tuple);
    let existing = unsafe { NAT_CONNTRACK.get(&key) }.copied();

    let (state, timeout) = match l4_proto {
        L4Proto::Tcp => {
            let pkt_class = classify_tcp(tcp_flags, payload_len);
            classify_conntrack_bump(existing, direction, pkt_class)
        }
        _ => (ConntrackState::OtherEst as u8, CONNTRACK_TIMEOUT_UDP_SECS),
    };

    let create_time = existing.map(|v| v.create_time).unwrap_or(now);
    let value = ConntrackValue::new(state, direction as u8, InetAddr::UNSPEC, 0, create_time, now + timeout);
    let _ = NAT_CONNTRACK.insert(&key, &value, 0);
}

/// Returns `(source, destination)` ports for the L4 header at `l4_off`, in
/// the header's own byte order (never converted to host order — every
/// consumer treats it as an opaque key and re-applies `.to_be()` before
/// writing a new value back to the wire).
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

fn tcp_meta(
    data: usize,
    data_end: usize,
    l4_off: usize,
) -> Result<(flowgate_ebpf_common::TcpFlags, usize), ()> {
    let tcp = unsafe { ptr_at::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
    let flags = unsafe { (*tcp).flags() };
    let doff = unsafe { (*tcp).doff() } as usize * 4;
    let payload_len = data_end.saturating_sub(l4_off + doff);
    Ok((flags, payload_len))
}

#[allow(clippy::too_many_arguments)]
fn rewrite_ipv4_and_l4(
    ip: *mut Ipv4Hdr,
    l4_proto: L4Proto,
    l4_off: usize,
    data: usize,
    data_end: usize,
    old_addr: InetAddr,
    old_port: u16,
    new_addr: InetAddr,
    new_port: u16,
    rewrite_src: bool,
) -> Result<(), ()> {
    rewrite_ipv4_addr_only(ip, old_addr, new_addr, rewrite_src);

    match l4_proto {
        L4Proto::Tcp => {
            let tcp = unsafe { ptr_at_mut::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
            let old_word = u32::from_be_bytes(old_addr.v4_octets());
            let new_word = u32::from_be_bytes(new_addr.v4_octets());
            unsafe {
                let mut check = (*tcp).check;
                check = update_u32(check, old_word, new_word);
                check = update_u16(check, old_port.to_be(), new_port.to_be());
                (*tcp).check = check;
                if rewrite_src {
                    (*tcp).source = new_port.to_be();
                } else {
                    (*tcp).dest = new_port.to_be();
                }
            }
        }
        L4Proto::Udp => {
            let udp = unsafe { ptr_at_mut::<UdpHdr>(data, data_end, l4_off).ok_or(())? };
            let old_word = u32::from_be_bytes(old_addr.v4_octets());
            let new_word = u32::from_be_bytes(new_addr.v4_octets());
            unsafe {
                if (*udp).check != 0 {
                    let mut check = (*udp).check;
                    check = update_u32(check, old_word, new_word);
                    check = update_u16(check, old_port.to_be(), new_port.to_be());
                    (*udp).check = check;
                }
                if rewrite_src {
                    (*udp).source = new_port.to_be();
                } else {
                    (*udp).dest = new_port.to_be();
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// IP header address + checksum rewrite only, for fragments past the
/// first: there's no L4 header in this packet to touch.
fn rewrite_ipv4_addr_only(ip: *mut Ipv4Hdr, old_addr: InetAddr, new_addr: InetAddr, rewrite_src: bool) {
    let old_word = u32::from_be_bytes(old_addr.v4_octets());
    let new_word = u32::from_be_bytes(new_addr.v4_octets());
    unsafe {
        let check = (*ip).check;
        (*ip).check = update_u32(check, old_word, new_word);
        if rewrite_src {
            (*ip).saddr = new_word.to_be();
        } else {
            (*ip).daddr = new_word.to_be();
        }
    }
}

/// Static-mapping DMZ port remap: only the L4 port changes, the address
/// stays put.
fn rewrite_l4_port_only(
    l4_proto: L4Proto,
    l4_off: usize,
    data: usize,
    data_end: usize,
    old_port: u16,
    new_port: u16,
    rewrite_src: bool,
) -> Result<(), ()> {
    match l4_proto {
        L4Proto::Tcp => {
            let tcp = unsafe { ptr_at_mut::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
            unsafe {
                let check = update_u16((*tcp).check, old_port.to_be(), new_port.to_be());
                (*tcp).check = check;
                if rewrite_src {
                    (*tcp).source = new_port.to_be();
                } else {
                    (*tcp).dest = new_port.to_be();
                }
            }
        }
        L4Proto::Udp => {
            let udp = unsafe { ptr_at_mut::<UdpHdr>(data, data_end, l4_off).ok_or(())? };
            unsafe {
                if (*udp).check != 0 {
                    (*udp).check = update_u16((*udp).check, old_port.to_be(), new_port.to_be());
                }
                if rewrite_src {
                    (*udp).source = new_port.to_be();
                } else {
                    (*udp).dest = new_port.to_be();
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn nat_icmp(
    ctx: &TcContext,
    data: usize,
    data_end: usize,
    ip: *mut Ipv4Hdr,
    icmp_off: usize,
    direction: Direction,
) -> Result<i32, ()> {
    let icmp = unsafe { ptr_at_mut::<IcmpHdr>(data, data_end, icmp_off).ok_or(())? };
    match classify_icmpv4(unsafe { (*icmp).icmp_type }) {
        IcmpClass::Query => nat_icmp_echo(ctx, ip, icmp, direction),
        IcmpClass::Error => nat_icmp_error(data, data_end, ip, icmp_off, direction),
        IcmpClass::Unspec => Ok(TC_ACT_OK),
    }
}

/// Treats the echo identifier as a NAT "port" and reuses the ordinary
/// mapping machinery: endpoint-independent allocation on egress,
/// restricted-cone filtering on ingress minus the port comparison (the id
/// already did that job).
fn nat_icmp_echo(ctx: &TcContext, ip: *mut Ipv4Hdr, icmp: *mut IcmpHdr, direction: Direction) -> Result<i32, ()> {
    let id = unsafe { (*icmp).id };
    match direction {
        Direction::Egress => {
            let ifindex = ctx.skb.ifindex();
            let src_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
            let dst_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
            let egress_key = NatMappingKey::new(Direction::Egress as u8, L4Proto::Icmp as u8, id, src_addr);
            let now = now_secs();

            let mapping = match unsafe { NAT_MAPPING.get(&egress_key) } {
                Some(existing) => {
                    let refreshed = NatMappingValue::new(
                        existing.mapped_addr,
                        existing.mapped_port,
                        existing.trigger_addr,
                        existing.trigger_port,
                        existing.is_static != 0,
                        existing.is_allow_reuse != 0,
                        now,
                    );
                    let _ = NAT_MAPPING.insert(&egress_key, &refreshed, 0);
                    refreshed
                }
                None => allocate_mapping(ifindex, L4Proto::Icmp, src_addr, id, dst_addr, 0, now)?,
            };

            rewrite_icmp_id(ip, icmp, src_addr, mapping.mapped_addr, id, mapping.mapped_port, true);
            bump_conntrack(
                L4Proto::Icmp,
                mapping.mapped_addr,
                mapping.mapped_port,
                dst_addr,
                0,
                Direction::Egress,
                Default::default(),
                0,
                now,
            );
            Ok(TC_ACT_OK)
        }
        Direction::Ingress => {
            let dst_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
            let ingress_key = NatMappingKey::new(Direction::Ingress as u8, L4Proto::Icmp as u8, id, dst_addr);
            let mapping = match unsafe { NAT_MAPPING.get(&ingress_key) } {
                Some(m) => *m,
                None => return Ok(TC_ACT_OK),
            };
            if mapping.is_allow_reuse == 0 {
                let src_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
                if src_addr != mapping.trigger_addr {
                    return Ok(TC_ACT_SHOT);
                }
            }
            rewrite_icmp_id(ip, icmp, dst_addr, mapping.mapped_addr, id, mapping.mapped_port, false);
            Ok(TC_ACT_OK)
        }
    }
}

fn rewrite_icmp_id(
    ip: *mut Ipv4Hdr,
    icmp: *mut IcmpHdr,
    old_addr: InetAddr,
    new_addr: InetAddr,
    old_id: u16,
    new_id: u16,
    rewrite_src: bool,
) {
    rewrite_ipv4_addr_only(ip, old_addr, new_addr, rewrite_src);
    unsafe {
        let check = update_u16((*icmp).checksum, old_id.to_be(), new_id.to_be());
        (*icmp).checksum = check;
        (*icmp).id = new_id.to_be();
    }
}

/// An ICMP error carries the original packet that triggered it embedded
/// in its body. The envelope stays addressed the way the router that
/// raised it sent it; what needs translating is the embedded copy of the
/// flow this NAT already rewrote, plus the envelope's destination so the
/// notice actually reaches the real endpoint. Each byte changed inside
/// the ICMP body (inner IP checksum, inner L4 checksum, inner
/// address/port) folds its own before/after delta into the outer ICMP
/// checksum.
fn nat_icmp_error(
    data: usize,
    data_end: usize,
    ip: *mut Ipv4Hdr,
    icmp_off: usize,
    direction: Direction,
) -> Result<i32, ()> {
    let inner = match scan::parse_icmpv4_error_inner(data, data_end, icmp_off) {
        Ok(inner) => inner,
        Err(ScanError::Truncated) => return Err(()),
        Err(ScanError::Unsupported) => return Ok(TC_ACT_OK),
    };
    let inner_l4 = match inner.l4_proto {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(TC_ACT_OK),
    };

    // Ingress: the error is addressed to our WAN side, and it's the
    // embedded *source* that needs to become the real LAN client.
    // Egress: the error is leaving toward WAN, and it's the embedded
    // *destination* that needs to become our WAN side again.
    let (lookup_key, rewrite_src, old_addr, old_port) = match direction {
        Direction::Ingress => (
            NatMappingKey::new(Direction::Ingress as u8, inner_l4 as u8, inner.src_port, inner.src_addr),
            true,
            inner.src_addr,
            inner.src_port,
        ),
        Direction::Egress => (
            NatMappingKey::new(Direction::Egress as u8, inner_l4 as u8, inner.dst_port, inner.dst_addr),
            false,
            inner.dst_addr,
            inner.dst_port,
        ),
    };
    let mapping = match unsafe { NAT_MAPPING.get(&lookup_key) } {
        Some(m) => *m,
        None => return Ok(TC_ACT_OK),
    };

    rewrite_icmp_error_inner(
        data,
        data_end,
        icmp_off,
        inner_l4,
        old_addr,
        old_port,
        mapping.mapped_addr,
        mapping.mapped_port,
        rewrite_src,
    )?;

    if direction == Direction::Ingress {
        let outer_dst = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
        if outer_dst == old_addr {
            rewrite_ipv4_addr_only(ip, outer_dst, mapping.mapped_addr, false);
        }
    }

    Ok(TC_ACT_OK)
}

#[allow(clippy::too_many_arguments)]
fn rewrite_icmp_error_inner(
    data: usize,
    data_end: usize,
    icmp_off: usize,
    inner_l4: L4Proto,
    old_addr: InetAddr,
    old_port: u16,
    new_addr: InetAddr,
    new_port: u16,
    rewrite_src: bool,
) -> Result<(), ()> {
    let old_word = u32::from_be_bytes(old_addr.v4_octets());
    let new_word = u32::from_be_bytes(new_addr.v4_octets());
    let inner_ip_off = icmp_off + core::mem::size_of::<IcmpHdr>();

    let icmp = unsafe { ptr_at_mut::<IcmpHdr>(data, data_end, icmp_off).ok_or(())? };
    let inner_ip = unsafe { ptr_at_mut::<Ipv4Hdr>(data, data_end, inner_ip_off).ok_or(())? };
    let inner_ip_hdr_len = unsafe { (*inner_ip).ihl() as usize } * 4;
    let inner_l4_off = inner_ip_off + inner_ip_hdr_len;

    unsafe {
        let mut icmp_check = (*icmp).checksum;

        // (i) inner IP header checksum.
        let old_inner_ip_check = (*inner_ip).check;
        let new_inner_ip_check = update_u32(old_inner_ip_check, old_word, new_word);
        icmp_check = update_u16(icmp_check, old_inner_ip_check, new_inner_ip_check);
        (*inner_ip).check = new_inner_ip_check;

        // (ii) inner L4 checksum.
        match inner_l4 {
            L4Proto::Tcp => {
                let tcp = ptr_at_mut::<TcpHdr>(data, data_end, inner_l4_off).ok_or(())?;
                let old_l4_check = (*tcp).check;
                let mut new_l4_check = update_u32(old_l4_check, old_word, new_word);
                new_l4_check = update_u16(new_l4_check, old_port.to_be(), new_port.to_be());
                icmp_check = update_u16(icmp_check, old_l4_check, new_l4_check);
                (*tcp).check = new_l4_check;
                if rewrite_src {
                    (*tcp).source = new_port.to_be();
                } else {
                    (*tcp).dest = new_port.to_be();
                }
            }
            L4Proto::Udp => {
                let udp = ptr_at_mut::<UdpHdr>(data, data_end, inner_l4_off).ok_or(())?;
                if (*udp).check != 0 {
                    let old_l4_check = (*udp).check;
                    let mut new_l4_check = update_u32(old_l4_check, old_word, new_word);
                    new_l4_check = update_u16(new_l4_check, old_port.to_be(), new_port.to_be());
                    icmp_check = update_u16(icmp_check, old_l4_check, new_l4_check);
                    (*udp).check = new_l4_check;
                }
                if rewrite_src {
                    (*udp).source = new_port.to_be();
                } else {
                    (*udp).dest = new_port.to_be();
                }
            }
            _ => {}
        }

        // (iii) the address/port bytes themselves, as seen in the ICMP body.
        icmp_check = update_u32(icmp_check, old_word, new_word);
        icmp_check = update_u16(icmp_check, old_port.to_be(), new_port.to_be());
        (*icmp).checksum = icmp_check;
        if rewrite_src {
            (*inner_ip).saddr = new_word.to_be();
        } else {
            (*inner_ip).daddr = new_word.to_be();
        }
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
