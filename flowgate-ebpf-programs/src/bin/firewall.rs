//! TC classifier: stateless block-list firewall with dynamic pinholes.
//!
//! Attached separately at ingress and egress on LAN/WAN interfaces, since
//! a single classifier body can't otherwise tell which side of the
//! interface it's looking at. Each consults the direction-appropriate
//! block-list LPM keyed on the remote address — the packet's source on
//! ingress, its destination on egress — and drops a match unless a live
//! pinhole exists for the local port the packet is addressed to, in which
//! case the pinhole's timer is refreshed and the packet passes.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::bindings::TC_ACT_SHOT;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::limits::{CONNTRACK_TIMEOUT_TCP_SECS, CONNTRACK_TIMEOUT_UDP_SECS};
use flowgate_ebpf_common::maps::{FirewallBlockValue, PinholeKey, PinholeValue};
use flowgate_ebpf_common::{Direction, InetAddr, L3Proto, L4Proto};
use flowgate_ebpf_programs::maps::{FIREWALL_BLOCK_V4, FIREWALL_BLOCK_V6, FIREWALL_PINHOLE};
use flowgate_ebpf_programs::scan::{self, ScanError};
use flowgate_ebpf_programs::{
    exact_lpm_key, ptr_at, EthHdr, Ipv4Hdr, Ipv6Hdr, TcpHdr, UdpHdr, ETH_P_IP, ETH_P_IPV6, IPPROTO_TCP,
    IPPROTO_UDP,
};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_firewall_ingress(ctx: TcContext) -> i32 {
    match try_firewall(&ctx, Direction::Ingress) {
        Ok(verdict) => verdict,
        Err(()) => TC_ACT_OK,
    }
}

#[classifier]
pub fn flowgate_firewall_egress(ctx: TcContext) -> i32 {
    match try_firewall(&ctx, Direction::Egress) {
        Ok(verdict) => verdict,
        Err(()) => TC_ACT_OK,
    }
}

fn try_firewall(ctx: &TcContext, direction: Direction) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    match unsafe { (*eth).h_proto } {
        ETH_P_IP => try_firewall_v4(data, data_end, direction),
        ETH_P_IPV6 => try_firewall_v6(data, data_end, direction),
        _ => Ok(TC_ACT_OK),
    }
}

fn try_firewall_v4(data: usize, data_end: usize, direction: Direction) -> Result<i32, ()> {
    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let scanned = match scan::scan_ipv4(data, data_end, ETH_HDR_LEN) {
        Ok(s) => s,
        Err(_) => return Err(()),
    };

    let saddr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let daddr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
    let (remote, local_addr) = match direction {
        Direction::Ingress => (saddr, daddr),
        Direction::Egress => (daddr, saddr),
    };

    let lookup_key = exact_lpm_key(remote.v4_octets());
    let blocked = unsafe {
        FIREWALL_BLOCK_V4.get(&lookup_key).map(|v: &FirewallBlockValue| v.action != 0).unwrap_or(false)
    };
    if !blocked {
        return Ok(TC_ACT_OK);
    }

    let (l4_proto, local_port) = match local_port(data, data_end, scanned.l4_proto, scanned.l4_off, direction)? {
        Some(v) => v,
        None => return Ok(TC_ACT_SHOT),
    };

    pinhole_verdict(L3Proto::V4, l4_proto, local_port, local_addr)
}

fn try_firewall_v6(data: usize, data_end: usize, direction: Direction) -> Result<i32, ()> {
    let ip = unsafe { ptr_at::<Ipv6Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let scanned = match scan::scan_ipv6(data, data_end, ETH_HDR_LEN) {
        Ok(s) => s,
        Err(ScanError::Truncated) => return Err(()),
        Err(ScanError::Unsupported) => return Ok(TC_ACT_OK),
    };

    let saddr = InetAddr::from_v6(unsafe { (*ip).saddr });
    let daddr = InetAddr::from_v6(unsafe { (*ip).daddr });
    let (remote, local_addr) = match direction {
        Direction::Ingress => (saddr, daddr),
        Direction::Egress => (daddr, saddr),
    };

    let lookup_key = exact_lpm_key(remote.v6_octets());
    let blocked = unsafe {
        FIREWALL_BLOCK_V6.get(&lookup_key).map(|v: &FirewallBlockValue| v.action != 0).unwrap_or(false)
    };
    if !blocked {
        return Ok(TC_ACT_OK);
    }

    let (l4_proto, local_port) = match local_port(data, data_end, scanned.l4_proto, scanned.l4_off, direction)? {
        Some(v) => v,
        None => return Ok(TC_ACT_SHOT),
    };

    pinhole_verdict(L3Proto::V6, l4_proto, local_port, local_addr)
}

/// The port on the local side of this packet — destination on ingress
/// (traffic arriving for us), source on egress (traffic we're sending
/// out). `None` for anything but TCP/UDP: there's no pinhole concept for
/// it, so a blocked non-TCP/UDP packet is just dropped outright.
fn local_port(
    data: usize,
    data_end: usize,
    protocol: u8,
    l4_off: usize,
    direction: Direction,
) -> Result<Option<(L4Proto, u16)>, ()> {
    let l4_proto = match protocol {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(None),
    };
    let port = match l4_proto {
        L4Proto::Tcp => {
            let tcp = unsafe { ptr_at::<TcpHdr>(data, data_end, l4_off).ok_or(())? };
            match direction {
                Direction::Ingress => unsafe { (*tcp).dest },
                Direction::Egress => unsafe { (*tcp).source },
            }
        }
        _ => {
            let udp = unsafe { ptr_at::<UdpHdr>(data, data_end, l4_off).ok_or(())? };
            match direction {
                Direction::Ingress => unsafe { (*udp).dest },
                Direction::Egress => unsafe { (*udp).source },
            }
        }
    };
    Ok(Some((l4_proto, port)))
}

fn pinhole_verdict(l3_proto: L3Proto, l4_proto: L4Proto, local_port: u16, local_addr: InetAddr) -> Result<i32, ()> {
    let key = PinholeKey::new(l3_proto as u8, l4_proto as u8, local_port, local_addr);
    let existing = unsafe { FIREWALL_PINHOLE.get(&key) };
    let has_pinhole = existing.map(|v: &PinholeValue| v.status != 0).unwrap_or(false);

    if has_pinhole {
        let existing = existing.ok_or(())?;
        let timeout =
            if l4_proto == L4Proto::Tcp { CONNTRACK_TIMEOUT_TCP_SECS } else { CONNTRACK_TIMEOUT_UDP_SECS };
        let now = unsafe { aya_ebpf::helpers::bpf_ktime_get_ns() } / 1_000_000_000;
        let refreshed =
            PinholeValue::new(existing.status, existing.trigger_addr, existing.trigger_port, now + timeout);
        let _ = FIREWALL_PINHOLE.insert(&key, &refreshed, 0);
        return Ok(TC_ACT_OK);
    }

    Ok(TC_ACT_SHOT)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
