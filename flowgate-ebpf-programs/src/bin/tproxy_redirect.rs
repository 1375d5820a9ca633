//! TC classifier: transparent-proxy VLAN redirect, attached on veth
//! interfaces inside a container network namespace.
//!
//! Packets forwarded here carry the landscape VLAN tag pushed by the Route
//! Engine. In transparent-proxy mode the tag's flow id selects a listening
//! socket at `12000 + flow_id` and the packet is reassigned to it directly
//! with `bpf_sk_assign`; in route mode the tag is stripped and the packet
//! is left to the namespace's own routing stack.
#![no_std]
#![no_main]

use aya_ebpf::bindings::{bpf_sock_tuple, TC_ACT_OK, TC_ACT_SHOT};
use aya_ebpf::helpers::{bpf_sk_assign, bpf_sk_lookup_tcp, bpf_sk_lookup_udp, bpf_sk_release};
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::{InetAddr, VlanTag};
use flowgate_ebpf_programs::{ptr_at, EthHdr, Ipv4Hdr, IPPROTO_TCP, IPPROTO_UDP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

/// Redirect mode for this interface; patched at load time per the
/// proxy/DNS dispatch configuration for the owning container.
#[no_mangle]
static TPROXY_MODE_TRANSPARENT: u8 = 1;

#[classifier]
pub fn flowgate_tproxy_redirect(ctx: TcContext) -> i32 {
    match try_redirect(&ctx) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

fn try_redirect(ctx: &TcContext) -> Result<i32, ()> {
    let vlan_id = ctx.skb.vlan_tci() as u16 & 0x0FFF;
    if !VlanTag::is_land_tag(vlan_id) {
        return Ok(TC_ACT_OK);
    }
    let tag = VlanTag(vlan_id);

    let data = ctx.data();
    let data_end = ctx.data_end();
    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let protocol = unsafe { (*ip).protocol };
    let _ = eth;

    let transparent = unsafe { core::ptr::read_volatile(&TPROXY_MODE_TRANSPARENT) } != 0;
    if !transparent {
        return strip_vlan(ctx);
    }

    let local_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
    let remote_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let local_port = tag.proxy_port();

    let mut tuple = unsafe { core::mem::zeroed::<bpf_sock_tuple>() };
    unsafe {
        tuple.ipv4.saddr = u32::from_be_bytes(remote_addr.v4_octets());
        tuple.ipv4.daddr = u32::from_be_bytes(local_addr.v4_octets());
        tuple.ipv4.dport = local_port.to_be();
    }
    // IPv4 view of `bpf_sock_tuple`: saddr, daddr, sport, dport (12 bytes).
    const TUPLE_LEN_V4: u32 = 12;

    let sk = unsafe {
        if protocol == IPPROTO_TCP {
            bpf_sk_lookup_tcp(ctx.skb.skb as *mut _, &mut tuple, TUPLE_LEN_V4 as i32, u64::MAX, 0)
        } else if protocol == IPPROTO_UDP {
            bpf_sk_lookup_udp(ctx.skb.skb as *mut _, &mut tuple, TUPLE_LEN_V4 as i32, u64::MAX, 0)
        } else {
            core::ptr::null_mut()
        }
    };

    if sk.is_null() {
        return strip_vlan(ctx);
    }

    let assigned = unsafe { bpf_sk_assign(ctx.skb.skb as *mut _, sk as *mut _, 0) };
    unsafe { bpf_sk_release(sk as *mut _) };
    if assigned != 0 {
        return Ok(TC_ACT_SHOT);
    }

    strip_vlan(ctx)
}

fn strip_vlan(ctx: &TcContext) -> Result<i32, ()> {
    let ret = unsafe { aya_ebpf::helpers::bpf_skb_vlan_pop(ctx.skb.skb as *mut _) };
    if ret != 0 {
        return Ok(TC_ACT_SHOT);
    }
    Ok(TC_ACT_OK)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
