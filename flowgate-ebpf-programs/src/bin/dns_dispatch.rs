//! `sk_reuseport` program: DNS request dispatcher.
//!
//! Computes a flow id from the UDP datagram's source address the same way
//! the Flow Classifier keys `flow-match`, then steers the datagram to the
//! listening socket registered for that flow in `reuseport-socket-map` via
//! `bpf_sk_select_reuseport`. Falls through to the kernel's default
//! reuseport selection when no flow-specific listener is registered.
#![no_std]
#![no_main]

use aya_ebpf::bindings::sk_action::SK_PASS;
use aya_ebpf::helpers::bpf_sk_select_reuseport;
use aya_ebpf::macros::{map, sk_reuseport};
use aya_ebpf::maps::SockMap;
use aya_ebpf::programs::SkReuseportContext;
use flowgate_ebpf_common::maps::FlowMatchKey;
use flowgate_ebpf_common::{InetAddr, L3Proto, L4Proto};
use flowgate_ebpf_programs::maps::FLOW_MATCH;

/// {flow_id} -> listening socket, populated by the control plane as it
/// starts each flow's DNS listener.
#[map(name = "reuseport_socket_map", pinning = "by_name")]
pub static REUSEPORT_SOCKET_MAP: SockMap = SockMap::with_max_entries(256, 0);

#[sk_reuseport]
pub fn flowgate_dns_dispatch(ctx: SkReuseportContext) -> u32 {
    match try_dispatch(&ctx) {
        Ok(v) => v,
        Err(()) => SK_PASS as u32,
    }
}

fn try_dispatch(ctx: &SkReuseportContext) -> Result<u32, ()> {
    let md = ctx.as_ptr() as *const aya_ebpf::bindings::sk_reuseport_md;
    let remote_ip4 = unsafe { (*md).remote_ip4 };
    let ip_protocol = unsafe { (*md).ip_protocol };

    if ip_protocol != flowgate_ebpf_programs::IPPROTO_UDP as u32 {
        return Ok(SK_PASS as u32);
    }

    let src_addr = InetAddr::from_v4(remote_ip4.to_ne_bytes());
    let key = FlowMatchKey::new(src_addr, [0; 6], L3Proto::V4 as u8, L4Proto::Udp as u8, 0, 0);
    let flow_id = unsafe { FLOW_MATCH.get(&key) }.ok_or(())?;

    let map_key = flow_id.0 as u32;
    let ret = unsafe {
        bpf_sk_select_reuseport(
            ctx.as_ptr() as *mut _,
            REUSEPORT_SOCKET_MAP.as_ptr() as *mut _,
            &map_key as *const u32 as *mut _,
            0,
        )
    };
    if ret != 0 {
        return Ok(SK_PASS as u32);
    }

    Ok(SK_PASS as u32)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
