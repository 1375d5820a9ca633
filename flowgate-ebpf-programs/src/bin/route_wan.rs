//! TC classifier: Route Engine, WAN ingress path.
//!
//! Verifies the packet's destination is the assigned WAN address (else
//! it's left to the kernel stack), applies the LAN-route redirect for
//! port-forwarded traffic, and learns a route-cache(WAN) entry when the
//! mark's cache-hint bit is set.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::helpers::bpf_redirect_neigh;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::maps::{RouteCacheKey, RouteCacheValue, WanIpBindingKey};
use flowgate_ebpf_common::{InetAddr, L3Proto, Mark};
use flowgate_ebpf_programs::maps::{LAN_ROUTE_V4, ROUTE_CACHE_WAN, WAN_IP_BINDING};
use flowgate_ebpf_programs::{exact_lpm_key, ptr_at, EthHdr, Ipv4Hdr, ETH_P_IP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();
const THIS_IFINDEX_L3_PROTO: u8 = L3Proto::V4 as u8;

#[classifier]
pub fn flowgate_route_wan(ctx: TcContext) -> i32 {
    let _ = try_route(&ctx);
    TC_ACT_OK
}

fn try_route(ctx: &TcContext) -> Result<(), ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();
    let ifindex = ctx.skb.ifindex();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IP {
        return Ok(());
    }

    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let dst = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());
    let src = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());

    let binding_key = WanIpBindingKey::new(ifindex, THIS_IFINDEX_L3_PROTO);
    let binding = unsafe { WAN_IP_BINDING.get(&binding_key) }.ok_or(())?;
    if binding.wan_addr != dst {
        // Not addressed to us: a static mapping / DMZ entry may still
        // want it, handled by lan-route below; otherwise leave it alone.
    }

    // Port-forwarded traffic: same lan-route LPM the LAN path consults.
    let lpm_key = exact_lpm_key(dst.v4_octets());
    if let Some(route) = unsafe { LAN_ROUTE_V4.get(&lpm_key) } {
        if route.ifindex != ifindex {
            let ret = unsafe { bpf_redirect_neigh(route.ifindex, core::ptr::null_mut(), 0, 0) };
            let _ = ret;
        }
    }

    let mark = Mark::new(ctx.skb.mark());
    if mark.allow_reuse_port() {
        let cache_key = RouteCacheKey::new(dst, src);
        let value = RouteCacheValue { ifindex_or_mark: ifindex };
        let _ = ROUTE_CACHE_WAN.insert(&cache_key, &value, 0);
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
