//! TC classifier: Route Engine, LAN ingress path.
//!
//! Order of consultation: route-cache(WAN) short-circuit, then lan-route
//! LPM for directly-connected LAN destinations, then Flow Verdict's
//! redirect target via flow-target. A container-netns target pushes the
//! landscape VLAN tag instead of a plain link-layer rewrite.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::bindings::TC_ACT_SHOT;
use aya_ebpf::helpers::{bpf_redirect, bpf_redirect_neigh};
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::maps::{FlowTargetKey, LanRouteValue, NeighbourKey, RouteCacheKey, RouteCacheValue};
use flowgate_ebpf_common::{InetAddr, L3Proto, Mark, SourceClass, VlanTag};
use flowgate_ebpf_programs::maps::{FLOW_TARGET, LAN_ROUTE_V4, NEIGHBOUR_CACHE_V4, ROUTE_CACHE_LAN, ROUTE_CACHE_WAN};
use flowgate_ebpf_programs::{exact_lpm_key, ptr_at, EthHdr, Ipv4Hdr, ETH_P_8021Q, ETH_P_IP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_route_lan(ctx: TcContext) -> i32 {
    match try_route(&ctx) {
        Ok(verdict) => verdict,
        Err(()) => TC_ACT_OK,
    }
}

fn try_route(ctx: &TcContext) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IP {
        return Ok(TC_ACT_OK);
    }

    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let src = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let dst = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());

    // route-cache(WAN) short-circuit: a prior WAN-ingress hook may have
    // already decided the reverse-direction interface for this pair.
    let cache_key = RouteCacheKey::new(dst, src);
    if let Some(cached) = unsafe { ROUTE_CACHE_WAN.get(&cache_key) } {
        return redirect_to(cached.ifindex_or_mark, dst);
    }

    // lan-route LPM: is the destination a directly-connected LAN host?
    let lpm_key = exact_lpm_key(dst.v4_octets());
    if let Some(route) = unsafe { LAN_ROUTE_V4.get(&lpm_key) } {
        return redirect_to(route.ifindex, dst);
    }

    // Fall through to the flow target chosen by Flow Verdict.
    let mark = Mark::new(ctx.skb.mark());
    let target_key = FlowTargetKey::new(mark.flow_id(), L3Proto::V4 as u8);
    let target = match unsafe { FLOW_TARGET.get(&target_key) } {
        Some(t) => t,
        None => return Ok(TC_ACT_OK),
    };

    if mark.allow_reuse_port() {
        let cache_key = RouteCacheKey::new(dst, src);
        let value = RouteCacheValue { ifindex_or_mark: target.ifindex };
        let _ = ROUTE_CACHE_LAN.insert(&cache_key, &value, 0);
    }

    if target.is_container_netns != 0 {
        let tag = VlanTag::for_flow(mark.flow_id());
        let _ = ctx.skb.set_mark(mark.with_source_class(SourceClass::Lan).bits());
        return push_vlan_and_redirect(ctx, tag, target.ifindex);
    }

    redirect_to(target.ifindex, dst)
}

fn redirect_to(ifindex: u32, dst: InetAddr) -> Result<i32, ()> {
    let has_mac = unsafe { NEIGHBOUR_CACHE_V4.get(&NeighbourKey::new(dst)) }.is_some();
    let ret = if has_mac {
        unsafe { bpf_redirect(ifindex, 0) }
    } else {
        unsafe { bpf_redirect_neigh(ifindex, core::ptr::null_mut(), 0, 0) }
    };
    if ret as i64 >= 0 {
        Ok(ret as i32)
    } else {
        Ok(TC_ACT_SHOT)
    }
}

fn push_vlan_and_redirect(ctx: &TcContext, tag: VlanTag, ifindex: u32) -> Result<i32, ()> {
    // Grows the packet by 4 bytes and fixes up the ether-type; this is how
    // the landscape redirect tag reaches the container-netns proxy socket.
    let ret = unsafe {
        aya_ebpf::helpers::bpf_skb_vlan_push(ctx.skb.skb as *mut _, ETH_P_8021Q, tag.raw())
    };
    if ret != 0 {
        return Ok(TC_ACT_SHOT);
    }
    redirect_to(ifindex, InetAddr::UNSPEC)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
