//! TC classifier: Flow Verdict.
//!
//! Combines `per-flow-ip` (LPM on destination address) and `per-flow-dns`
//! (exact hash on destination address) for the packet's current flow id.
//! Lower priority number wins; the IP LPM is consulted first and the DNS
//! entry overrides only if its priority is strictly lower.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::bindings::TC_ACT_SHOT;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::mark::FlowAction;
use flowgate_ebpf_common::maps::{DnsMatchKey, FlowDnsKey, FlowId, MarkAction};
use flowgate_ebpf_common::{InetAddr, L3Proto, Mark};
use flowgate_ebpf_programs::maps::{PER_FLOW_DNS, PER_FLOW_IP_V4};
use flowgate_ebpf_programs::{ptr_at, EthHdr, Ipv4Hdr, ETH_P_IP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_flow_verdict(ctx: TcContext) -> i32 {
    match try_verdict(&ctx) {
        Ok(verdict) => verdict,
        Err(()) => TC_ACT_OK,
    }
}

fn try_verdict(ctx: &TcContext) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IP {
        return Ok(TC_ACT_OK);
    }

    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let dst_addr = InetAddr::from_v4(unsafe { (*ip).daddr }.to_ne_bytes());

    let mut mark = Mark::new(ctx.skb.mark());
    let flow_id = mark.flow_id();

    // Flattened LPM key: flow_id byte followed by the /32 destination
    // address, see the crate-level note in `maps.rs`.
    let mut lpm_bytes = [0u8; 5];
    lpm_bytes[0] = flow_id;
    lpm_bytes[1..].copy_from_slice(&dst_addr.v4_octets());
    let lpm_key = aya_ebpf::maps::lpm_trie::Key::new(40, lpm_bytes);

    let ip_hit: Option<&MarkAction> = unsafe { PER_FLOW_IP_V4.get(&lpm_key) };

    let dns_key = FlowDnsKey::new(FlowId(flow_id), DnsMatchKey::new(dst_addr, L3Proto::V4 as u8));
    let dns_hit: Option<&MarkAction> = unsafe { PER_FLOW_DNS.get(&dns_key) };

    let winner = match (ip_hit, dns_hit) {
        (Some(ip), Some(dns)) if dns.priority < ip.priority => dns,
        (Some(ip), _) => ip,
        (None, Some(dns)) => dns,
        (None, None) => return Ok(TC_ACT_OK),
    };

    let action = Mark::new(winner.mark_action).action();
    match action {
        FlowAction::KeepGoing => {}
        FlowAction::Direct => mark = mark.with_flow_id(0),
        FlowAction::Drop => return Ok(TC_ACT_SHOT),
        FlowAction::Redirect => {
            let target_flow = Mark::new(winner.mark_action).flow_id();
            mark = mark.with_flow_id(target_flow).with_action(FlowAction::Redirect);
        }
        FlowAction::AllowReuse | FlowAction::Unknown(_) => {}
    }

    ctx.skb.set_mark(mark.bits());
    Ok(TC_ACT_OK)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
