//! TC classifier: Flow Classifier.
//!
//! Looks up `{source identity, l3_proto, l4_proto, vlan_id, qos_class}` in
//! `flow-match`; on a hit, writes the matched flow id into the mark's
//! flow-id field. On miss the mark's flow id is left at its current value
//! (0, the default flow, unless an earlier hook already set it).
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::maps::FlowMatchKey;
use flowgate_ebpf_common::{InetAddr, L3Proto, L4Proto, Mark};
use flowgate_ebpf_programs::maps::FLOW_MATCH;
use flowgate_ebpf_programs::{ptr_at, EthHdr, Ipv4Hdr, ETH_P_IP, IPPROTO_TCP, IPPROTO_UDP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();

#[classifier]
pub fn flowgate_flow_classify(ctx: TcContext) -> i32 {
    let _ = try_classify(&ctx);
    TC_ACT_OK
}

fn try_classify(ctx: &TcContext) -> Result<(), ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    let src_mac = unsafe { (*eth).h_source };
    let eth_proto = unsafe { (*eth).h_proto };

    if eth_proto != ETH_P_IP {
        return Ok(());
    }

    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let protocol = unsafe { (*ip).protocol };
    let l4_proto = match protocol {
        IPPROTO_TCP => L4Proto::Tcp,
        IPPROTO_UDP => L4Proto::Udp,
        _ => return Ok(()),
    };

    let src_addr = InetAddr::from_v4(unsafe { (*ip).saddr }.to_ne_bytes());
    let vlan_id = ctx.skb.vlan_tci() as u16 & 0x0FFF;
    let qos_class = unsafe { (*ip).tos } >> 2;

    let key = FlowMatchKey::new(src_addr, src_mac, L3Proto::V4 as u8, l4_proto as u8, vlan_id, qos_class);

    let flow_id = unsafe { FLOW_MATCH.get(&key) };
    if let Some(flow_id) = flow_id {
        let mark = Mark::new(ctx.skb.mark()).with_flow_id(flow_id.0);
        ctx.skb.set_mark(mark.bits());
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
