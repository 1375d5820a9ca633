//! PPPoE Adapter: TC egress encapsulation, XDP ingress decapsulation.
//!
//! Egress grows the packet by 8 bytes with the room-adjustment helper in
//! encapsulation mode and prepends a PPPoE session header; ingress strips
//! the header and restores the original ether-type. An egress packet that
//! would exceed the uplink MTU after encapsulation is dropped and a notice
//! is pushed to userspace instead of forwarding a packet the PPPoE peer
//! would reject.
#![no_std]
#![no_main]

use aya_ebpf::bindings::{bpf_adj_room_mode, TC_ACT_OK, TC_ACT_SHOT, XDP_DROP, XDP_PASS};
use aya_ebpf::helpers::bpf_skb_adjust_room;
use aya_ebpf::macros::{classifier, xdp};
use aya_ebpf::programs::{TcContext, XdpContext};
use flowgate_ebpf_programs::maps::ICMP_NOTICE;
use flowgate_ebpf_programs::ptr::ptr_at_mut;
use flowgate_ebpf_programs::{
    ptr_at, EthHdr, PppoeHdr, ETH_P_IP, ETH_P_IPV6, ETH_P_PPPOE_SESSION, PPP_PROTO_IPV4,
    PPP_PROTO_IPV6,
};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();
const PPPOE_HDR_LEN: usize = core::mem::size_of::<PppoeHdr>();

/// Uplink MTU after PPPoE encapsulation; packets that would exceed this
/// once the 8-byte header and 2-byte PPP protocol field are added get an
/// ICMP "too big" notice instead of being forwarded broken.
const UPLINK_MTU: usize = 1492;

/// Patched at load time by the control plane (`EbpfLoader::set_global`)
/// from the interface's configured PPPoE session.
#[no_mangle]
static PPPOE_SESSION_ID: u16 = 0;

#[repr(C)]
struct IcmpNoticeEvent {
    is_v6: u8,
    _pad: [u8; 7],
    original_len: u32,
    head: [u8; 40],
}

#[classifier]
pub fn flowgate_pppoe_egress(ctx: TcContext) -> i32 {
    match try_encap(&ctx) {
        Ok(v) => v,
        Err(()) => TC_ACT_OK,
    }
}

fn try_encap(ctx: &TcContext) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();
    let pkt_len = data_end - data;

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    let eth_proto = unsafe { (*eth).h_proto };
    let (ppp_proto, is_v6) = match eth_proto {
        ETH_P_IP => (PPP_PROTO_IPV4, false),
        ETH_P_IPV6 => (PPP_PROTO_IPV6, true),
        _ => return Ok(TC_ACT_OK),
    };

    if pkt_len + PPPOE_HDR_LEN > UPLINK_MTU + ETH_HDR_LEN {
        notice_oversize(ctx, data, data_end, is_v6, pkt_len as u32);
        return Ok(TC_ACT_SHOT);
    }

    let ret = unsafe {
        bpf_skb_adjust_room(
            ctx.skb.skb as *mut _,
            PPPOE_HDR_LEN as i32,
            bpf_adj_room_mode::BPF_ADJ_ROOM_MAC as u32,
            0,
        )
    };
    if ret != 0 {
        return Ok(TC_ACT_SHOT);
    }

    let data = ctx.data();
    let data_end = ctx.data_end();
    let eth = unsafe { ptr_at_mut::<EthHdr>(data, data_end, 0).ok_or(())? };
    unsafe { (*eth).h_proto = ETH_P_PPPOE_SESSION };

    let pppoe = unsafe { ptr_at_mut::<PppoeHdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let session_id = unsafe { core::ptr::read_volatile(&PPPOE_SESSION_ID) };
    unsafe {
        (*pppoe).version_type = 0x11;
        (*pppoe).code = 0x00;
        (*pppoe).session_id = session_id.to_be();
        (*pppoe).length = ((pkt_len - ETH_HDR_LEN) as u16 + 2).to_be();
        (*pppoe).ppp_proto = ppp_proto;
    }

    Ok(TC_ACT_OK)
}

fn notice_oversize(ctx: &TcContext, data: usize, data_end: usize, is_v6: bool, original_len: u32) {
    let mut event = IcmpNoticeEvent { is_v6: is_v6 as u8, _pad: [0; 7], original_len, head: [0; 40] };
    let copy_len = core::cmp::min(40, data_end.saturating_sub(data));
    for i in 0..copy_len {
        if let Some(p) = unsafe { ptr_at::<u8>(data, data_end, i) } {
            event.head[i] = unsafe { *p };
        }
    }
    let _ = ctx;
    if let Some(mut entry) = ICMP_NOTICE.reserve::<IcmpNoticeEvent>(0) {
        unsafe { core::ptr::write(entry.as_mut_ptr(), event) };
        entry.submit(0);
    }
}

#[xdp]
pub fn flowgate_pppoe_ingress(ctx: XdpContext) -> u32 {
    match try_decap(&ctx) {
        Ok(v) => v,
        Err(()) => XDP_PASS,
    }
}

fn try_decap(ctx: &XdpContext) -> Result<u32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_PPPOE_SESSION {
        return Ok(XDP_PASS);
    }

    let pppoe = unsafe { ptr_at::<PppoeHdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    let inner_proto = unsafe { (*pppoe).ppp_proto };
    let new_eth_proto = match inner_proto {
        PPP_PROTO_IPV4 => ETH_P_IP,
        PPP_PROTO_IPV6 => ETH_P_IPV6,
        _ => return Ok(XDP_DROP),
    };

    let ret = unsafe { aya_ebpf::helpers::bpf_xdp_adjust_head(ctx.ctx, PPPOE_HDR_LEN as i32) };
    if ret != 0 {
        return Ok(XDP_DROP);
    }

    let data = ctx.data();
    let data_end = ctx.data_end();
    let eth = unsafe { ptr_at_mut::<EthHdr>(data, data_end, 0).ok_or(())? };
    unsafe { (*eth).h_proto = new_eth_proto };

    Ok(XDP_PASS)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
