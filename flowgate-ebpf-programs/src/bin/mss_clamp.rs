//! TC classifier: MSS Clamp.
//!
//! Walks TCP options on SYN segments looking for the MSS option and, if its
//! advertised value would produce a segment too large for the encapsulated
//! uplink (PPPoE adds 8 bytes of header), lowers it in place and fixes up
//! the TCP checksum incrementally.
#![no_std]
#![no_main]

use aya_ebpf::bindings::TC_ACT_OK;
use aya_ebpf::macros::classifier;
use aya_ebpf::programs::TcContext;
use flowgate_ebpf_common::checksum::update_u16;
use flowgate_ebpf_common::classify::clamp_mss;
use flowgate_ebpf_programs::{ptr_at, ptr::ptr_at_mut, EthHdr, Ipv4Hdr, TcpHdr, ETH_P_IP, IPPROTO_TCP};

const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();
const TCP_HDR_LEN: usize = core::mem::size_of::<TcpHdr>();

const TCPOPT_EOL: u8 = 0;
const TCPOPT_NOP: u8 = 1;
const TCPOPT_MSS: u8 = 2;

/// Bounded iteration cap for the TCP options walk: the header's own doff
/// field can encode at most 40 bytes of options, so 20 two-byte steps is
/// already generous and keeps the verifier's loop-bound analysis happy.
const MAX_OPTION_STEPS: u32 = 20;

/// Effective MTU of the uplink this clamp runs on, after subtracting the
/// encapsulation overhead (PPPoE header + PPP protocol field) this router
/// always adds on WAN egress.
const UPLINK_MTU: u16 = 1500;
const PPPOE_OVERHEAD: usize = 8;

#[classifier]
pub fn flowgate_mss_clamp(ctx: TcContext) -> i32 {
    let _ = try_clamp(&ctx);
    TC_ACT_OK
}

fn try_clamp(ctx: &TcContext) -> Result<(), ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    let eth = unsafe { ptr_at::<EthHdr>(data, data_end, 0).ok_or(())? };
    if unsafe { (*eth).h_proto } != ETH_P_IP {
        return Ok(());
    }

    let ip = unsafe { ptr_at::<Ipv4Hdr>(data, data_end, ETH_HDR_LEN).ok_or(())? };
    if unsafe { (*ip).protocol } != IPPROTO_TCP {
        return Ok(());
    }
    let ip_hdr_len = unsafe { (*ip).ihl() as usize * 4 };
    let tcp_off = ETH_HDR_LEN + ip_hdr_len;

    let tcp = unsafe { ptr_at_mut::<TcpHdr>(data, data_end, tcp_off).ok_or(())? };
    let flags = unsafe { (*tcp).flags() };
    if !flags.syn {
        return Ok(());
    }

    let doff = unsafe { (*tcp).doff() } as usize * 4;
    if doff <= TCP_HDR_LEN {
        return Ok(()); // no options present
    }
    let opts_len = doff - TCP_HDR_LEN;
    let opts_off = tcp_off + TCP_HDR_LEN;

    let limit = clamp_mss(u16::MAX, UPLINK_MTU, ip_hdr_len + PPPOE_OVERHEAD);

    let mut pos = 0usize;
    let mut step = 0u32;
    while step < MAX_OPTION_STEPS && pos < opts_len {
        step += 1;
        let kind_ptr = unsafe { ptr_at::<u8>(data, data_end, opts_off + pos).ok_or(())? };
        let kind = unsafe { *kind_ptr };

        if kind == TCPOPT_EOL {
            break;
        }
        if kind == TCPOPT_NOP {
            pos += 1;
            continue;
        }

        let len_ptr = unsafe { ptr_at::<u8>(data, data_end, opts_off + pos + 1).ok_or(())? };
        let opt_len = unsafe { *len_ptr } as usize;
        if opt_len < 2 {
            break;
        }

        if kind == TCPOPT_MSS && opt_len == 4 {
            let mss_ptr =
                unsafe { ptr_at_mut::<u16>(data, data_end, opts_off + pos + 2).ok_or(())? };
            let advertised = u16::from_be(unsafe { *mss_ptr });
            if advertised > limit {
                unsafe {
                    *mss_ptr = limit.to_be();
                    (*tcp).check = update_u16((*tcp).check, advertised.to_be(), limit.to_be());
                }
            }
            return Ok(());
        }

        pos += opt_len;
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
