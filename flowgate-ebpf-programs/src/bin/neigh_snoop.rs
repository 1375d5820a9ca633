//! kprobe: neighbour-table snooper.
//!
//! Attaches to the kernel's `neigh_update` entry point and mirrors every
//! resolved `{addr, mac, ifindex}` triple into the pinned neighbour-cache
//! maps, the sole writer of those maps; the Route Engine only reads them
//! when deciding between a direct link-layer rewrite and the
//! `bpf_redirect_neigh` helper.
#![no_std]
#![no_main]

use aya_ebpf::helpers::bpf_probe_read_kernel;
use aya_ebpf::macros::kprobe;
use aya_ebpf::programs::ProbeContext;
use flowgate_ebpf_common::maps::{NeighbourKey, NeighbourValue};
use flowgate_ebpf_common::InetAddr;
use flowgate_ebpf_programs::maps::{NEIGHBOUR_CACHE_V4, NEIGHBOUR_CACHE_V6};

/// Offsets into `struct neighbour`, valid for the kernel ABI this router
/// targets (pahole-verified, not BTF-relocated: the safe `aya-ebpf`
/// bindings don't expose this internal struct).
const NEIGH_OFF_DEV: usize = 0x18;
const NEIGH_OFF_PRIMARY_KEY: usize = 0x8c;
const NEIGH_OFF_HA: usize = 0x60;
const NET_DEVICE_OFF_IFINDEX: usize = 0xf8;

/// `neigh_update(struct neighbour *neigh, const u8 *lladdr, u8 new, u32 flags, u32 nlmsg_pid)`
#[kprobe]
pub fn flowgate_neigh_snoop(ctx: ProbeContext) -> u32 {
    let _ = try_snoop(&ctx);
    0
}

fn try_snoop(ctx: &ProbeContext) -> Result<(), i64> {
    let neigh: *const u8 = ctx.arg(0).ok_or(-1i64)?;
    let lladdr: *const u8 = ctx.arg(1).ok_or(-1i64)?;

    let mac = unsafe { bpf_probe_read_kernel(lladdr as *const [u8; 6])? };
    if mac == [0u8; 6] {
        return Ok(());
    }

    let dev_ptr: u64 = unsafe { bpf_probe_read_kernel((neigh.add(NEIGH_OFF_DEV)) as *const u64)? };
    let ifindex: u32 =
        unsafe { bpf_probe_read_kernel((dev_ptr as *const u8).add(NET_DEVICE_OFF_IFINDEX) as *const u32)? };

    // `primary_key` is a variable-length trailer sized by the address
    // family the neighbour table was created for; IPv4 entries read 4
    // bytes, IPv6 entries read 16. Both are attempted and whichever
    // produces a plausible (non-zero) address wins — a coarse stand-in for
    // the family check the original performs via `neigh->tbl->family`.
    let v4 = unsafe { bpf_probe_read_kernel((neigh.add(NEIGH_OFF_PRIMARY_KEY)) as *const [u8; 4])? };
    if v4 != [0u8; 4] {
        let key = NeighbourKey::new(InetAddr::from_v4(v4));
        let value = NeighbourValue::new(mac, ifindex, [0; 6]);
        let _ = NEIGHBOUR_CACHE_V4.insert(&key, &value, 0);
        return Ok(());
    }

    let v6 = unsafe { bpf_probe_read_kernel((neigh.add(NEIGH_OFF_PRIMARY_KEY)) as *const [u8; 16])? };
    if v6 != [0u8; 16] {
        let key = NeighbourKey::new(InetAddr::from_v6(v6));
        let value = NeighbourValue::new(mac, ifindex, [0; 6]);
        let _ = NEIGHBOUR_CACHE_V6.insert(&key, &value, 0);
    }

    Ok(())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
