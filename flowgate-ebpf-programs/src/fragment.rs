//! Fragment Tracker: a first fragment (more-fragments set, offset zero)
//! carries the only copy of the L4 header, so its ports are cached for
//! later fragments of the same datagram to recall. An unfragmented packet
//! never touches the cache.

use flowgate_ebpf_common::maps::{FragmentKey, FragmentValue};
use flowgate_ebpf_common::proto::FragmentType;

use crate::maps::FRAGMENT_CACHE;

fn remember(key: FragmentKey, src_port: u16, dst_port: u16) {
    let value = FragmentValue { src_port, dst_port };
    let _ = FRAGMENT_CACHE.insert(&key, &value, 0);
}

fn recall(key: &FragmentKey) -> Option<FragmentValue> {
    unsafe { FRAGMENT_CACHE.get(key) }.copied()
}

/// Resolves the ports to NAT/filter against for an L4 packet that may be
/// one fragment of several. `header_ports` is `Some` only when this
/// fragment actually carries an L4 header (single packet or first
/// fragment); middle and last fragments pass `None` and get the ports
/// back from the cache instead. A cache miss on a non-first fragment is an
/// `Err` — the caller should treat it as a state-miss drop.
pub fn resolve_ports(
    fragment_type: FragmentType,
    key: FragmentKey,
    header_ports: Option<(u16, u16)>,
) -> Result<(u16, u16), ()> {
    match fragment_type {
        FragmentType::Single => header_ports.ok_or(()),
        FragmentType::First => {
            let (src, dst) = header_ports.ok_or(())?;
            remember(key, src, dst);
            Ok((src, dst))
        }
        FragmentType::Middle | FragmentType::Last => recall(&key).map(|v| (v.src_port, v.dst_port)).ok_or(()),
    }
}
