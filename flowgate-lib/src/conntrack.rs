//! Userspace conntrack-expiry sweep.
//!
//! `flowgate-ebpf-programs::nat` stores an absolute deadline in each
//! `nat-conntrack` entry instead of arming a kernel timer (no safe
//! `aya-ebpf` binding exists for `bpf_timer`). This task periodically scans
//! that map for deadlines in the past and deletes the entry plus its paired
//! `nat-mapping` egress/ingress rows, preserving the invariant that a
//! conntrack entry exists iff its mapping pair does.

use std::time::Duration;

use aya::maps::{HashMap as AyaHashMap, MapData};
use flowgate_ebpf::DataPlane;
use flowgate_ebpf_common::maps::{ConntrackKey, ConntrackValue, NatMappingKey, NatMappingValue};
use flowgate_ebpf_common::Direction;
use tracing::{debug, warn};

use crate::error::{FlowgateError, Result};
use crate::telemetry::Metrics;

fn monotonic_now_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, fully-initialized out-parameter.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(ts.tv_nsec as u64)
}

/// Runs the sweep once, returning the number of conntrack entries reaped.
pub fn sweep_once(data_plane: &DataPlane, metrics: &Metrics) -> Result<usize> {
    let conntrack_map =
        data_plane.map("nat_conntrack").ok_or(FlowgateError::MapNotFound { name: "nat_conntrack" })?;
    let mut conntrack: AyaHashMap<&MapData, ConntrackKey, ConntrackValue> =
        AyaHashMap::try_from(conntrack_map)?;

    let mapping_map =
        data_plane.map("nat_mapping").ok_or(FlowgateError::MapNotFound { name: "nat_mapping" })?;
    let mut mapping: AyaHashMap<&MapData, NatMappingKey, NatMappingValue> =
        AyaHashMap::try_from(mapping_map)?;

    let now = monotonic_now_ns();
    let mut expired = Vec::new();
    for entry in conntrack.iter() {
        let (key, value) = entry?;
        if value.deadline <= now {
            expired.push(key);
        }
    }

    let mut reaped = 0usize;
    for key in expired {
        let value = match conntrack.get(&key, 0) {
            Ok(value) => value,
            Err(_) => continue,
        };

        // The conntrack tuple's `src` side is always the WAN-side (mapped)
        // address/port, never the LAN client's — recover the client via the
        // ingress mapping entry before deriving the egress key from it.
        let ingress_key =
            NatMappingKey::new(Direction::Ingress as u8, key.l4_proto, key.tuple.src_port, key.tuple.src_addr);
        if let Ok(ingress_value) = mapping.get(&ingress_key, 0) {
            let egress_key = NatMappingKey::new(
                Direction::Egress as u8,
                key.l4_proto,
                ingress_value.mapped_port,
                ingress_value.mapped_addr,
            );
            let _ = mapping.remove(&egress_key);
        }
        let _ = mapping.remove(&ingress_key);
        let _ = conntrack.remove(&key);

        debug!(
            l4_proto = key.l4_proto,
            trigger_port = value.trigger_port,
            "nat_delete: conntrack entry expired, mapping pair reaped"
        );
        metrics.nat_conntrack_expirations_total.add(1, &[]);
        metrics.nat_mappings_active.add(-1, &[]);
        reaped += 1;
    }

    Ok(reaped)
}

/// Spawns the periodic sweep as a `tokio` background task. The returned
/// handle resolves only on unrecoverable map errors; routine emptiness is
/// not an error.
pub fn spawn(data_plane: std::sync::Arc<DataPlane>, metrics: std::sync::Arc<Metrics>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sweep_once(&data_plane, &metrics) {
                Ok(0) => {}
                Ok(n) => debug!(reaped = n, "conntrack sweep reaped expired entries"),
                Err(err) => warn!(?err, "conntrack sweep failed"),
            }
        }
    });
}
