//! Types and pure logic shared between the kernel-side processors and the
//! userspace loader/control plane.
//!
//! This crate is `no_std` so it can be compiled for both targets:
//! - `bpfel-unknown-none` (the in-kernel processors)
//! - the host target (userspace loader in `flowgate-ebpf`, and `flowgate-lib`)
//!
//! Enable the `aya-pod` feature in a userspace crate to get the `aya::Pod`
//! impls required for reading values out of BPF maps.
#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod checksum;
pub mod classify;
pub mod limits;
pub mod mark;
pub mod maps;
pub mod proto;
pub mod vlan;

pub use addr::{InetAddr, Tuple};
pub use classify::{IcmpClass, TcpFlags};
pub use mark::{FlowAction, Mark, SourceClass};
pub use proto::{
    ConntrackState, Direction, FragmentType, L3Proto, L4Proto, PinholeStatus, PktClass, Verdict,
};
pub use vlan::VlanTag;
