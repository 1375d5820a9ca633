use std::collections::HashMap as StdHashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use aya::programs::{tc, KProbe, SchedClassifier, TcAttachType, Xdp, XdpFlags};
use aya::{Ebpf, EbpfLoader};
use tracing::{debug, info, warn};

use crate::types::{InterfaceConfig, InterfaceRole};
use crate::EbpfError;

macro_rules! embed_program {
    ($name:literal) => {
        aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/", $name, ".bpf.o"))
    };
}

static FIREWALL_BYTES: &[u8] = embed_program!("firewall");
static FLOW_CLASSIFY_BYTES: &[u8] = embed_program!("flow_classify");
static FLOW_VERDICT_BYTES: &[u8] = embed_program!("flow_verdict");
static ROUTE_LAN_BYTES: &[u8] = embed_program!("route_lan");
static ROUTE_WAN_BYTES: &[u8] = embed_program!("route_wan");
static NAT_BYTES: &[u8] = embed_program!("nat");
static NAT6_BYTES: &[u8] = embed_program!("nat6");
static MSS_CLAMP_BYTES: &[u8] = embed_program!("mss_clamp");
static PPPOE_BYTES: &[u8] = embed_program!("pppoe");
static TPROXY_REDIRECT_BYTES: &[u8] = embed_program!("tproxy_redirect");
static DNS_DISPATCH_BYTES: &[u8] = embed_program!("dns_dispatch");
static NEIGH_SNOOP_BYTES: &[u8] = embed_program!("neigh_snoop");

/// Default directory under the bpffs where every processor's maps are
/// pinned by name so the twelve independently-compiled binaries share one
/// underlying set of map objects.
pub const DEFAULT_PIN_PATH: &str = "/sys/fs/bpf/flowgate";

/// Holds every loaded `Ebpf` object alive for the life of the data plane —
/// dropping one detaches its programs and, for non-pinned resources,
/// reclaims its maps.
pub struct DataPlane {
    programs: StdHashMap<&'static str, Ebpf>,
    pin_path: PathBuf,
}

impl DataPlane {
    /// Loads and attaches every processor needed for the given interface
    /// set, plus the global neighbour snooper. `pin_path` must be on a
    /// mounted bpffs; it is created if missing.
    pub fn load(interfaces: &[InterfaceConfig], pin_path: &Path) -> Result<Self, EbpfError> {
        remove_memlock_limit();
        std::fs::create_dir_all(pin_path)
            .map_err(|source| EbpfError::PinDir { path: pin_path.to_path_buf(), source })?;

        let mut dp = DataPlane { programs: StdHashMap::new(), pin_path: pin_path.to_path_buf() };

        dp.load_program("firewall", FIREWALL_BYTES, |_| {})?;
        dp.load_program("flow_classify", FLOW_CLASSIFY_BYTES, |_| {})?;
        dp.load_program("flow_verdict", FLOW_VERDICT_BYTES, |_| {})?;
        dp.load_program("route_lan", ROUTE_LAN_BYTES, |_| {})?;
        dp.load_program("route_wan", ROUTE_WAN_BYTES, |_| {})?;
        dp.load_program("nat", NAT_BYTES, |_| {})?;
        dp.load_program("nat6", NAT6_BYTES, |_| {})?;
        dp.load_program("mss_clamp", MSS_CLAMP_BYTES, |_| {})?;
        dp.load_program("tproxy_redirect", TPROXY_REDIRECT_BYTES, |_| {})?;
        dp.load_program("dns_dispatch", DNS_DISPATCH_BYTES, |_| {})?;
        dp.load_program("neigh_snoop", NEIGH_SNOOP_BYTES, |_| {})?;

        let pppoe_session_id =
            interfaces.iter().find_map(|iface| iface.pppoe_session_id).unwrap_or(0);
        dp.load_program("pppoe", PPPOE_BYTES, |loader| {
            loader.set_global("PPPOE_SESSION_ID", &pppoe_session_id, true);
        })?;

        dp.attach_kprobe("neigh_snoop", "flowgate_neigh_snoop", "neigh_update")?;

        for iface in interfaces {
            dp.attach_interface(iface)?;
        }

        Ok(dp)
    }

    fn load_program(
        &mut self,
        key: &'static str,
        bytes: &[u8],
        configure: impl FnOnce(&mut EbpfLoader),
    ) -> Result<(), EbpfError> {
        let mut loader = EbpfLoader::new();
        loader.map_pin_path(&self.pin_path);
        configure(&mut loader);
        let ebpf = loader.load(bytes).map_err(|source| EbpfError::Load { program: key, source })?;
        self.programs.insert(key, ebpf);
        Ok(())
    }

    fn attach_interface(&mut self, iface: &InterfaceConfig) -> Result<(), EbpfError> {
        for entry in tc_processors_for_role(iface.role) {
            self.attach_tc(entry.key, entry.program, &iface.name, entry.direction)?;
        }

        if iface.role == InterfaceRole::Wan {
            if iface.pppoe_session_id.is_some() {
                self.attach_tc("pppoe", "flowgate_pppoe_egress", &iface.name, TcAttachType::Egress)?;
                self.attach_xdp("pppoe", "flowgate_pppoe_ingress", &iface.name)?;
            } else {
                debug!(interface = %iface.name, "WAN interface has no PPPoE session configured, skipping adapter");
            }
        }

        info!(interface = %iface.name, role = ?iface.role, "attached data plane processors");
        Ok(())
    }

    fn attach_tc(
        &mut self,
        key: &'static str,
        program_name: &str,
        iface: &str,
        direction: TcAttachType,
    ) -> Result<(), EbpfError> {
        // Idempotent: a second attach on the same interface for a different
        // processor reuses the clsact qdisc the first attach created.
        if let Err(err) = tc::qdisc_add_clsact(iface) {
            warn!(interface = iface, ?err, "clsact qdisc already present or could not be added");
        }

        let ebpf = self.programs.get_mut(key).ok_or(EbpfError::ProgramNotLoaded { program: key })?;
        let program: &mut SchedClassifier = ebpf
            .program_mut(program_name)
            .ok_or(EbpfError::ProgramNotFound { program: program_name })?
            .try_into()
            .map_err(|source| EbpfError::ProgramType { program: program_name, source })?;
        program
            .load()
            .map_err(|source| EbpfError::ProgramLoad { program: program_name, source })?;
        program
            .attach(iface, direction)
            .map_err(|source| EbpfError::Attach { program: program_name, source })?;
        Ok(())
    }

    fn attach_xdp(&mut self, key: &'static str, program_name: &str, iface: &str) -> Result<(), EbpfError> {
        let ebpf = self.programs.get_mut(key).ok_or(EbpfError::ProgramNotLoaded { program: key })?;
        let program: &mut Xdp = ebpf
            .program_mut(program_name)
            .ok_or(EbpfError::ProgramNotFound { program: program_name })?
            .try_into()
            .map_err(|source| EbpfError::ProgramType { program: program_name, source })?;
        program
            .load()
            .map_err(|source| EbpfError::ProgramLoad { program: program_name, source })?;
        program
            .attach(iface, XdpFlags::default())
            .map_err(|source| EbpfError::Attach { program: program_name, source })?;
        Ok(())
    }

    fn attach_kprobe(
        &mut self,
        key: &'static str,
        program_name: &str,
        kernel_fn: &str,
    ) -> Result<(), EbpfError> {
        let ebpf = self.programs.get_mut(key).ok_or(EbpfError::ProgramNotLoaded { program: key })?;
        let program: &mut KProbe = ebpf
            .program_mut(program_name)
            .ok_or(EbpfError::ProgramNotFound { program: program_name })?
            .try_into()
            .map_err(|source| EbpfError::ProgramType { program: program_name, source })?;
        program
            .load()
            .map_err(|source| EbpfError::ProgramLoad { program: program_name, source })?;
        program
            .attach(kernel_fn, 0)
            .map_err(|source| EbpfError::Attach { program: program_name, source })?;
        Ok(())
    }

    /// Raw file descriptor of the loaded `sk_reuseport` DNS dispatcher
    /// program, for the DNS listener component to install with
    /// `setsockopt(SO_ATTACH_REUSEPORT_EBPF)` on its listening sockets.
    pub fn dns_dispatch_program_fd(&self) -> Result<RawFd, EbpfError> {
        let ebpf =
            self.programs.get("dns_dispatch").ok_or(EbpfError::ProgramNotLoaded { program: "dns_dispatch" })?;
        let program = ebpf
            .program("flowgate_dns_dispatch")
            .ok_or(EbpfError::ProgramNotFound { program: "flowgate_dns_dispatch" })?;
        program
            .fd()
            .map(|fd| fd.as_raw_fd())
            .map_err(|source| EbpfError::ProgramType { program: "flowgate_dns_dispatch", source })
    }

    /// Access to a pinned map by name, for the conntrack sweep task and the
    /// control-plane configuration writer. Any loaded `Ebpf` instance sees
    /// the same pinned map, so the first one suffices.
    pub fn map(&self, name: &str) -> Option<&aya::maps::Map> {
        self.programs.values().next().and_then(|ebpf| ebpf.map(name))
    }
}

/// One TC processor to attach to an interface in a given direction.
struct TcEntry {
    key: &'static str,
    program: &'static str,
    direction: TcAttachType,
}

const LAN_TC: &[TcEntry] = &[
    TcEntry { key: "firewall", program: "flowgate_firewall_ingress", direction: TcAttachType::Ingress },
    TcEntry { key: "firewall", program: "flowgate_firewall_egress", direction: TcAttachType::Egress },
    TcEntry { key: "flow_classify", program: "flowgate_flow_classify", direction: TcAttachType::Ingress },
    TcEntry { key: "flow_verdict", program: "flowgate_flow_verdict", direction: TcAttachType::Ingress },
    TcEntry { key: "route_lan", program: "flowgate_route_lan", direction: TcAttachType::Ingress },
    TcEntry { key: "nat", program: "flowgate_nat_egress", direction: TcAttachType::Egress },
    TcEntry { key: "nat", program: "flowgate_nat_ingress", direction: TcAttachType::Ingress },
    TcEntry { key: "nat6", program: "flowgate_nat6_egress", direction: TcAttachType::Egress },
    TcEntry { key: "nat6", program: "flowgate_nat6_ingress", direction: TcAttachType::Ingress },
];

const WAN_TC: &[TcEntry] = &[
    TcEntry { key: "firewall", program: "flowgate_firewall_ingress", direction: TcAttachType::Ingress },
    TcEntry { key: "firewall", program: "flowgate_firewall_egress", direction: TcAttachType::Egress },
    TcEntry { key: "route_wan", program: "flowgate_route_wan", direction: TcAttachType::Ingress },
    TcEntry { key: "nat", program: "flowgate_nat_egress", direction: TcAttachType::Egress },
    TcEntry { key: "nat", program: "flowgate_nat_ingress", direction: TcAttachType::Ingress },
    TcEntry { key: "nat6", program: "flowgate_nat6_egress", direction: TcAttachType::Egress },
    TcEntry { key: "nat6", program: "flowgate_nat6_ingress", direction: TcAttachType::Ingress },
    TcEntry { key: "mss_clamp", program: "flowgate_mss_clamp", direction: TcAttachType::Egress },
];

const CONTAINER_NETNS_TC: &[TcEntry] = &[TcEntry {
    key: "tproxy_redirect",
    program: "flowgate_tproxy_redirect",
    direction: TcAttachType::Ingress,
}];

fn tc_processors_for_role(role: InterfaceRole) -> &'static [TcEntry] {
    match role {
        InterfaceRole::Lan => LAN_TC,
        InterfaceRole::Wan => WAN_TC,
        InterfaceRole::ContainerNetns => CONTAINER_NETNS_TC,
    }
}

fn remove_memlock_limit() {
    #[cfg(target_os = "linux")]
    unsafe {
        let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
        let _ = libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lan_role_attaches_nat_in_both_directions() {
        let entries = tc_processors_for_role(InterfaceRole::Lan);
        assert!(entries.iter().any(|e| e.program == "flowgate_nat_egress"));
        assert!(entries.iter().any(|e| e.program == "flowgate_nat_ingress"));
    }

    #[test]
    fn wan_role_includes_mss_clamp_but_not_flow_classify() {
        let entries = tc_processors_for_role(InterfaceRole::Wan);
        assert!(entries.iter().any(|e| e.program == "flowgate_mss_clamp"));
        assert!(!entries.iter().any(|e| e.program == "flowgate_flow_classify"));
    }

    #[test]
    fn container_netns_role_only_attaches_tproxy_redirect() {
        let entries = tc_processors_for_role(InterfaceRole::ContainerNetns);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].program, "flowgate_tproxy_redirect");
    }
}
