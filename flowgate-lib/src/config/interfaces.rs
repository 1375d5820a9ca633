use serde::Deserialize;

/// How an interface participates in the data plane. Mirrors
/// `flowgate_ebpf::types::InterfaceRole` for the three roles that attach to
/// a network interface; `Dns` instead names a socket group the DNS
/// dispatcher's `SK_REUSEPORT` program attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceRole {
    Lan,
    Wan,
    ContainerInner,
    Dns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub role: InterfaceRole,
    /// Present only for `Wan` interfaces dialing out over PPPoE.
    #[serde(default)]
    pub pppoe_session_id: Option<u16>,
}

impl InterfaceConfig {
    /// Converts to the loader's interface type, for the three roles the
    /// loader attaches programs to directly. `Dns` interfaces are not
    /// network interfaces and have no loader-side counterpart.
    pub fn to_ebpf_interface(&self) -> Option<flowgate_ebpf::types::InterfaceConfig> {
        let role = match self.role {
            InterfaceRole::Lan => flowgate_ebpf::types::InterfaceRole::Lan,
            InterfaceRole::Wan => flowgate_ebpf::types::InterfaceRole::Wan,
            InterfaceRole::ContainerInner => flowgate_ebpf::types::InterfaceRole::ContainerNetns,
            InterfaceRole::Dns => return None,
        };
        let mut cfg = flowgate_ebpf::types::InterfaceConfig::new(self.name.clone(), role);
        if let Some(session_id) = self.pppoe_session_id {
            cfg = cfg.with_pppoe_session(session_id);
        }
        Some(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_role_has_no_loader_interface() {
        let cfg = InterfaceConfig { name: "dns0".into(), role: InterfaceRole::Dns, pppoe_session_id: None };
        assert!(cfg.to_ebpf_interface().is_none());
    }

    #[test]
    fn wan_role_carries_pppoe_session_through() {
        let cfg =
            InterfaceConfig { name: "ppp0".into(), role: InterfaceRole::Wan, pppoe_session_id: Some(11) };
        let ebpf_cfg = cfg.to_ebpf_interface().expect("wan interface converts");
        assert_eq!(ebpf_cfg.pppoe_session_id, Some(11));
    }
}
