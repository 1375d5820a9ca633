//! Host-side types describing how the data plane is wired to real
//! interfaces. These carry no kernel layout constraints (unlike
//! `flowgate-ebpf-common::maps`, which does) — they're plain configuration
//! the loader consumes when deciding which programs to attach where.

/// How an interface participates in the data plane. Each role determines
/// which processor set the loader attaches to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceRole {
    /// Directly-connected LAN segment: firewall, flow classifier/verdict,
    /// route engine (LAN path), NAT egress/ingress.
    Lan,
    /// Uplink to the WAN: firewall, route engine (WAN path), NAT,
    /// MSS clamp, and — if PPPoE is configured — the PPPoE adapter.
    Wan,
    /// veth endpoint inside a container network namespace carrying the
    /// landscape VLAN tag: transparent-proxy redirect only.
    ContainerNetns,
}

#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub name: String,
    pub role: InterfaceRole,
    /// Present only for `Wan` interfaces configured to dial out over
    /// PPPoE; `None` means the uplink is a plain Ethernet/DHCP WAN.
    pub pppoe_session_id: Option<u16>,
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>, role: InterfaceRole) -> Self {
        InterfaceConfig { name: name.into(), role, pppoe_session_id: None }
    }

    #[must_use]
    pub fn with_pppoe_session(mut self, session_id: u16) -> Self {
        self.pppoe_session_id = Some(session_id);
        self
    }
}

/// Whether a `ContainerNetns` interface's traffic is handed to a
/// transparent-proxy listening socket or left to the namespace's own
/// routing stack. Mirrors `TPROXY_MODE_TRANSPARENT` in `tproxy_redirect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRedirectMode {
    Transparent,
    Route,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_config_defaults_to_no_pppoe_session() {
        let cfg = InterfaceConfig::new("eth0", InterfaceRole::Wan);
        assert_eq!(cfg.pppoe_session_id, None);
        assert_eq!(cfg.role, InterfaceRole::Wan);
    }

    #[test]
    fn with_pppoe_session_sets_the_session_id() {
        let cfg = InterfaceConfig::new("ppp0", InterfaceRole::Wan).with_pppoe_session(42);
        assert_eq!(cfg.pppoe_session_id, Some(42));
    }
}
