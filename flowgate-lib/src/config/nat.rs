use serde::Deserialize;

/// NAT egress port probe range and static mappings. Conntrack timeouts
/// themselves are fixed constants in `flowgate-ebpf-common::limits`
/// (inlined at BPF-verification time); this config only covers the
/// control-plane-managed pieces: the probe range and operator-declared
/// static port forwards.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NatConfig {
    #[serde(default)]
    pub static_mappings: Vec<StaticMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticMapping {
    pub external_port: u16,
    pub internal_addr: std::net::IpAddr,
    pub internal_port: u16,
    #[serde(default)]
    pub protocol: NatProtocol,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NatProtocol {
    #[default]
    Tcp,
    Udp,
}
