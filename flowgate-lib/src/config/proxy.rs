use serde::Deserialize;

/// Transparent-proxy redirect configuration for `ContainerInner` interfaces,
/// mirroring `TPROXY_MODE_TRANSPARENT` in `flowgate-ebpf-programs::tproxy_redirect`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub mode: ProxyMode,
    /// Base port added to a flow id to compute the proxy's listening port
    /// for that flow (`PROXY_PORT_BASE` in the wire layer).
    #[serde(default = "default_port_base")]
    pub port_base: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig { mode: ProxyMode::default(), port_base: default_port_base() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    #[default]
    Transparent,
    Route,
}

fn default_port_base() -> u16 {
    12000
}
