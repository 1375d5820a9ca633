use serde::Deserialize;

/// A static block rule pushed into `firewall-block-v4`/`firewall-block-v6`
/// at startup. Pinholes opened by outbound traffic are managed entirely by
/// the data plane and have no static config surface.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRule {
    pub cidr: ipnet::IpNet,
    #[serde(default = "default_true")]
    pub block: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FirewallConfig {
    #[serde(default)]
    pub rules: Vec<BlockRule>,
}

fn default_true() -> bool {
    true
}
