use serde::Deserialize;

/// Load-time constants patched into the WAN-facing processors via
/// `EbpfLoader::set_global`. These are constants rather than map entries
/// because the in-kernel verifier benefits from their inlining.
#[derive(Debug, Clone, Deserialize)]
pub struct WanConfig {
    /// Uplink MTU in bytes, used by the MSS clamp and PPPoE oversize check.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    /// L3 header offset from the start of the frame: 14 for plain Ethernet,
    /// 0 once a PPPoE session header has already been stripped upstream.
    #[serde(default = "default_l3_offset")]
    pub l3_offset: u8,
}

impl Default for WanConfig {
    fn default() -> Self {
        WanConfig { mtu: default_mtu(), l3_offset: default_l3_offset() }
    }
}

fn default_mtu() -> u16 {
    1500
}

fn default_l3_offset() -> u8 {
    14
}
