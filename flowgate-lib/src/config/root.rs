use std::path::PathBuf;

use serde::Deserialize;

use super::dns::DnsConfig;
use super::firewall::FirewallConfig;
use super::interfaces::InterfaceConfig;
use super::nat::NatConfig;
use super::proxy::ProxyConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::wan::WanConfig;

/// Top-level configuration for a running `flowgate` instance.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowgateConfig {
    /// Network interfaces to attach processors to, plus the DNS listener
    /// group. At least one `Lan` or `Wan` interface is required.
    pub interfaces: Vec<InterfaceConfig>,
    /// Directory on a mounted bpffs where every processor's maps are
    /// pinned by name.
    #[serde(default = "default_pin_path")]
    pub pin_path: PathBuf,
    #[serde(default)]
    pub wan: WanConfig,
    #[serde(default)]
    pub nat: NatConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Conntrack sweep period in seconds.
    #[serde(default = "default_conntrack_sweep_secs")]
    pub conntrack_sweep_secs: u64,
}

fn default_pin_path() -> PathBuf {
    PathBuf::from(flowgate_ebpf::DEFAULT_PIN_PATH)
}

fn default_conntrack_sweep_secs() -> u64 {
    30
}
