mod dns;
mod firewall;
mod interfaces;
mod loader;
mod nat;
mod proxy;
mod root;
mod telemetry;
mod wan;

pub use dns::{DnsConfig, DnsListener};
pub use firewall::{BlockRule, FirewallConfig};
pub use interfaces::{InterfaceConfig, InterfaceRole};
pub use loader::load_from_path;
pub use nat::{NatConfig, NatProtocol, StaticMapping};
pub use proxy::{ProxyConfig, ProxyMode};
pub use root::FlowgateConfig;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use wan::WanConfig;
