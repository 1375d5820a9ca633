pub mod config;
pub mod conntrack;
pub mod error;
pub mod firewall;
pub mod nat;
pub mod telemetry;

pub use config::{load_from_path, FlowgateConfig};
pub use error::{FlowgateError, Result};
