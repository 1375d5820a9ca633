use thiserror::Error;

/// Errors surfaced by the control plane: configuration, data-plane
/// attachment, and the conntrack sweep.
#[derive(Error, Debug)]
pub enum FlowgateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no interfaces configured")]
    NoInterfaces,

    #[error("data plane attachment failed: {0}")]
    Ebpf(#[from] flowgate_ebpf::EbpfError),

    #[error("pinned map '{name}' not found; is the data plane loaded?")]
    MapNotFound { name: &'static str },

    #[error("BPF map error: {0}")]
    Map(#[from] aya::maps::MapError),
}

pub type Result<T> = std::result::Result<T, FlowgateError>;
