// eBPF/XDP is Linux-only. This crate does not compile for other targets.
#![cfg(target_os = "linux")]

use std::path::PathBuf;

pub mod probe;
pub mod types;

pub use probe::{DataPlane, DEFAULT_PIN_PATH};
pub use types::{InterfaceConfig, InterfaceRole, ProxyRedirectMode};

#[derive(Debug, thiserror::Error)]
pub enum EbpfError {
    #[error("failed to create BPF map pin directory {path}: {source}")]
    PinDir { path: PathBuf, source: std::io::Error },

    #[error("failed to load BPF object for program '{program}': {source}")]
    Load { program: &'static str, source: aya::EbpfError },

    #[error("program '{program}' was never loaded")]
    ProgramNotLoaded { program: &'static str },

    #[error("program '{program}' not found in its BPF object")]
    ProgramNotFound { program: &'static str },

    #[error("program '{program}' is not the expected program type: {source}")]
    ProgramType { program: &'static str, #[source] source: aya::programs::ProgramError },

    #[error("failed to load program '{program}' into the kernel: {source}")]
    ProgramLoad { program: &'static str, #[source] source: aya::programs::ProgramError },

    #[error("failed to attach program '{program}': {source}")]
    Attach { program: &'static str, #[source] source: aya::programs::ProgramError },
}
