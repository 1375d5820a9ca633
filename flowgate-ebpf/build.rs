use std::path::PathBuf;
use std::process::Command;

/// Compile every processor binary in `flowgate-ebpf-programs` for the
/// `bpfel-unknown-none` target using `cargo +nightly build`, then embed
/// each resulting ELF object into the userspace binary via
/// `aya::include_bytes_aligned!` in `loader.rs`.
///
/// Requirements: Rust nightly toolchain with `rust-src` component. The
/// `rust-toolchain.toml` in `flowgate-ebpf-programs/` pins the channel.
const PROGRAM_NAMES: &[&str] = &[
    "firewall",
    "flow_classify",
    "flow_verdict",
    "route_lan",
    "route_wan",
    "nat",
    "nat6",
    "mss_clamp",
    "pppoe",
    "tproxy_redirect",
    "dns_dispatch",
    "neigh_snoop",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let programs_dir = manifest_dir
        .parent()
        .ok_or("could not find workspace root")?
        .join("flowgate-ebpf-programs");

    println!("cargo:rerun-if-changed={}", programs_dir.join("src").display());
    println!("cargo:rerun-if-changed={}", programs_dir.join("Cargo.toml").display());

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let bpf_target_dir = out_dir.join("bpf-programs-target");

    // A build script inherits RUSTC/RUSTUP_TOOLCHAIN from the outer (stable)
    // cargo invocation; clear them so rustup resolves the nightly toolchain
    // pinned by flowgate-ebpf-programs/rust-toolchain.toml instead.
    let status = Command::new("cargo")
        .args(["build", "--release", "--target", "bpfel-unknown-none", "-Z", "build-std=core"])
        .env("CARGO_TARGET_DIR", &bpf_target_dir)
        .env_remove("RUSTC")
        .env_remove("RUSTDOC")
        .env_remove("RUSTUP_TOOLCHAIN")
        .env_remove("RUSTC_WORKSPACE_WRAPPER")
        .env_remove("RUSTC_WRAPPER")
        .current_dir(&programs_dir)
        .status();

    match status {
        Ok(s) if s.success() => {}
        Ok(s) => {
            return Err(format!(
                "cargo build of flowgate-ebpf-programs failed (exit {:?}).\n\
                Ensure nightly toolchain and rust-src are installed:\n\
                  rustup toolchain install nightly\n\
                  rustup component add rust-src --toolchain nightly",
                s.code()
            )
            .into());
        }
        Err(e) => return Err(format!("failed to run cargo: {e}").into()),
    }

    let release_dir = bpf_target_dir.join("bpfel-unknown-none/release");
    for name in PROGRAM_NAMES {
        let bpf_bin = release_dir.join(name);
        if !bpf_bin.exists() {
            return Err(format!("BPF binary not found at {}", bpf_bin.display()).into());
        }
        let out_file = out_dir.join(format!("{name}.bpf.o"));
        std::fs::copy(&bpf_bin, &out_file)?;
        println!("cargo:rustc-env={}_BPF_OBJ={}", name.to_uppercase(), out_file.display());
    }

    Ok(())
}
