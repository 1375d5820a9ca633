use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flowgate_ebpf::DataPlane;
use flowgate_lib::config::load_from_path;
use flowgate_lib::telemetry::{init_metrics, init_tracing_with_otel};
use flowgate_lib::{conntrack, firewall, nat};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "flowgate packet-forwarding data plane")]
struct Cli {
    /// Path to the configuration TOML file.
    #[arg(short, long, value_name = "FILE", default_value = "/etc/flowgate/flowgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            // Tracing isn't initialized yet — logging config lives in the
            // file we just failed to read.
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    if let Err(err) =
        init_tracing_with_otel(cfg.logging.level.clone(), cfg.logging.show_target, cfg.telemetry.otel_log_level.clone())
    {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(config = %cli.config.display(), interfaces = cfg.interfaces.len(), "configuration loaded");

    let (metrics, _registry) = match init_metrics() {
        Ok(pair) => pair,
        Err(err) => {
            error!(%err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let ebpf_interfaces: Vec<_> =
        cfg.interfaces.iter().filter_map(|iface| iface.to_ebpf_interface()).collect();

    let data_plane = match DataPlane::load(&ebpf_interfaces, &cfg.pin_path) {
        Ok(dp) => Arc::new(dp),
        Err(err) => {
            error!(%err, "failed to load and attach the data plane");
            std::process::exit(1);
        }
    };
    info!("data plane attached");

    if let Err(err) = firewall::apply_block_rules(&data_plane, &cfg.firewall.rules) {
        error!(%err, "failed to apply firewall rules");
        std::process::exit(1);
    }
    info!(rules = cfg.firewall.rules.len(), "firewall rules applied");

    if let Err(err) = nat::apply_static_mappings(&data_plane, &cfg.nat.static_mappings) {
        error!(%err, "failed to apply static NAT mappings");
        std::process::exit(1);
    }
    info!(mappings = cfg.nat.static_mappings.len(), "static NAT mappings applied");

    conntrack::spawn(data_plane.clone(), metrics, Duration::from_secs(cfg.conntrack_sweep_secs));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to install ctrl-c handler");
    }
    info!("shutting down");
}
