use std::fs;
use std::path::Path;

use crate::config::FlowgateConfig;
use crate::error::{FlowgateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<FlowgateConfig> {
    let txt = fs::read_to_string(p)?;
    let cfg: FlowgateConfig = toml::from_str(&txt)
        .map_err(|e| FlowgateError::Config(format!("failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &FlowgateConfig) -> Result<()> {
    if cfg.interfaces.is_empty() {
        return Err(FlowgateError::NoInterfaces);
    }

    let mut names = std::collections::HashSet::new();
    for iface in &cfg.interfaces {
        if !names.insert(iface.name.as_str()) {
            return Err(FlowgateError::Config(format!("duplicate interface name: {}", iface.name)));
        }
    }

    for listener in &cfg.dns.listeners {
        if listener.flow_id == 0 {
            return Err(FlowgateError::Config(
                "DNS listener flow_id 0 is reserved for unclassified traffic".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_config_with_no_interfaces() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interfaces = []").unwrap();
        let err = load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, FlowgateError::NoInterfaces));
    }

    #[test]
    fn loads_a_minimal_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[interfaces]]
            name = "eth0"
            role = "wan"

            [[interfaces]]
            name = "br-lan"
            role = "lan"
            "#
        )
        .unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.interfaces.len(), 2);
    }

    #[test]
    fn rejects_duplicate_interface_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[interfaces]]
            name = "eth0"
            role = "wan"

            [[interfaces]]
            name = "eth0"
            role = "lan"
            "#
        )
        .unwrap();
        let err = load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, FlowgateError::Config(_)));
    }
}
