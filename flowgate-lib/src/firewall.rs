//! Pushes statically-configured block rules into the pinned
//! `firewall-block-v4`/`firewall-block-v6` LPM tries at startup. Pinholes
//! opened by outbound traffic are managed entirely by the data plane and
//! have no static config surface here.

use aya::maps::lpm_trie::{Key, LpmTrie};
use aya::maps::MapData;
use flowgate_ebpf::DataPlane;
use flowgate_ebpf_common::maps::FirewallBlockValue;
use ipnet::IpNet;

use crate::config::BlockRule;
use crate::error::{FlowgateError, Result};

pub fn apply_block_rules(data_plane: &DataPlane, rules: &[BlockRule]) -> Result<()> {
    let v4_map = data_plane
        .map("firewall_block_v4")
        .ok_or(FlowgateError::MapNotFound { name: "firewall_block_v4" })?;
    let mut v4: LpmTrie<&MapData, [u8; 4], FirewallBlockValue> = LpmTrie::try_from(v4_map)?;

    let v6_map = data_plane
        .map("firewall_block_v6")
        .ok_or(FlowgateError::MapNotFound { name: "firewall_block_v6" })?;
    let mut v6: LpmTrie<&MapData, [u8; 16], FirewallBlockValue> = LpmTrie::try_from(v6_map)?;

    for rule in rules {
        let value = FirewallBlockValue::new(rule.block as u8);
        match rule.cidr {
            IpNet::V4(net) => {
                let key = Key::new(u32::from(net.prefix_len()), net.addr().octets());
                v4.insert(&key, value, 0)?;
            }
            IpNet::V6(net) => {
                let key = Key::new(u32::from(net.prefix_len()), net.addr().octets());
                v6.insert(&key, value, 0)?;
            }
        }
    }

    Ok(())
}
