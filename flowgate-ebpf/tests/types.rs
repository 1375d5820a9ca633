use flowgate_ebpf::types::{InterfaceConfig, InterfaceRole};

#[test]
fn interface_config_builder_round_trips_role_and_session() {
    let lan = InterfaceConfig::new("br-lan", InterfaceRole::Lan);
    assert_eq!(lan.role, InterfaceRole::Lan);
    assert!(lan.pppoe_session_id.is_none());

    let wan = InterfaceConfig::new("ppp0", InterfaceRole::Wan).with_pppoe_session(7);
    assert_eq!(wan.pppoe_session_id, Some(7));
}
