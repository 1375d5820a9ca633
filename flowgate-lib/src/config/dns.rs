use serde::Deserialize;

/// Per-flow DNS listener the dispatcher's `SK_REUSEPORT` program steers
/// datagrams to, registered in `reuseport-socket-map` keyed by flow id.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsListener {
    pub flow_id: u8,
    pub listen_addr: std::net::SocketAddr,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DnsConfig {
    #[serde(default)]
    pub listeners: Vec<DnsListener>,
}
