use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter, UpDownCounter};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

/// Counters for the data plane's ambient telemetry surface. These are
/// structured logs' numeric companions — no HTTP endpoint serves them here;
/// the CLI or an embedder scrapes `init_metrics`'s returned [`Registry`]
/// however it sees fit.
#[derive(Clone)]
pub struct Metrics {
    pub packets_dropped_firewall_total: Counter<u64>,
    pub packets_dropped_malformed_total: Counter<u64>,

    pub flows_classified_total: Counter<u64>,
    pub flow_classification_misses_total: Counter<u64>,

    pub nat_mappings_active: UpDownCounter<i64>,
    pub nat_mappings_created_total: Counter<u64>,
    pub nat_port_probe_exhausted_total: Counter<u64>,
    pub nat_conntrack_expirations_total: Counter<u64>,

    pub pinholes_opened_total: Counter<u64>,
    pub pinholes_expired_total: Counter<u64>,

    pub pppoe_oversize_notices_total: Counter<u64>,
    pub mss_clamped_total: Counter<u64>,

    pub neighbour_updates_total: Counter<u64>,

    pub errors_total: Counter<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            packets_dropped_firewall_total: meter
                .u64_counter("flowgate_packets_dropped_firewall_total")
                .with_description("Total packets dropped by the firewall processor")
                .build(),
            packets_dropped_malformed_total: meter
                .u64_counter("flowgate_packets_dropped_malformed_total")
                .with_description("Total packets dropped for failing header validation")
                .build(),

            flows_classified_total: meter
                .u64_counter("flowgate_flows_classified_total")
                .with_description("Total packets matched to a flow by the flow classifier")
                .build(),
            flow_classification_misses_total: meter
                .u64_counter("flowgate_flow_classification_misses_total")
                .with_description("Total packets with no matching flow entry")
                .build(),

            nat_mappings_active: meter
                .i64_up_down_counter("flowgate_nat_mappings_active")
                .with_description("Number of active NAT mapping pairs")
                .build(),
            nat_mappings_created_total: meter
                .u64_counter("flowgate_nat_mappings_created_total")
                .with_description("Total NAT mappings allocated")
                .build(),
            nat_port_probe_exhausted_total: meter
                .u64_counter("flowgate_nat_port_probe_exhausted_total")
                .with_description("Total NAT allocations that exhausted the bounded port probe")
                .build(),
            nat_conntrack_expirations_total: meter
                .u64_counter("flowgate_nat_conntrack_expirations_total")
                .with_description("Total conntrack entries reaped by the userspace sweep")
                .build(),

            pinholes_opened_total: meter
                .u64_counter("flowgate_pinholes_opened_total")
                .with_description("Total firewall pinholes opened by outbound traffic")
                .build(),
            pinholes_expired_total: meter
                .u64_counter("flowgate_pinholes_expired_total")
                .with_description("Total firewall pinholes reaped after their deadline")
                .build(),

            pppoe_oversize_notices_total: meter
                .u64_counter("flowgate_pppoe_oversize_notices_total")
                .with_description("Total oversize-packet notices raised by the PPPoE adapter")
                .build(),
            mss_clamped_total: meter
                .u64_counter("flowgate_mss_clamped_total")
                .with_description("Total TCP SYN segments with a clamped MSS option")
                .build(),

            neighbour_updates_total: meter
                .u64_counter("flowgate_neighbour_updates_total")
                .with_description("Total neighbour-table entries observed by the snooper")
                .build(),

            errors_total: meter
                .u64_counter("flowgate_errors_total")
                .with_description("Total control-plane errors")
                .build(),
        }
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter().with_registry(registry.clone()).build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("flowgate");
    let metrics = Arc::new(Metrics::new(meter));

    Ok((metrics, registry))
}
