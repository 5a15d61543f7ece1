use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

use super::SharedIndex;

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();

        let mut rules_encoder = encoder.encode_descriptor(
            "sign_policy_rule_index_size",
            "The number of signer rules in index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, rules) in this.rules_by_namespace() {
            let labels = [("namespace", ns)];
            let rules = ConstGauge::new(saturating_u32(rules));
            let rules_encoder = rules_encoder.encode_family(&labels)?;
            rules.encode(rules_encoder)?;
        }

        let mut signatures_encoder = encoder.encode_descriptor(
            "resource_signature_index_size",
            "The number of resource signatures in index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, signatures) in this.signatures_by_namespace() {
            let labels = [("namespace", ns)];
            let signatures = ConstGauge::new(saturating_u32(signatures));
            let signatures_encoder = signatures_encoder.encode_family(&labels)?;
            signatures.encode(signatures_encoder)?;
        }

        Ok(())
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::saturating_u32;

    #[test]
    fn gauge_values_saturate() {
        assert_eq!(saturating_u32(0), 0);
        assert_eq!(saturating_u32(42), 42);
        assert_eq!(saturating_u32(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(saturating_u32(u32::MAX as usize + 1), u32::MAX);
    }
}
