use crate::{core::SignPolicyEvalResult, mode::Mode};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    decisions: Family<DecisionLabels, Counter>,
    invalid: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DecisionLabels {
    mode: &'static str,
    decision: &'static str,
    reason: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "decisions",
            "Total number of admission decisions by outcome",
            decisions.clone(),
        );

        let invalid = Counter::default();
        reg.register(
            "invalid_requests",
            "Total number of admission requests that could not be evaluated",
            invalid.clone(),
        );

        Self { decisions, invalid }
    }

    /// Counts the policy's decision. In detect mode a denial is still counted as a denial.
    pub(crate) fn decision(&self, mode: Mode, result: &SignPolicyEvalResult) {
        let mode = mode.as_str();
        let labels = match result.error {
            Some(ref error) => DecisionLabels {
                mode,
                decision: "deny",
                reason: error.kind(),
            },
            None => DecisionLabels {
                mode,
                decision: if result.allow { "allow" } else { "deny" },
                reason: "",
            },
        };
        self.decisions.get_or_create(&labels).inc();
    }

    pub(crate) fn invalid(&self) {
        self.invalid.inc();
    }

    #[cfg(test)]
    pub(crate) fn decisions(
        &self,
        mode: Mode,
        decision: &'static str,
        reason: &'static str,
    ) -> u64 {
        self.decisions
            .get_or_create(&DecisionLabels {
                mode: mode.as_str(),
                decision,
                reason,
            })
            .get()
    }
}
