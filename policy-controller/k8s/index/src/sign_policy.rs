use crate::Index;
use integrity_policy_controller_core::{PolicyRef, SignerPattern};
use integrity_policy_controller_k8s_api::{self as k8s, ResourceExt};

impl kubert::index::IndexNamespacedResource<k8s::SignPolicy> for Index {
    fn apply(&mut self, policy: k8s::SignPolicy) {
        let namespace = policy.namespace().unwrap_or_default();
        let name = policy.name_unchecked();
        let policy_ref = PolicyRef { namespace, name };

        if !self.is_policy_namespace(&policy_ref.namespace) {
            tracing::warn!(policy = %policy_ref, "Ignoring SignPolicy outside of the policy namespaces");
            return;
        }

        if let Err(error) = policy.spec.validate(
            &policy_ref.namespace,
            &self.config.enforcer_namespace,
            &self.config.policy_namespace,
        ) {
            tracing::warn!(policy = %policy_ref, error = %format_args!("{error:#}"), "Ignoring invalid SignPolicy");
            if self.policies.remove(&policy_ref).is_some() {
                self.rebuild_snapshot();
            }
            return;
        }

        let patterns = policy
            .spec
            .signers
            .into_iter()
            .map(|signer| SignerPattern::from_resource(policy_ref.clone(), signer))
            .collect::<Vec<_>>();
        tracing::info!(policy = %policy_ref, patterns = patterns.len(), "Indexed SignPolicy");

        if self.policies.get(&policy_ref) == Some(&patterns) {
            return;
        }
        self.policies.insert(policy_ref, patterns);
        self.rebuild_snapshot();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let policy_ref = PolicyRef { namespace, name };
        if self.policies.remove(&policy_ref).is_some() {
            tracing::info!(policy = %policy_ref, "Removed SignPolicy");
            self.rebuild_snapshot();
        }
    }
}
