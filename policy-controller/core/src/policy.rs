use crate::{
    request::RequestContext,
    rule::{Rule, RuleList},
};
use integrity_policy_controller_k8s_api::policy::SignerMatchPattern;
use std::fmt;

/// Identifies the policy object a rule was declared in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyRef {
    pub namespace: String,
    pub name: String,
}

/// A rule together with the policy that declared it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerPattern {
    pub policy: PolicyRef,
    pub rule: Rule,
}

/// An immutable, ordered snapshot of every active signer pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignPolicy {
    patterns: Vec<SignerPattern>,
}

// === impl PolicyRef ===

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl SignerPattern ===

impl SignerPattern {
    pub fn from_resource(policy: PolicyRef, pattern: SignerMatchPattern) -> Self {
        let SignerMatchPattern { request, condition, .. } = pattern;
        Self {
            policy,
            rule: Rule {
                name: condition.name,
                resource: request.into(),
                subject: condition.subject.into(),
            },
        }
    }
}

impl fmt::Display for SignerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignPolicy {}: {}", self.policy, self.rule)
    }
}

// === impl SignPolicy ===

impl SignPolicy {
    pub fn new(patterns: Vec<SignerPattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[SignerPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Builds the rule list for a request from the patterns whose resource
    /// pattern covers it, preserving their order.
    pub fn rules_for(&self, ctx: &RequestContext) -> RuleList {
        self.patterns
            .iter()
            .filter(|p| p.rule.matches_resource(ctx))
            .map(|p| p.rule.clone())
            .collect()
    }

    /// Finds the pattern that declared `rule`.
    pub fn find(&self, rule: &Rule) -> Option<&SignerPattern> {
        self.patterns.iter().find(|p| p.rule == *rule)
    }

    /// Describes the pattern that declared `rule`, for audit logs.
    pub fn describe(&self, rule: &Rule) -> Option<String> {
        self.find(rule).map(ToString::to_string)
    }
}

impl FromIterator<SignerPattern> for SignPolicy {
    fn from_iter<I: IntoIterator<Item = SignerPattern>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::mk_context;
    use integrity_policy_controller_k8s_api::policy::{
        RequestMatchPattern, SubjectCondition, SubjectMatchPattern,
    };

    fn mk_pattern(policy: &str, name: &str, kind: &str, namespace: &str) -> SignerPattern {
        SignerPattern::from_resource(
            PolicyRef {
                namespace: "ie-policy".to_string(),
                name: policy.to_string(),
            },
            SignerMatchPattern {
                request: RequestMatchPattern {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    ..Default::default()
                },
                condition: SubjectCondition {
                    name: name.to_string(),
                    subject: SubjectMatchPattern {
                        email: "bob@co.com".to_string(),
                        ..Default::default()
                    },
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn rules_are_filtered_by_resource_in_order() {
        let policy: SignPolicy = vec![
            mk_pattern("a", "prod-cms", "ConfigMap", "prod"),
            mk_pattern("a", "dev-cms", "ConfigMap", "dev"),
            mk_pattern("b", "any-prod", "", "prod"),
        ]
        .into_iter()
        .collect();

        let rules = policy.rules_for(&mk_context("ConfigMap", "prod", "app-config"));
        let names = rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["prod-cms", "any-prod"]);

        assert!(policy
            .rules_for(&mk_context("Secret", "staging", "creds"))
            .is_empty());
    }

    #[test]
    fn describes_originating_policy() {
        let policy = SignPolicy::new(vec![
            mk_pattern("a", "prod-cms", "ConfigMap", "prod"),
            mk_pattern("b", "any-prod", "", "prod"),
        ]);
        let rule = policy.patterns()[1].rule.clone();
        assert_eq!(
            policy.describe(&rule).unwrap(),
            "SignPolicy ie-policy/b: any-prod (resource: apiVersion=*,kind=*,namespace=prod,name=*; subject: email=bob@co.com)"
        );

        let unknown = Rule {
            name: "unknown".to_string(),
            ..rule
        };
        assert!(policy.describe(&unknown).is_none());
    }
}
