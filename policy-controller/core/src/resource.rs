use crate::pattern;
use integrity_policy_controller_k8s_api::policy::RequestMatchPattern;
use std::fmt;

/// Constrains request coordinates. Each field is a glob pattern; empty fields
/// are unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourcePattern {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// Identifies a resource by its coordinates.
///
/// Cluster-scoped resources have an empty namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// Checks request coordinates against a resource pattern.
pub fn match_resource(
    pattern: &ResourcePattern,
    api_version: &str,
    kind: &str,
    name: &str,
    namespace: &str,
) -> bool {
    pattern::is_match(&pattern.api_version, api_version)
        && pattern::is_match(&pattern.kind, kind)
        && pattern::is_match(&pattern.name, name)
        && pattern::is_match(&pattern.namespace, namespace)
}

// === impl ResourcePattern ===

impl ResourcePattern {
    pub fn matches(&self, api_version: &str, kind: &str, name: &str, namespace: &str) -> bool {
        match_resource(self, api_version, kind, name, namespace)
    }
}

impl From<RequestMatchPattern> for ResourcePattern {
    fn from(p: RequestMatchPattern) -> Self {
        Self {
            api_version: p.api_version,
            kind: p.kind,
            name: p.name,
            namespace: p.namespace,
        }
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        RequestMatchPattern {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
        .fmt(f)
    }
}

// === impl ResourceRef ===

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{} {}", self.api_version, self.kind, self.name)
        } else {
            write!(
                f,
                "{}/{} {}/{}",
                self.api_version, self.kind, self.namespace, self.name
            )
        }
    }
}
