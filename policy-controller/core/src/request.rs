use crate::resource::ResourceRef;
use anyhow::{anyhow, Error, Result};
use bytes::Bytes;
use integrity_policy_controller_k8s_api::{
    policy::{self, ResourceSignature, SignPolicy},
    Resource,
};
use std::fmt;

/// An admission request under evaluation.
///
/// Contexts are never modified once built; a context evaluated under another
/// namespace is a new value derived with [`RequestContext::with_namespace`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub scope: ResourceScope,
    pub operation: Operation,

    /// The submitted object, serialized as JSON.
    pub raw_object: Bytes,

    pub user_name: String,
    pub user_groups: Vec<String>,
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

// === impl RequestContext ===

impl RequestContext {
    /// Derives a context that differs from `self` only in its namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self.clone()
        }
    }

    /// Returns `group/version`, or just the version for the core group.
    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            api_version: self.group_version(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    pub fn is_kind<T>(&self) -> bool
    where
        T: Resource,
        T::DynamicType: Default,
    {
        policy::is_kind::<T>(&self.group, &self.kind)
    }

    pub fn is_sign_policy_request(&self) -> bool {
        self.is_kind::<SignPolicy>()
    }

    pub fn is_resource_signature_request(&self) -> bool {
        self.is_kind::<ResourceSignature>()
    }
}

// === impl ResourceScope ===

impl ResourceScope {
    pub fn from_namespace(namespace: &str) -> Self {
        if namespace.is_empty() {
            Self::Cluster
        } else {
            Self::Namespaced
        }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespaced => "Namespaced".fmt(f),
            Self::Cluster => "Cluster".fmt(f),
        }
    }
}

// === impl Operation ===

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            s => Err(anyhow!("unsupported operation: {s:?}")),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => "CREATE".fmt(f),
            Self::Update => "UPDATE".fmt(f),
            Self::Delete => "DELETE".fmt(f),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn mk_context(kind: &str, namespace: &str, name: &str) -> RequestContext {
        RequestContext {
            group: String::new(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            scope: ResourceScope::from_namespace(namespace),
            operation: Operation::Create,
            raw_object: Bytes::new(),
            user_name: "alice".to_string(),
            user_groups: vec!["system:authenticated".to_string()],
            dry_run: false,
        }
    }

    #[test]
    fn with_namespace_leaves_original_untouched() {
        let ctx = mk_context("ConfigMap", "sig-ns", "cm");
        let derived = ctx.with_namespace("prod");
        assert_eq!(ctx.namespace, "sig-ns");
        assert_eq!(derived.namespace, "prod");
        assert_eq!(derived.with_namespace("sig-ns"), ctx);
    }

    #[test]
    fn group_version() {
        let mut ctx = mk_context("ConfigMap", "prod", "cm");
        assert_eq!(ctx.group_version(), "v1");
        ctx.group = "apps".to_string();
        assert_eq!(ctx.group_version(), "apps/v1");
        assert_eq!(ctx.resource_ref().api_version, "apps/v1");
    }

    #[test]
    fn recognizes_policy_kinds() {
        let mut ctx = mk_context("SignPolicy", "ie", "policy");
        assert!(!ctx.is_sign_policy_request());
        ctx.group = "policy.integrity.dev".to_string();
        ctx.version = "v1alpha1".to_string();
        assert!(ctx.is_sign_policy_request());
        assert!(!ctx.is_resource_signature_request());
    }

    #[test]
    fn parses_operations() {
        assert_eq!("CREATE".parse::<Operation>().unwrap(), Operation::Create);
        assert_eq!(Operation::Update.to_string(), "UPDATE");
        assert!("CONNECT".parse::<Operation>().is_err());
    }
}
