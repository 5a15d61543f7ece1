use anyhow::{ensure, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Carries detached signatures for one or more target resources.
///
/// Each item attests to a single target, described by its `metadata`. The
/// target may live in a different namespace than the signature object.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "policy.integrity.dev",
    version = "v1alpha1",
    kind = "ResourceSignature",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSignatureSpec {
    #[serde(default)]
    pub data: Vec<SignItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignItem {
    #[serde(rename = "type")]
    pub sign_type: SignatureType,

    /// The signed message, typically the base64-encoded target manifest.
    pub message: String,

    pub signature: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    pub metadata: TargetMetadata,
}

/// Identifies the resource a signature item attests to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub kind: String,
    pub name: String,

    /// When unset, the target is assumed to share the signature's namespace.
    /// An empty string refers to a cluster-scoped target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Selects the verifier used for a signature item.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    Pgp,
    X509,
    Sigstore,
}

// === impl ResourceSignatureSpec ===

impl ResourceSignatureSpec {
    /// Checks that every signature item is complete.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.data.is_empty(), "data must contain at least one item");

        for (i, item) in self.data.iter().enumerate() {
            ensure!(!item.message.is_empty(), "data[{i}].message must be set");
            ensure!(!item.signature.is_empty(), "data[{i}].signature must be set");
            ensure!(
                !item.metadata.kind.is_empty(),
                "data[{i}].metadata.kind must be set"
            );
            ensure!(
                !item.metadata.name.is_empty(),
                "data[{i}].metadata.name must be set"
            );
        }

        Ok(())
    }
}

// === impl SignatureType ===

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pgp => "pgp".fmt(f),
            Self::X509 => "x509".fmt(f),
            Self::Sigstore => "sigstore".fmt(f),
        }
    }
}
