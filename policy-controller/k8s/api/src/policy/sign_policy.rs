use anyhow::{bail, ensure, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Describes which signers may sign which resources.
///
/// Signer patterns are evaluated in order; the first pattern whose request
/// and subject both match a signed resource decides the outcome.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "policy.integrity.dev",
    version = "v1alpha1",
    kind = "SignPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SignPolicySpec {
    #[serde(default)]
    pub signers: Vec<SignerMatchPattern>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignerMatchPattern {
    #[serde(default, rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub request: RequestMatchPattern,
    pub condition: SubjectCondition,
}

/// The decision applied when a signer pattern matches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum RuleType {
    #[default]
    Allow,
    Deny,
}

/// Selects requests by resource coordinates. Empty fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatchPattern {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCondition {
    pub name: String,
    #[serde(default)]
    pub subject: SubjectMatchPattern,
}

/// Selects signers by certificate subject attributes. Empty fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMatchPattern {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organizational_unit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locality: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub province: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub street_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub common_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
}

// === impl SignPolicySpec ===

impl SignPolicySpec {
    /// Checks that a policy placed in `namespace` is well-formed.
    ///
    /// Policies are only honored in the enforcer's own namespace or in the
    /// dedicated policy namespace.
    pub fn validate(&self, namespace: &str, enforcer_ns: &str, policy_ns: &str) -> Result<()> {
        if namespace != enforcer_ns && namespace != policy_ns {
            bail!(
                "SignPolicy must be created in namespace '{enforcer_ns}' or '{policy_ns}', not '{namespace}'"
            );
        }

        let mut names = HashSet::with_capacity(self.signers.len());
        for (i, signer) in self.signers.iter().enumerate() {
            ensure!(
                signer.rule_type == RuleType::Allow,
                "signers[{i}].type {} is not supported",
                signer.rule_type
            );
            let name = &signer.condition.name;
            ensure!(!name.is_empty(), "signers[{i}].condition.name must be set");
            ensure!(
                names.insert(name.as_str()),
                "signers[{i}].condition.name '{name}' is not unique"
            );
            ensure!(
                !signer.condition.subject.is_empty(),
                "signers[{i}].condition.subject must constrain at least one attribute"
            );
        }

        Ok(())
    }
}

// === impl SubjectMatchPattern ===

impl SubjectMatchPattern {
    fn fields(&self) -> [(&'static str, &str); 11] {
        [
            ("email", self.email.as_str()),
            ("uid", self.uid.as_str()),
            ("country", self.country.as_str()),
            ("organization", self.organization.as_str()),
            ("organizationalUnit", self.organizational_unit.as_str()),
            ("locality", self.locality.as_str()),
            ("province", self.province.as_str()),
            ("streetAddress", self.street_address.as_str()),
            ("postalCode", self.postal_code.as_str()),
            ("commonName", self.common_name.as_str()),
            ("serialNumber", self.serial_number.as_str()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_empty())
    }
}

impl fmt::Display for SubjectMatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.fields().iter().filter(|(_, v)| !v.is_empty()) {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Display for RequestMatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_any = |s: &str| if s.is_empty() { "*".to_string() } else { s.to_string() };
        write!(
            f,
            "apiVersion={},kind={},namespace={},name={}",
            or_any(&self.api_version),
            or_any(&self.kind),
            or_any(&self.namespace),
            or_any(&self.name),
        )
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => "Allow".fmt(f),
            Self::Deny => "Deny".fmt(f),
        }
    }
}
