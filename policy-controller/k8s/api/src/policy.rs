pub mod resource_signature;
pub mod sign_policy;

pub use self::{
    resource_signature::{
        ResourceSignature, ResourceSignatureSpec, SignItem, SignatureType, TargetMetadata,
    },
    sign_policy::{
        RequestMatchPattern, RuleType, SignPolicy, SignPolicySpec, SignerMatchPattern,
        SubjectCondition, SubjectMatchPattern,
    },
};

/// Checks whether a group/kind pair names the given resource type.
pub fn is_kind<T>(group: &str, kind: &str) -> bool
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    group.eq_ignore_ascii_case(&T::group(&dt)) && kind.eq_ignore_ascii_case(&T::kind(&dt))
}
