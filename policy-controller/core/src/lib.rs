#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod evaluator;
pub mod pattern;
pub mod policy;
pub mod request;
pub mod resource;
pub mod rule;
pub mod signature;
pub mod subject;

pub use self::{
    evaluator::{eval_context, CheckError, EnforcerConfig, Evaluator, SignPolicyEvalResult},
    policy::{PolicyRef, SignPolicy, SignerPattern},
    request::{Operation, RequestContext, ResourceScope},
    resource::{match_resource, ResourcePattern, ResourceRef},
    rule::{EvalResult, Rule, RuleError, RuleList},
    signature::{
        ResourceSignature, SignatureStore, SignatureType, Verification, Verifier, Verifiers,
    },
    subject::{match_subject, SignerInfo, SubjectPattern},
};
