use crate::{
    policy::SignPolicy,
    request::RequestContext,
    rule::RuleError,
    signature::{SignatureStore, Verification, Verifiers},
    subject::SignerInfo,
};
use anyhow::{anyhow, ensure, Result};
use integrity_policy_controller_k8s_api::{
    policy::{ResourceSignature, SignPolicy as SignPolicyResource},
    Resource,
};
use std::{borrow::Cow, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};


/// Namespaces the enforcer honors policy objects in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnforcerConfig {
    pub enforcer_namespace: String,
    pub policy_namespace: String,
}

/// Decides whether a signed request is admitted.
///
/// An evaluator holds a fixed policy snapshot; requests evaluated by it never
/// observe policy changes made after it was built.
#[derive(Clone)]
pub struct Evaluator {
    config: Arc<EnforcerConfig>,
    policy: Arc<SignPolicy>,
    store: Arc<dyn SignatureStore>,
    verifiers: Verifiers,
}

/// The admission decision for one request.
#[derive(Debug, Default)]
pub struct SignPolicyEvalResult {
    pub signer: Option<SignerInfo>,

    /// The name of the rule that admitted the request.
    pub signer_name: String,

    pub allow: bool,
    pub checked: bool,

    /// Describes the policy that declared the matched rule.
    pub matched_policy: String,
    pub error: Option<CheckError>,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Schema Error for {kind}; {reason}")]
    Schema { kind: String, reason: String },

    #[error("No signature found")]
    SignatureNotFound,

    #[error("Error during signature verification")]
    Verification(#[source] anyhow::Error),

    #[error("Failed to verify signature; {0}")]
    Unverified(String),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("{0:#}")]
    Fault(#[source] anyhow::Error),
}

// === impl Evaluator ===

impl Evaluator {
    pub fn new(
        config: Arc<EnforcerConfig>,
        policy: Arc<SignPolicy>,
        store: Arc<dyn SignatureStore>,
        verifiers: Verifiers,
    ) -> Self {
        Self {
            config,
            policy,
            store,
            verifiers,
        }
    }

    pub fn policy(&self) -> &Arc<SignPolicy> {
        &self.policy
    }

    /// Evaluates a request against the signing policy.
    ///
    /// Denials are returned as results. An error is returned only when the
    /// request context itself is unusable.
    pub async fn evaluate(&self, ctx: &RequestContext) -> Result<SignPolicyEvalResult> {
        ensure!(!ctx.kind.is_empty(), "request is missing a kind");

        if let Err(error) = self.validate(ctx) {
            debug!(kind = %ctx.kind, %error, "Invalid policy resource");
            return Ok(SignPolicyEvalResult::deny(error));
        }

        let reference = ctx.resource_ref();
        let signature = match self.store.lookup(&reference, ctx).await {
            Ok(Some(signature)) => signature,
            Ok(None) => {
                debug!(resource = %reference, "No signature found");
                return Ok(SignPolicyEvalResult::deny(CheckError::SignatureNotFound));
            }
            Err(error) => {
                warn!(resource = %reference, %error, "Signature lookup failed");
                return Ok(SignPolicyEvalResult::deny(CheckError::Fault(
                    error.context("failed to look up signature"),
                )));
            }
        };

        let verification = match self.verifiers.get(signature.sign_type) {
            Some(verifier) => verifier.verify(&signature, ctx).await,
            None => Err(anyhow!(
                "no verifier registered for signature type {}",
                signature.sign_type
            )),
        };
        let signer = match verification {
            Ok(Verification {
                signer: Some(signer),
                ..
            }) => signer,
            Ok(Verification { signer: None, reason }) => {
                debug!(resource = %reference, ?reason, "Signature not verified");
                return Ok(SignPolicyEvalResult::deny(CheckError::Unverified(
                    reason.unwrap_or_default(),
                )));
            }
            Err(error) => {
                debug!(resource = %reference, error = %format_args!("{error:#}"), "Signature verification failed");
                return Ok(SignPolicyEvalResult::deny(CheckError::Verification(error)));
            }
        };
        debug!(resource = %reference, %signer, "Signature verified");

        let ctx = eval_context(ctx);
        let rules = self.policy.rules_for(&ctx);
        debug!(rules = rules.len(), namespace = %ctx.namespace, "Evaluating signer rules");
        let result = rules.evaluate(&ctx, Some(&signer));

        if let Some(error) = result.error {
            return Ok(SignPolicyEvalResult {
                signer: Some(signer),
                signer_name: result.signer_name,
                checked: true,
                error: Some(error.into()),
                ..Default::default()
            });
        }

        let matched_policy = result
            .matched_rule
            .as_ref()
            .and_then(|rule| self.policy.describe(rule))
            .unwrap_or_default();
        Ok(SignPolicyEvalResult {
            signer: result.signer,
            signer_name: result.signer_name,
            allow: result.allow,
            checked: result.checked,
            matched_policy,
            error: None,
        })
    }

    /// Rejects malformed policy and signature objects before they are stored.
    fn validate(&self, ctx: &RequestContext) -> Result<(), CheckError> {
        if ctx.is_sign_policy_request() {
            let kind = SignPolicyResource::kind(&()).to_string();
            let policy = serde_json::from_slice::<SignPolicyResource>(&ctx.raw_object).map_err(
                |error| CheckError::Schema {
                    kind: kind.clone(),
                    reason: error.to_string(),
                },
            )?;
            policy
                .spec
                .validate(
                    &ctx.namespace,
                    &self.config.enforcer_namespace,
                    &self.config.policy_namespace,
                )
                .map_err(|error| CheckError::Schema {
                    kind,
                    reason: format!("{error:#}"),
                })?;
        }

        if ctx.is_resource_signature_request() {
            let kind = ResourceSignature::kind(&()).to_string();
            let rsig = serde_json::from_slice::<ResourceSignature>(&ctx.raw_object).map_err(
                |error| CheckError::Schema {
                    kind: kind.clone(),
                    reason: error.to_string(),
                },
            )?;
            rsig.spec.validate().map_err(|error| CheckError::Schema {
                kind,
                reason: format!("{error:#}"),
            })?;
        }

        Ok(())
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("policy", &self.policy.patterns().len())
            .field("verifiers", &self.verifiers)
            .finish_non_exhaustive()
    }
}

/// Returns the context signer rules are evaluated against.
///
/// A `ResourceSignature` attests to a target that may live in another
/// namespace, so its rules are matched against the namespace of its first
/// target. Any other request, or a signature without a usable target
/// namespace, is evaluated as submitted.
pub fn eval_context(ctx: &RequestContext) -> Cow<'_, RequestContext> {
    if !ctx.is_resource_signature_request() {
        return Cow::Borrowed(ctx);
    }

    let rsig = match serde_json::from_slice::<ResourceSignature>(&ctx.raw_object) {
        Ok(rsig) => rsig,
        Err(error) => {
            warn!(%error, "Failed to parse ResourceSignature; keeping request namespace");
            return Cow::Borrowed(ctx);
        }
    };

    match rsig
        .spec
        .data
        .first()
        .and_then(|item| item.metadata.namespace.as_deref())
    {
        Some(ns) if !ns.is_empty() && ns != ctx.namespace => Cow::Owned(ctx.with_namespace(ns)),
        _ => Cow::Borrowed(ctx),
    }
}

// === impl SignPolicyEvalResult ===

impl SignPolicyEvalResult {
    pub fn deny(error: CheckError) -> Self {
        Self {
            checked: true,
            error: Some(error),
            ..Default::default()
        }
    }

    /// The human-readable reason for a denial.
    pub fn reason(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

// === impl CheckError ===

impl CheckError {
    /// A stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema",
            Self::SignatureNotFound => "no_signature",
            Self::Verification(_) => "verification",
            Self::Unverified(_) => "unverified",
            Self::Rule(RuleError::NoMatch { .. }) => "no_match",
            Self::Fault(_) => "fault",
        }
    }
}
