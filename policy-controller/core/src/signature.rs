use crate::{request::RequestContext, resource::ResourceRef, subject::SignerInfo};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use std::{fmt, sync::Arc};

pub use integrity_policy_controller_k8s_api::policy::SignatureType;

/// A detached signature attesting to a single resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSignature {
    pub sign_type: SignatureType,
    pub message: String,
    pub signature: String,
    pub certificate: Option<String>,
    pub target: ResourceRef,
}

/// Resolves the signature bound to a resource.
#[async_trait::async_trait]
pub trait SignatureStore: Send + Sync {
    /// Returns the most recently stored signature for `resource`, if any.
    async fn lookup(
        &self,
        resource: &ResourceRef,
        ctx: &RequestContext,
    ) -> Result<Option<ResourceSignature>>;
}

/// Verifies a signature and extracts its signer.
#[async_trait::async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        signature: &ResourceSignature,
        ctx: &RequestContext,
    ) -> Result<Verification>;
}

/// The outcome of a completed verification.
///
/// A verification without a signer is a failed verification; `reason` may
/// describe why.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verification {
    pub signer: Option<SignerInfo>,
    pub reason: Option<String>,
}

/// Maps each signature type to its verifier.
#[derive(Clone, Default)]
pub struct Verifiers(HashMap<SignatureType, Arc<dyn Verifier>>);

// === impl Verification ===

impl Verification {
    pub fn verified(signer: SignerInfo) -> Self {
        Self {
            signer: Some(signer),
            reason: None,
        }
    }

    pub fn failed(reason: impl ToString) -> Self {
        Self {
            signer: None,
            reason: Some(reason.to_string()),
        }
    }
}

// === impl Verifiers ===

impl Verifiers {
    pub fn with(mut self, sign_type: SignatureType, verifier: impl Verifier + 'static) -> Self {
        self.0.insert(sign_type, Arc::new(verifier));
        self
    }

    pub fn get(&self, sign_type: SignatureType) -> Option<&Arc<dyn Verifier>> {
        self.0.get(&sign_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = SignatureType> + '_ {
        self.0.keys().copied()
    }
}

impl fmt::Debug for Verifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
