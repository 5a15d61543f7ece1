//! Integrity Policy Controller Index
//!
//! The index watches the cluster resources that drive admission decisions:
//!
//! - Each `SignPolicy` in the enforcer or policy namespace contributes an ordered list of signer
//!   patterns. Whenever a policy changes, the patterns of every active policy are flattened into a
//!   new immutable [`SignPolicy`] snapshot, ordered by policy namespace, then name, then
//!   declaration order.
//! - Each `ResourceSignature` carries signatures for one or more target resources. Signatures are
//!   indexed by their target so that the admission server can find the most recently applied
//!   signature for a resource.
//!
//! ```text
//! [ SignPolicy ] -> [ SignerPattern ] -> snapshot
//! [ ResourceSignature ] -> [ SignItem ] -> target
//! ```
//!
//! Evaluators hold a reference to the snapshot that was current when they were built, so a policy
//! change never affects a request that is already being evaluated.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod metrics;
mod resource_signature;
mod sign_policy;

#[cfg(test)]
mod tests;

pub use self::resource_signature::SignatureLookup;
use self::resource_signature::SignatureIndex;
use ahash::AHashMap as HashMap;
use integrity_policy_controller_core::{EnforcerConfig, PolicyRef, SignPolicy, SignerPattern};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state. Owned and updated by the tasks that process watch events; read by
/// the admission server.
#[derive(Debug)]
pub struct Index {
    config: Arc<EnforcerConfig>,

    /// Signer patterns for each active policy, in declaration order.
    policies: BTreeMap<PolicyRef, Vec<SignerPattern>>,

    /// The flattened view of `policies`, rebuilt on every policy change.
    snapshot: Arc<SignPolicy>,

    signatures: SignatureIndex,
}

// === impl Index ===

impl Index {
    pub fn new(config: Arc<EnforcerConfig>) -> Self {
        Self {
            config,
            policies: BTreeMap::new(),
            snapshot: Default::default(),
            signatures: SignatureIndex::default(),
        }
    }

    pub fn shared(config: Arc<EnforcerConfig>) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(config)))
    }

    pub fn config(&self) -> &Arc<EnforcerConfig> {
        &self.config
    }

    /// Returns the current policy snapshot.
    pub fn policy(&self) -> Arc<SignPolicy> {
        self.snapshot.clone()
    }

    /// Returns the number of signer patterns indexed for each policy namespace.
    pub fn rules_by_namespace(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for (policy, patterns) in &self.policies {
            *counts.entry(policy.namespace.as_str()).or_default() += patterns.len();
        }
        counts
    }

    /// Returns the number of signatures indexed for each target namespace.
    pub fn signatures_by_namespace(&self) -> HashMap<&str, usize> {
        self.signatures.count_by_namespace()
    }

    fn is_policy_namespace(&self, ns: &str) -> bool {
        ns == self.config.enforcer_namespace || ns == self.config.policy_namespace
    }

    fn rebuild_snapshot(&mut self) {
        let snapshot = self
            .policies
            .values()
            .flat_map(|patterns| patterns.iter().cloned())
            .collect::<SignPolicy>();
        tracing::debug!(patterns = snapshot.patterns().len(), "Updated policy snapshot");
        self.snapshot = Arc::new(snapshot);
    }
}
