use crate::{Index, SharedIndex};
use ahash::AHashMap as HashMap;
use anyhow::{Context, Result};
use integrity_policy_controller_core::{
    RequestContext, ResourceRef, ResourceSignature, SignatureStore,
};
use integrity_policy_controller_k8s_api::{self as k8s, policy::SignItem, ResourceExt};

/// Serves signature lookups for the admission server from the shared index.
#[derive(Clone, Debug)]
pub struct SignatureLookup(SharedIndex);

/// Indexes signatures by the resource they attest to.
#[derive(Debug, Default)]
pub(crate) struct SignatureIndex {
    by_target: HashMap<TargetKey, Vec<Entry>>,

    /// The targets of each `ResourceSignature` object, so that an object's signatures can be
    /// removed when it is updated or deleted.
    by_object: HashMap<ObjectRef, Vec<TargetKey>>,

    /// Incremented on every apply. Higher values were applied more recently.
    seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TargetKey {
    kind: String,
    namespace: String,
    name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ObjectRef {
    namespace: String,
    name: String,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    object: ObjectRef,
    signature: ResourceSignature,
}

// === impl SignatureLookup ===

impl SignatureLookup {
    pub fn new(index: SharedIndex) -> Self {
        Self(index)
    }
}

#[async_trait::async_trait]
impl SignatureStore for SignatureLookup {
    async fn lookup(
        &self,
        resource: &ResourceRef,
        ctx: &RequestContext,
    ) -> Result<Option<ResourceSignature>> {
        // A signature object carries its own signature: the first item attests to the object
        // being submitted.
        if ctx.is_resource_signature_request() {
            let rsig = serde_json::from_slice::<k8s::ResourceSignature>(&ctx.raw_object)
                .context("failed to parse ResourceSignature")?;
            return Ok(rsig
                .spec
                .data
                .into_iter()
                .next()
                .map(|item| signature_for(item, &ctx.namespace)));
        }

        Ok(self.0.read().signatures.get(resource))
    }
}

// === impl SignatureIndex ===

impl SignatureIndex {
    /// Returns the most recently applied signature for `resource`.
    ///
    /// Signatures that name an API version only apply to that version.
    fn get(&self, resource: &ResourceRef) -> Option<ResourceSignature> {
        let key = TargetKey {
            kind: resource.kind.clone(),
            namespace: resource.namespace.clone(),
            name: resource.name.clone(),
        };
        self.by_target
            .get(&key)?
            .iter()
            .filter(|e| {
                let api_version = &e.signature.target.api_version;
                api_version.is_empty() || *api_version == resource.api_version
            })
            .max_by_key(|e| e.seq)
            .map(|e| e.signature.clone())
    }

    fn insert(&mut self, object: ObjectRef, signatures: Vec<ResourceSignature>) {
        self.remove(&object);

        self.seq += 1;
        let seq = self.seq;
        let mut targets = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let key = TargetKey {
                kind: signature.target.kind.clone(),
                namespace: signature.target.namespace.clone(),
                name: signature.target.name.clone(),
            };
            self.by_target.entry(key.clone()).or_default().push(Entry {
                seq,
                object: object.clone(),
                signature,
            });
            targets.push(key);
        }
        self.by_object.insert(object, targets);
    }

    fn remove(&mut self, object: &ObjectRef) -> bool {
        let Some(targets) = self.by_object.remove(object) else {
            return false;
        };
        for key in targets {
            if let Some(entries) = self.by_target.get_mut(&key) {
                entries.retain(|e| e.object != *object);
                if entries.is_empty() {
                    self.by_target.remove(&key);
                }
            }
        }
        true
    }

    pub(crate) fn count_by_namespace(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for (key, entries) in &self.by_target {
            *counts.entry(key.namespace.as_str()).or_default() += entries.len();
        }
        counts
    }
}

fn signature_for(item: SignItem, object_ns: &str) -> ResourceSignature {
    let SignItem {
        sign_type,
        message,
        signature,
        certificate,
        metadata,
    } = item;
    ResourceSignature {
        sign_type,
        message,
        signature,
        certificate,
        target: ResourceRef {
            api_version: metadata.api_version,
            kind: metadata.kind,
            name: metadata.name,
            namespace: metadata.namespace.unwrap_or_else(|| object_ns.to_string()),
        },
    }
}

impl kubert::index::IndexNamespacedResource<k8s::ResourceSignature> for Index {
    fn apply(&mut self, rsig: k8s::ResourceSignature) {
        let object = ObjectRef {
            namespace: rsig.namespace().unwrap_or_default(),
            name: rsig.name_unchecked(),
        };

        if let Err(error) = rsig.spec.validate() {
            tracing::warn!(ns = %object.namespace, name = %object.name, error = %format_args!("{error:#}"), "Ignoring invalid ResourceSignature");
            self.signatures.remove(&object);
            return;
        }

        let signatures = rsig
            .spec
            .data
            .into_iter()
            .map(|item| signature_for(item, &object.namespace))
            .collect::<Vec<_>>();
        tracing::debug!(ns = %object.namespace, name = %object.name, signatures = signatures.len(), "Indexed ResourceSignature");
        self.signatures.insert(object, signatures);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let object = ObjectRef { namespace, name };
        if self.signatures.remove(&object) {
            tracing::debug!(ns = %object.namespace, name = %object.name, "Removed ResourceSignature");
        }
    }
}
