use super::*;
use bytes::Bytes;
use integrity_policy_controller_core::{
    Operation, RequestContext, ResourceRef, ResourceScope, ResourceSignature, SignatureStore,
    SignatureType,
};
use integrity_policy_controller_k8s_api::{
    self as k8s,
    policy::{
        RequestMatchPattern, ResourceSignatureSpec, SignItem, SignPolicySpec, SignerMatchPattern,
        SubjectCondition, SubjectMatchPattern, TargetMetadata,
    },
};
use kubert::index::IndexNamespacedResource;
use maplit::*;

const ENFORCER_NS: &str = "integrity-enforcer";
const POLICY_NS: &str = "integrity-enforcer-policy";

struct TestConfig {
    index: SharedIndex,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl Default for TestConfig {
    fn default() -> Self {
        let _tracing = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        );
        let config = Arc::new(EnforcerConfig {
            enforcer_namespace: ENFORCER_NS.to_string(),
            policy_namespace: POLICY_NS.to_string(),
        });
        Self {
            index: Index::shared(config),
            _tracing,
        }
    }
}

impl TestConfig {
    fn apply<T>(&self, resource: T)
    where
        Index: IndexNamespacedResource<T>,
    {
        self.index.write().apply(resource);
    }

    fn delete<T>(&self, ns: &str, name: &str)
    where
        Index: IndexNamespacedResource<T>,
    {
        <Index as IndexNamespacedResource<T>>::delete(
            &mut self.index.write(),
            ns.to_string(),
            name.to_string(),
        );
    }

    fn rule_names(&self) -> Vec<String> {
        self.index
            .read()
            .policy()
            .patterns()
            .iter()
            .map(|p| p.rule.name.clone())
            .collect()
    }

    async fn lookup(&self, resource: &ResourceRef) -> Option<ResourceSignature> {
        let ctx = mk_context(resource);
        SignatureLookup::new(self.index.clone())
            .lookup(resource, &ctx)
            .await
            .expect("lookup must succeed")
    }
}

fn mk_policy(
    ns: &str,
    name: &str,
    rules: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> k8s::SignPolicy {
    k8s::SignPolicy {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: SignPolicySpec {
            signers: rules
                .into_iter()
                .map(|(name, email)| SignerMatchPattern {
                    request: RequestMatchPattern {
                        kind: "ConfigMap".to_string(),
                        ..Default::default()
                    },
                    condition: SubjectCondition {
                        name: name.to_string(),
                        subject: SubjectMatchPattern {
                            email: email.to_string(),
                            ..Default::default()
                        },
                    },
                    ..Default::default()
                })
                .collect(),
        },
    }
}

fn mk_item(kind: &str, name: &str, namespace: Option<&str>, message: &str) -> SignItem {
    SignItem {
        sign_type: SignatureType::Pgp,
        message: message.to_string(),
        signature: "c2ln".to_string(),
        certificate: None,
        metadata: TargetMetadata {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(ToString::to_string),
        },
    }
}

fn mk_rsig(ns: &str, name: &str, data: Vec<SignItem>) -> k8s::ResourceSignature {
    k8s::ResourceSignature {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: ResourceSignatureSpec { data },
    }
}

fn configmap(ns: &str, name: &str) -> ResourceRef {
    ResourceRef {
        api_version: "v1".to_string(),
        kind: "ConfigMap".to_string(),
        name: name.to_string(),
        namespace: ns.to_string(),
    }
}

fn mk_context(resource: &ResourceRef) -> RequestContext {
    RequestContext {
        group: String::new(),
        version: resource.api_version.clone(),
        kind: resource.kind.clone(),
        name: resource.name.clone(),
        namespace: resource.namespace.clone(),
        scope: ResourceScope::from_namespace(&resource.namespace),
        operation: Operation::Create,
        raw_object: Bytes::new(),
        user_name: "alice".to_string(),
        user_groups: vec![],
        dry_run: false,
    }
}

#[test]
fn snapshot_orders_policies_by_namespace_and_name() {
    let test = TestConfig::default();
    test.apply(mk_policy(POLICY_NS, "b", [("b-0", "*"), ("b-1", "*")]));
    test.apply(mk_policy(POLICY_NS, "a", [("a-0", "*")]));
    test.apply(mk_policy(ENFORCER_NS, "z", [("z-0", "*")]));
    assert_eq!(test.rule_names(), vec!["z-0", "a-0", "b-0", "b-1"]);

    test.delete::<k8s::SignPolicy>(POLICY_NS, "a");
    assert_eq!(test.rule_names(), vec!["z-0", "b-0", "b-1"]);

    test.apply(mk_policy(POLICY_NS, "b", [("b-1", "*"), ("b-0", "*")]));
    assert_eq!(test.rule_names(), vec!["z-0", "b-1", "b-0"]);
}

#[test]
fn ignores_policies_outside_policy_namespaces() {
    let test = TestConfig::default();
    test.apply(mk_policy("default", "rogue", [("anyone", "*")]));
    assert!(test.index.read().policy().is_empty());
}

#[test]
fn invalid_policy_update_removes_rules() {
    let test = TestConfig::default();
    test.apply(mk_policy(POLICY_NS, "signers", [("bob", "bob@co.com")]));
    assert_eq!(test.rule_names(), vec!["bob"]);

    test.apply(mk_policy(
        POLICY_NS,
        "signers",
        [("dup", "bob@co.com"), ("dup", "alice@co.com")],
    ));
    assert!(test.rule_names().is_empty());
}

#[test]
fn snapshots_are_not_modified_by_updates() {
    let test = TestConfig::default();
    test.apply(mk_policy(POLICY_NS, "signers", [("bob", "bob@co.com")]));
    let before = test.index.read().policy();

    test.apply(mk_policy(POLICY_NS, "signers", [("alice", "alice@co.com")]));
    assert_eq!(before.patterns()[0].rule.name, "bob");
    assert_eq!(test.rule_names(), vec!["alice"]);
}

#[test]
fn counts_rules_by_namespace() {
    let test = TestConfig::default();
    test.apply(mk_policy(POLICY_NS, "a", [("a-0", "*"), ("a-1", "*")]));
    test.apply(mk_policy(ENFORCER_NS, "b", [("b-0", "*")]));
    let index = test.index.read();
    let counts = index
        .rules_by_namespace()
        .into_iter()
        .map(|(ns, n)| (ns.to_string(), n))
        .collect::<std::collections::BTreeMap<_, _>>();
    assert_eq!(
        counts,
        btreemap! { ENFORCER_NS.to_string() => 1, POLICY_NS.to_string() => 2 }
    );
}

#[tokio::test(flavor = "current_thread")]
async fn finds_signature_by_target() {
    let test = TestConfig::default();
    test.apply(mk_rsig(
        "prod",
        "app-config-sig",
        vec![
            mk_item("ConfigMap", "app-config", None, "first"),
            mk_item("ConfigMap", "other-config", Some("staging"), "second"),
        ],
    ));

    let sig = test
        .lookup(&configmap("prod", "app-config"))
        .await
        .expect("signature must exist");
    assert_eq!(sig.message, "first");
    assert_eq!(sig.target, configmap("prod", "app-config"));

    let sig = test
        .lookup(&configmap("staging", "other-config"))
        .await
        .expect("signature must exist");
    assert_eq!(sig.message, "second");

    assert!(test.lookup(&configmap("prod", "other-config")).await.is_none());
    assert_eq!(
        test.index
            .read()
            .signatures_by_namespace()
            .into_iter()
            .map(|(ns, n)| (ns.to_string(), n))
            .collect::<std::collections::BTreeMap<_, _>>(),
        btreemap! { "prod".to_string() => 1, "staging".to_string() => 1 }
    );
}

#[tokio::test(flavor = "current_thread")]
async fn most_recent_signature_wins() {
    let test = TestConfig::default();
    test.apply(mk_rsig(
        "prod",
        "sig-a",
        vec![mk_item("ConfigMap", "app-config", None, "a")],
    ));
    test.apply(mk_rsig(
        "prod",
        "sig-b",
        vec![mk_item("ConfigMap", "app-config", None, "b")],
    ));
    let resource = configmap("prod", "app-config");
    assert_eq!(test.lookup(&resource).await.unwrap().message, "b");

    // Reapplying an object makes it the most recent.
    test.apply(mk_rsig(
        "prod",
        "sig-a",
        vec![mk_item("ConfigMap", "app-config", None, "a2")],
    ));
    assert_eq!(test.lookup(&resource).await.unwrap().message, "a2");

    test.delete::<k8s::ResourceSignature>("prod", "sig-a");
    assert_eq!(test.lookup(&resource).await.unwrap().message, "b");

    test.delete::<k8s::ResourceSignature>("prod", "sig-b");
    assert!(test.lookup(&resource).await.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn signature_api_version_must_match() {
    let test = TestConfig::default();
    test.apply(mk_rsig(
        "prod",
        "sig",
        vec![mk_item("ConfigMap", "app-config", None, "v1")],
    ));
    let mut resource = configmap("prod", "app-config");
    resource.api_version = "v2".to_string();
    assert!(test.lookup(&resource).await.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn resource_signature_requests_carry_their_own_signature() {
    let test = TestConfig::default();
    let rsig = mk_rsig(
        "sig-ns",
        "app-config-sig",
        vec![mk_item("ConfigMap", "app-config", Some("prod"), "embedded")],
    );

    let resource = ResourceRef {
        api_version: "policy.integrity.dev/v1alpha1".to_string(),
        kind: "ResourceSignature".to_string(),
        name: "app-config-sig".to_string(),
        namespace: "sig-ns".to_string(),
    };
    let mut ctx = mk_context(&resource);
    ctx.group = "policy.integrity.dev".to_string();
    ctx.version = "v1alpha1".to_string();
    ctx.raw_object = Bytes::from(serde_json::to_vec(&rsig).unwrap());

    let sig = SignatureLookup::new(test.index.clone())
        .lookup(&resource, &ctx)
        .await
        .expect("lookup must succeed")
        .expect("signature must exist");
    assert_eq!(sig.message, "embedded");
    assert_eq!(sig.target, configmap("prod", "app-config"));

    ctx.raw_object = Bytes::from_static(b"{not json");
    SignatureLookup::new(test.index.clone())
        .lookup(&resource, &ctx)
        .await
        .expect_err("an unparseable object must fail");
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_signature_update_removes_signatures() {
    let test = TestConfig::default();
    test.apply(mk_rsig(
        "prod",
        "sig",
        vec![mk_item("ConfigMap", "app-config", None, "ok")],
    ));
    test.apply(mk_rsig("prod", "sig", vec![]));
    assert!(test.lookup(&configmap("prod", "app-config")).await.is_none());
}
