use crate::{
    admission::Admission,
    core::{EnforcerConfig, Verifiers},
    index,
    k8s::{self, Resource},
    metrics::AdmissionMetrics,
    mode::Mode,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::{runtime::watcher, Client};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "integrity-policy",
    about = "Admits signed resources according to signing policy"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "integrity=info,warn",
        env = "INTEGRITY_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Whether policy denials are enforced (`enforce`) or only logged and counted (`detect`).
    #[clap(long, default_value = "enforce")]
    mode: Mode,

    /// The namespace the enforcer is deployed in.
    #[clap(long, default_value = "integrity-enforcer")]
    enforcer_namespace: String,

    /// The namespace dedicated to signing policies.
    #[clap(long, default_value = "integrity-enforcer-policy")]
    policy_namespace: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run(Verifiers::default()).await
    }

    /// Runs the controller, verifying signatures with `verifiers`.
    pub async fn run(self, verifiers: Verifiers) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            mode,
            enforcer_namespace,
            policy_namespace,
        } = self;

        let config = Arc::new(EnforcerConfig {
            enforcer_namespace,
            policy_namespace,
        });
        let index = index::Index::shared(config.clone());

        let mut prom = <Registry>::default();
        index::metrics::register(prom.sub_registry_with_prefix("index"), index.clone());
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        if verifiers.is_empty() {
            warn!("No signature verifiers are registered; every signed request will be denied");
        } else {
            info!(types = ?verifiers.types().collect::<Vec<_>>(), "Registered signature verifiers");
        }

        // Spawn resource watches.

        if api_resource_exists::<k8s::SignPolicy>(&runtime.client()).await {
            let policies = runtime.watch_all::<k8s::SignPolicy>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), policies)
                    .instrument(info_span!("signpolicies")),
            );
        } else {
            warn!("signpolicies.policy.integrity.dev resource kind not found, skipping watches");
        }

        if api_resource_exists::<k8s::ResourceSignature>(&runtime.client()).await {
            let signatures =
                runtime.watch_all::<k8s::ResourceSignature>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), signatures)
                    .instrument(info_span!("resourcesignatures")),
            );
        } else {
            warn!(
                "resourcesignatures.policy.integrity.dev resource kind not found, skipping watches"
            );
        }

        if mode == Mode::Detect {
            warn!("Running in detect mode; policy denials are logged but not enforced");
        }

        let admission = Admission::new(config, mode, index, verifiers, admission_metrics);
        let runtime = runtime.spawn_server(admission);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
