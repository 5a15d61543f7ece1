use crate::{
    core::{
        self, EnforcerConfig, Evaluator, RequestContext, ResourceScope, SignPolicyEvalResult,
        Verifiers,
    },
    index::{SharedIndex, SignatureLookup},
    metrics::AdmissionMetrics,
    mode::Mode,
};
use anyhow::{bail, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};


/// Serves admission reviews, evaluating each request against the current signing policy.
#[derive(Clone)]
pub struct Admission {
    config: Arc<EnforcerConfig>,
    mode: Mode,
    index: SharedIndex,
    verifiers: Verifiers,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    admission.metrics.invalid();
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    admission.metrics.invalid();
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(
        config: Arc<EnforcerConfig>,
        mode: Mode,
        index: SharedIndex,
        verifiers: Verifiers,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            config,
            mode,
            index,
            verifiers,
            metrics,
        }
    }

    /// Builds an evaluator over the policy snapshot that is current when the request arrives.
    fn evaluator(&self) -> Evaluator {
        let policy = self.index.read().policy();
        Evaluator::new(
            self.config.clone(),
            policy,
            Arc::new(SignatureLookup::new(self.index.clone())),
            self.verifiers.clone(),
        )
    }

    async fn admit(&self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);

        let ctx = match request_context(&req) {
            Ok(ctx) => ctx,
            Err(error) => {
                info!(%error, "Unsupported admission request");
                self.metrics.invalid();
                return AdmissionResponse::invalid(error);
            }
        };

        let result = match self.evaluator().evaluate(&ctx).await {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, kind = %ctx.kind, ns = %ctx.namespace, name = %ctx.name, "Failed to evaluate request");
                self.metrics.invalid();
                return AdmissionResponse::invalid(error);
            }
        };
        self.metrics.decision(self.mode, &result);

        decide(self.mode, rsp, &ctx, result)
    }
}

fn decide(
    mode: Mode,
    rsp: AdmissionResponse,
    ctx: &RequestContext,
    result: SignPolicyEvalResult,
) -> AdmissionResponse {
    let RequestContext {
        kind,
        namespace: ns,
        name,
        operation,
        user_name: user,
        ..
    } = ctx;

    if result.allow {
        info!(
            %kind, %ns, %name, %operation, %user,
            signer = result.signer.as_ref().map(|s| s.display_name()).unwrap_or_default(),
            rule = %result.signer_name,
            policy = %result.matched_policy,
            "Allowed"
        );
        return rsp;
    }

    let reason = result
        .reason()
        .unwrap_or_else(|| "denied by signing policy".to_string());
    match mode {
        Mode::Enforce => {
            info!(%kind, %ns, %name, %operation, %user, %reason, "Denied");
            rsp.deny(reason)
        }
        Mode::Detect => {
            info!(%kind, %ns, %name, %operation, %user, %reason, "Denial not enforced");
            rsp
        }
    }
}

fn request_context(req: &AdmissionRequest) -> Result<RequestContext> {
    let operation = match req.operation {
        Operation::Create => core::Operation::Create,
        Operation::Update => core::Operation::Update,
        Operation::Delete => core::Operation::Delete,
        Operation::Connect => bail!("unsupported operation: CONNECT"),
    };

    // Deletions carry the stored object rather than a submitted one.
    let raw_object = match req.object.as_ref().or(req.old_object.as_ref()) {
        Some(obj) => serde_json::to_vec(obj)?.into(),
        None => bytes::Bytes::new(),
    };

    let namespace = req.namespace.clone().unwrap_or_default();
    Ok(RequestContext {
        group: req.kind.group.clone(),
        version: req.kind.version.clone(),
        kind: req.kind.kind.clone(),
        name: req.name.clone(),
        scope: ResourceScope::from_namespace(&namespace),
        namespace,
        operation,
        raw_object,
        user_name: req.user_info.username.clone().unwrap_or_default(),
        user_groups: req.user_info.groups.clone().unwrap_or_default(),
        dry_run: req.dry_run,
    })
}

fn json_response(rsp: Review) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
