use crate::{
    request::RequestContext,
    resource::ResourcePattern,
    subject::{SignerInfo, SubjectPattern},
};
use std::fmt;
use thiserror::Error;

/// A single signer rule, scoped to the resources it applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub name: String,
    pub resource: ResourcePattern,
    pub subject: SubjectPattern,
}

/// The outcome of checking one rule.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleMatch {
    /// The resource and the signer both match.
    pub matched: bool,

    /// The resource matches, regardless of the signer.
    pub resource_matched: bool,
}

/// An ordered list of rules. The first matching rule decides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleList {
    rules: Vec<Rule>,
}

/// The result of evaluating a [`RuleList`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalResult {
    pub signer: Option<SignerInfo>,

    /// The name of the matched rule, if any.
    pub signer_name: String,

    pub checked: bool,
    pub allow: bool,
    pub matched_rule: Option<Rule>,
    pub error: Option<RuleError>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("no signer policy matched this resource, signed by {email}")]
    NoMatch { email: String },
}

// === impl Rule ===

impl Rule {
    pub fn matches_resource(&self, ctx: &RequestContext) -> bool {
        self.resource.matches(
            &ctx.group_version(),
            &ctx.kind,
            &ctx.name,
            &ctx.namespace,
        )
    }

    pub fn evaluate(&self, ctx: &RequestContext, signer: Option<&SignerInfo>) -> RuleMatch {
        let resource_matched = self.matches_resource(ctx);
        RuleMatch {
            matched: resource_matched && self.subject.matches(signer),
            resource_matched,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (resource: {}; subject: {})",
            self.name, self.resource, self.subject
        )
    }
}

// === impl RuleList ===

impl RuleList {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Evaluates the rules in order against a resource and its signer.
    ///
    /// An empty list allows every request: no policy covers this resource.
    /// Otherwise the first rule that matches both the resource and the signer
    /// decides. If none does, the request is denied.
    pub fn evaluate(&self, ctx: &RequestContext, signer: Option<&SignerInfo>) -> EvalResult {
        if self.rules.is_empty() {
            return EvalResult {
                signer: signer.cloned(),
                checked: true,
                allow: true,
                ..Default::default()
            };
        }

        let email = || signer.map(|s| s.email.clone()).unwrap_or_default();

        for rule in &self.rules {
            if !rule.evaluate(ctx, signer).matched {
                continue;
            }

            return EvalResult {
                signer: signer.cloned(),
                signer_name: rule.name.clone(),
                checked: true,
                allow: true,
                matched_rule: Some(rule.clone()),
                error: None,
            };
        }

        EvalResult {
            signer: signer.cloned(),
            checked: true,
            allow: false,
            error: Some(RuleError::NoMatch { email: email() }),
            ..Default::default()
        }
    }
}

impl FromIterator<Rule> for RuleList {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
