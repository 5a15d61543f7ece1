use crate::pattern;
use integrity_policy_controller_k8s_api::policy::SubjectMatchPattern;
use std::fmt;

/// The identity of a verified signer.
///
/// Attributes absent from the signer's certificate are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SignerInfo {
    pub email: String,
    pub uid: String,
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: String,
    pub province: String,
    pub street_address: String,
    pub postal_code: String,
    pub common_name: String,
    pub serial_number: String,
}

/// Constrains signer attributes. Each field is a glob pattern; empty fields
/// are unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubjectPattern {
    pub email: String,
    pub uid: String,
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: String,
    pub province: String,
    pub street_address: String,
    pub postal_code: String,
    pub common_name: String,
    pub serial_number: String,
}

/// Checks a signer against a subject pattern.
///
/// An unverified (absent) signer never matches, not even an unconstrained
/// pattern. Otherwise every attribute must match its pattern.
pub fn match_subject(pattern: &SubjectPattern, signer: Option<&SignerInfo>) -> bool {
    let Some(signer) = signer else {
        return false;
    };

    pattern::is_match(&pattern.email, &signer.email)
        && pattern::is_match(&pattern.uid, &signer.uid)
        && pattern::is_match(&pattern.country, &signer.country)
        && pattern::is_match(&pattern.organization, &signer.organization)
        && pattern::is_match(&pattern.organizational_unit, &signer.organizational_unit)
        && pattern::is_match(&pattern.locality, &signer.locality)
        && pattern::is_match(&pattern.province, &signer.province)
        && pattern::is_match(&pattern.street_address, &signer.street_address)
        && pattern::is_match(&pattern.postal_code, &signer.postal_code)
        && pattern::is_match(&pattern.common_name, &signer.common_name)
        && pattern::is_match(&pattern.serial_number, &signer.serial_number)
}

// === impl SignerInfo ===

impl SignerInfo {
    /// A short label for logs: the common name, falling back to the email.
    pub fn display_name(&self) -> &str {
        if self.common_name.is_empty() {
            &self.email
        } else {
            &self.common_name
        }
    }
}

impl fmt::Display for SignerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.common_name.is_empty(), self.email.is_empty()) {
            (false, false) => write!(f, "{} <{}>", self.common_name, self.email),
            (false, true) => self.common_name.fmt(f),
            (true, _) => self.email.fmt(f),
        }
    }
}

// === impl SubjectPattern ===

impl SubjectPattern {
    pub fn matches(&self, signer: Option<&SignerInfo>) -> bool {
        match_subject(self, signer)
    }
}

impl From<SubjectMatchPattern> for SubjectPattern {
    fn from(s: SubjectMatchPattern) -> Self {
        Self {
            email: s.email,
            uid: s.uid,
            country: s.country,
            organization: s.organization,
            organizational_unit: s.organizational_unit,
            locality: s.locality,
            province: s.province,
            street_address: s.street_address,
            postal_code: s.postal_code,
            common_name: s.common_name,
            serial_number: s.serial_number,
        }
    }
}

impl From<&SubjectPattern> for SubjectMatchPattern {
    fn from(s: &SubjectPattern) -> Self {
        Self {
            email: s.email.clone(),
            uid: s.uid.clone(),
            country: s.country.clone(),
            organization: s.organization.clone(),
            organizational_unit: s.organizational_unit.clone(),
            locality: s.locality.clone(),
            province: s.province.clone(),
            street_address: s.street_address.clone(),
            postal_code: s.postal_code.clone(),
            common_name: s.common_name.clone(),
            serial_number: s.serial_number.clone(),
        }
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SubjectMatchPattern::from(self).fmt(f)
    }
}
