//! Request fingerprints used as cache keys.
//!
//! Identifying fields are normalized (trimmed, lowercased, inner whitespace
//! collapsed) so that semantically identical requests collide. Each field is
//! written in its escaped, quoted form, which keeps the key unambiguous
//! whatever characters the fields contain.

use std::fmt;
use std::ops::Deref;

use crate::engine::types::RiskRequest;

/// Deterministic cache key for a logically-equivalent request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Key for a point-in-time risk assessment.
    pub fn for_assessment(request: &RiskRequest) -> Self {
        Self(format!("assess:{}", identity(request)))
    }

    /// Key for a forecast over `horizon_months`.
    pub fn for_prediction(request: &RiskRequest, horizon_months: u32) -> Self {
        Self(format!("predict:{}|{}", identity(request), horizon_months))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Fingerprint {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn identity(request: &RiskRequest) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}",
        normalize(&request.business_name),
        normalize(&request.address),
        normalize(&request.industry),
        normalize(&request.country),
    )
}

fn normalize(field: &str) -> String {
    field
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
