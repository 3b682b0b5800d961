//! Signature records
//!
//! Two signatures close an inspection: the operator signs first, then the
//! counterparty. Stroke data arrives base64-encoded from the capture UI
//! and is stored verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRole {
    Operator,
    Counterparty,
}

impl SignerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerRole::Operator => "operator",
            SignerRole::Counterparty => "counterparty",
        }
    }
}

impl std::fmt::Display for SignerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub role: SignerRole,
    /// Base64-encoded signature image/stroke data
    pub data: String,
    pub signed_at: DateTime<Utc>,
}

impl Signature {
    pub fn new(role: SignerRole, data: String) -> Self {
        Self {
            role,
            data,
            signed_at: Utc::now(),
        }
    }
}
