//! Photo capture steps and damage verdicts
//!
//! A step is "complete" iff it carries a remote URL. AI description and
//! damage verdict are independent of completion: analysis may degrade to
//! a sentinel while the photo itself is safely uploaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel description stored when both analysis capabilities are
/// unavailable. The step stays complete; the operator writes a
/// description manually.
pub const ANALYSIS_UNAVAILABLE_SENTINEL: &str =
    "Automatic analysis unavailable. Add a description manually.";

/// Fixed set of photograph slots in the capture sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Front,
    Back,
    Left,
    Right,
    Interior,
    OdometerPanel,
}

impl StepKind {
    /// Wire name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Front => "front",
            StepKind::Back => "back",
            StepKind::Left => "left",
            StepKind::Right => "right",
            StepKind::Interior => "interior",
            StepKind::OdometerPanel => "odometer_panel",
        }
    }

    /// Human label handed to the analysis capabilities as context
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Front => "front of the vehicle",
            StepKind::Back => "rear of the vehicle",
            StepKind::Left => "left side of the vehicle",
            StepKind::Right => "right side of the vehicle",
            StepKind::Interior => "vehicle interior",
            StepKind::OdometerPanel => "odometer and dashboard panel",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(StepKind::Front),
            "back" => Ok(StepKind::Back),
            "left" => Ok(StepKind::Left),
            "right" => Ok(StepKind::Right),
            "interior" => Ok(StepKind::Interior),
            "odometer_panel" => Ok(StepKind::OdometerPanel),
            other => Err(format!("unknown step kind: {}", other)),
        }
    }
}

/// Damage severity reported by the detection capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

/// Structured damage-detection result for one photo
///
/// Immutable once produced; a retake discards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageVerdict {
    /// Whether visible damage was detected
    pub has_damage: bool,
    /// Severity when damage is present
    pub severity: Option<Severity>,
    /// Free-text description of the finding
    pub description: String,
    /// Where on the vehicle the damage sits, if localized
    pub location: Option<String>,
    /// Suggested follow-up actions
    pub suggestions: Vec<String>,
}

/// One photograph slot in the capture sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoStep {
    /// Slot identity within the catalogue
    pub kind: StepKind,

    /// Required steps gate the signature phase; optional steps may stay empty
    pub required: bool,

    /// Rotated on every capture; async upload/analysis results carrying a
    /// stale token are discarded (last-capture-wins)
    pub capture_token: Option<Uuid>,

    /// Local asset reference, shown immediately on capture
    pub local_asset: Option<String>,

    /// Remote URL; non-null iff the step is complete
    pub remote_url: Option<String>,

    /// AI-generated (or operator-edited) description
    pub ai_description: Option<String>,

    /// Operator approval of the description; independent of completion
    pub description_approved: bool,

    /// Damage-detection verdict for the current capture
    pub verdict: Option<DamageVerdict>,

    /// When the current capture was taken
    pub captured_at: Option<DateTime<Utc>>,
}

impl PhotoStep {
    pub fn new(kind: StepKind, required: bool) -> Self {
        Self {
            kind,
            required,
            capture_token: None,
            local_asset: None,
            remote_url: None,
            ai_description: None,
            description_approved: false,
            verdict: None,
            captured_at: None,
        }
    }

    /// Completion is solely a function of having a remote URL
    pub fn is_complete(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Record a fresh local capture: rotates the capture token, shows the
    /// local asset, and clears every artifact of the previous capture.
    ///
    /// Returns the new token for the background upload to carry.
    pub fn begin_capture(&mut self, local_asset: String) -> Uuid {
        let token = Uuid::new_v4();
        self.capture_token = Some(token);
        self.local_asset = Some(local_asset);
        self.remote_url = None;
        self.ai_description = None;
        self.description_approved = false;
        self.verdict = None;
        self.captured_at = Some(Utc::now());
        token
    }

    /// Whether an async result for `token` still applies to this step
    pub fn token_is_current(&self, token: Uuid) -> bool {
        self.capture_token == Some(token)
    }

    /// Roll back a terminally failed upload: the local asset is cleared
    /// and the operator must recapture. Keeps the token so a late
    /// duplicate of the same failure cannot re-clear a newer capture.
    pub fn rollback_capture(&mut self) {
        self.local_asset = None;
        self.remote_url = None;
        self.ai_description = None;
        self.description_approved = false;
        self.verdict = None;
    }

    /// Retake: return the step to incomplete, discarding URL, description,
    /// verdict, and approval. Rotating the token to None invalidates any
    /// in-flight upload or analysis for the prior capture.
    pub fn reset(&mut self) {
        self.capture_token = None;
        self.local_asset = None;
        self.remote_url = None;
        self.ai_description = None;
        self.description_approved = false;
        self.verdict = None;
        self.captured_at = None;
    }
}

/// Build the ordered step catalogue for an inspection kind
///
/// The catalogue is data, not code: four required walkaround shots plus
/// two optional ones. Departure and arrival currently share the same
/// catalogue; they are listed separately so they can diverge without
/// touching the sequencer.
pub fn catalogue_for(kind: super::session::InspectionKind) -> Vec<PhotoStep> {
    use super::session::InspectionKind;

    let entries: &[(StepKind, bool)] = match kind {
        InspectionKind::Departure | InspectionKind::Arrival => &[
            (StepKind::Front, true),
            (StepKind::Back, true),
            (StepKind::Left, true),
            (StepKind::Right, true),
            (StepKind::Interior, false),
            (StepKind::OdometerPanel, false),
        ],
    };

    entries
        .iter()
        .map(|(kind, required)| PhotoStep::new(*kind, *required))
        .collect()
}
