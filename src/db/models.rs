use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Workflow phase encoded in the `_Stage<N>.pdf` filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Draft, or sent back to the student.
    Stage0,
    /// Submitted, waiting for the librarian.
    Stage1,
    /// With the final reviewer, or returned from them.
    Stage2,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Stage0, Stage::Stage1, Stage::Stage2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Stage0 => "Stage0",
            Stage::Stage1 => "Stage1",
            Stage::Stage2 => "Stage2",
        }
    }

    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Stage::Stage0),
            1 => Some(Stage::Stage1),
            2 => Some(Stage::Stage2),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        lower
            .strip_prefix("stage")
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(Stage::from_number)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// How a record reached its current stage. Only the projector and the
/// derived [`ReviewState`] read these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    #[serde(default)]
    pub sent_to_reviewer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_by: Option<String>,
    #[serde(default)]
    pub returned_from_review: bool,
    #[serde(default)]
    pub sent_back_to_student: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_back_by: Option<String>,
}

/// One physical version of a logical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub filename: String,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub stage: Stage,
    #[serde(default)]
    pub time: i64,
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Base64 transport form of the payload, only present in persisted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip)]
    pub payload: Option<Arc<[u8]>>,
    #[serde(flatten)]
    pub routing: Routing,
    /// Fields written by other collaborators, carried through rewrites.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Submission {
    pub fn new(filename: impl Into<String>, stage: Stage, time: i64) -> Self {
        Self {
            filename: filename.into(),
            owner: None,
            stage,
            time,
            deadline: None,
            notes: None,
            status: None,
            content: None,
            payload: None,
            routing: Routing::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_payload(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.payload = Some(bytes.into());
        self.content = None;
        self
    }

    pub fn state(&self) -> ReviewState {
        ReviewState::of(self)
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map(|p| p.len()).unwrap_or(0)
    }
}

/// Explicit review state derived from `stage` plus routing flags. Every flag
/// combination lands on exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewState {
    Draft { sent_back_by: Option<String> },
    Submitted,
    Approved,
    InFinalReview { sent_by: Option<String> },
    ReturnedFromReview { sent_by: Option<String> },
}

impl ReviewState {
    pub fn of(record: &Submission) -> Self {
        let routing = &record.routing;
        match record.stage {
            Stage::Stage0 => ReviewState::Draft {
                sent_back_by: if routing.sent_back_to_student {
                    routing.sent_back_by.clone()
                } else {
                    None
                },
            },
            Stage::Stage1 => ReviewState::Submitted,
            Stage::Stage2 if routing.returned_from_review => ReviewState::ReturnedFromReview {
                sent_by: routing.sent_by.clone(),
            },
            Stage::Stage2 if routing.sent_to_reviewer => ReviewState::InFinalReview {
                sent_by: routing.sent_by.clone(),
            },
            Stage::Stage2 => ReviewState::Approved,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewState::Draft { .. } => "draft",
            ReviewState::Submitted => "submitted",
            ReviewState::Approved => "approved",
            ReviewState::InFinalReview { .. } => "in_final_review",
            ReviewState::ReturnedFromReview { .. } => "returned_from_review",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Librarian,
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Librarian => "librarian",
            Role::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "librarian" => Ok(Role::Librarian),
            "reviewer" => Ok(Role::Reviewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A role-scoped session interacting with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub filename: String,
    pub target_user: String,
    pub target_stage: Stage,
    pub time: i64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submitted,
    Approved,
    ReturnedToFinalReview,
    ReturnedToLibrarian,
    SentBack,
    FileReplaced,
    DeadlineChanged,
    NotesChanged,
    HistoryCleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub time: i64,
    pub user: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub filename: String,
    #[serde(default)]
    pub notes: String,
}

/// Empty or malformed dates read as `None` instead of failing the record.
pub fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        // Accept full timestamps as well as bare dates.
        NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_parses_case_insensitively() {
        assert_eq!("stage2".parse::<Stage>().unwrap(), Stage::Stage2);
        assert_eq!("Stage0".parse::<Stage>().unwrap(), Stage::Stage0);
        assert!("Stage3".parse::<Stage>().is_err());
    }

    #[test]
    fn persisted_record_keeps_unknown_fields() {
        let raw = r#"{
            "filename": "alice_lee_Stage1.pdf",
            "user": "alice_lee",
            "stage": "Stage1",
            "time": 42,
            "deadline": "",
            "first": "Alice",
            "sentBy": "marian"
        }"#;
        let record: Submission = serde_json::from_str(raw).unwrap();
        assert_eq!(record.owner.as_deref(), Some("alice_lee"));
        assert_eq!(record.deadline, None);
        assert_eq!(record.routing.sent_by.as_deref(), Some("marian"));
        assert_eq!(record.extra.get("first"), Some(&Value::from("Alice")));
        assert!(!record.extra.contains_key("sentBy"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["first"], "Alice");
        assert_eq!(back["sentToReviewer"], false);
    }

    #[test]
    fn review_state_prefers_returned_over_sent() {
        let mut record = Submission::new("a_b_Stage2.pdf", Stage::Stage2, 1);
        assert_eq!(record.state(), ReviewState::Approved);

        record.routing.sent_to_reviewer = true;
        record.routing.sent_by = Some("lib".into());
        assert_eq!(
            record.state(),
            ReviewState::InFinalReview {
                sent_by: Some("lib".into())
            }
        );

        record.routing.returned_from_review = true;
        assert!(matches!(record.state(), ReviewState::ReturnedFromReview { .. }));
    }

    #[test]
    fn draft_only_reports_sender_when_sent_back() {
        let mut record = Submission::new("a_b_Stage0.pdf", Stage::Stage0, 1);
        record.routing.sent_back_by = Some("lib".into());
        assert_eq!(record.state(), ReviewState::Draft { sent_back_by: None });

        record.routing.sent_back_to_student = true;
        assert_eq!(
            record.state(),
            ReviewState::Draft {
                sent_back_by: Some("lib".into())
            }
        );
    }
}
