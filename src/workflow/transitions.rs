//! The stage state machine. Planning is pure: given the current record and
//! the actor it either describes the next version or rejects the request.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::{normalize_name, owner_of, rename_for_stage, submission_filename};
use crate::db::{Actor, AuditAction, AuditEntry, ReviewState, Role, Stage, Submission};
use crate::error::{WorkflowError, WorkflowResult};
use crate::storage::Upload;
use crate::store::Supersede;

const SEND_BACK_PROMPT: &str = "CAUTION: This will send the submission back to the student. \
This action cannot be undone. Are you sure you want to continue?";

#[derive(Debug, Clone)]
pub enum Transition {
    /// A student hands in a new document or resubmits a returned one.
    Submit(Upload),
    Approve,
    ReturnToFinalReview,
    ReturnToLibrarian,
    SendBackToStudent,
    ReplaceFile(Upload),
}

/// Transitions that carry no file, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Approve,
    ReturnToFinalReview,
    ReturnToLibrarian,
    SendBack,
}

impl From<Action> for Transition {
    fn from(action: Action) -> Self {
        match action {
            Action::Approve => Transition::Approve,
            Action::ReturnToFinalReview => Transition::ReturnToFinalReview,
            Action::ReturnToLibrarian => Transition::ReturnToLibrarian,
            Action::SendBack => Transition::SendBackToStudent,
        }
    }
}

impl Transition {
    pub fn verb(&self) -> &'static str {
        match self {
            Transition::Submit(_) => "submit a document",
            Transition::Approve => "send a submission to the reviewer",
            Transition::ReturnToFinalReview => "send a returned document back to final review",
            Transition::ReturnToLibrarian => "return a submission to the librarian",
            Transition::SendBackToStudent => "send a submission back to the student",
            Transition::ReplaceFile(_) => "replace a submission's file",
        }
    }

    fn permits(&self, role: Role) -> bool {
        match self {
            Transition::Submit(_) => role == Role::Student,
            Transition::Approve | Transition::ReturnToFinalReview => role == Role::Librarian,
            Transition::ReturnToLibrarian => role == Role::Reviewer,
            Transition::SendBackToStudent | Transition::ReplaceFile(_) => {
                matches!(role, Role::Librarian | Role::Reviewer)
            }
        }
    }

    /// Prompt the actor must accept first. Sending back is always gated; the
    /// other hand-offs only when the actor asked for confirmations.
    pub fn confirmation_prompt(&self, confirm_actions: bool) -> Option<&'static str> {
        match self {
            Transition::SendBackToStudent => Some(SEND_BACK_PROMPT),
            Transition::Approve if confirm_actions => Some("Send to reviewer?"),
            Transition::ReturnToFinalReview if confirm_actions => {
                Some("Send returned document back to final review?")
            }
            Transition::ReturnToLibrarian if confirm_actions => Some("Return to librarian?"),
            _ => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Submit(_) => "submit",
            Transition::Approve => "approve",
            Transition::ReturnToFinalReview => "return-to-final-review",
            Transition::ReturnToLibrarian => "return-to-librarian",
            Transition::SendBackToStudent => "send-back",
            Transition::ReplaceFile(_) => "replace-file",
        };
        f.write_str(name)
    }
}

/// Notification owed to another actor once the plan is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub target_user: String,
    pub filename: String,
    pub target_stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub record: Submission,
    pub supersede: Supersede,
    pub notification: Option<NotificationDraft>,
    pub audit: AuditEntry,
}

/// Describes the next version, or the reason there is none.
///
/// `current` is the selected record (for `Submit`, the student's current
/// record if one exists). `version` becomes the new record's `time`.
pub fn plan(
    transition: Transition,
    current: Option<&Submission>,
    actor: &Actor,
    version: i64,
    max_upload_mb: u64,
) -> WorkflowResult<Plan> {
    if !transition.permits(actor.role) {
        return Err(WorkflowError::Forbidden {
            role: actor.role,
            action: transition.verb(),
        });
    }

    if let Transition::Submit(upload) = transition {
        return plan_submit(upload, current, actor, version, max_upload_mb);
    }

    let current = current.ok_or(WorkflowError::SelectionRequired)?;
    let state = current.state();
    let verb = transition.verb();
    let reject = |state: ReviewState| WorkflowError::InvalidTransition {
        action: verb,
        state,
    };

    let mut next = current.clone();
    next.time = version;
    let mut supersede = Supersede::version(current.filename.clone());
    let mut notification = None;
    let (action, notes) = match transition {
        Transition::Approve => {
            if !matches!(state, ReviewState::Submitted | ReviewState::Approved) {
                return Err(reject(state));
            }
            next.stage = Stage::Stage2;
            next.routing.sent_to_reviewer = true;
            next.routing.sent_by = Some(actor.name.clone());
            next.routing.returned_from_review = false;
            supersede = supersede.with_stages(&[Stage::Stage1, Stage::Stage2]);
            (AuditAction::Approved, "Sent to reviewer".to_string())
        }
        Transition::ReturnToFinalReview => {
            if !matches!(state, ReviewState::ReturnedFromReview { .. }) {
                return Err(reject(state));
            }
            next.stage = Stage::Stage2;
            next.routing.returned_from_review = false;
            next.routing.sent_to_reviewer = true;
            next.routing.sent_by = Some(actor.name.clone());
            supersede = supersede.with_stages(&[Stage::Stage2]);
            (
                AuditAction::ReturnedToFinalReview,
                "Sent back to final review".to_string(),
            )
        }
        Transition::ReturnToLibrarian => {
            let sent_by = match state {
                ReviewState::InFinalReview { sent_by } => sent_by,
                other => return Err(reject(other)),
            };
            next.routing.returned_from_review = true;
            supersede = supersede.with_stages(&[Stage::Stage2]);
            if let Some(librarian) = sent_by {
                notification = Some(NotificationDraft {
                    target_user: librarian,
                    filename: current.filename.clone(),
                    target_stage: Stage::Stage2,
                    message: format!("{} has been returned from final review.", current.filename),
                });
            }
            (
                AuditAction::ReturnedToLibrarian,
                "Returned from final review".to_string(),
            )
        }
        Transition::SendBackToStudent => {
            if matches!(state, ReviewState::Draft { .. }) {
                return Err(reject(state));
            }
            let owner = owner_of(current);
            next.stage = Stage::Stage0;
            next.routing.sent_back_to_student = true;
            next.routing.sent_back_by = Some(actor.name.clone());
            next.routing.sent_to_reviewer = false;
            next.routing.returned_from_review = false;
            supersede = supersede.with_stages(&[Stage::Stage0]);
            notification = Some(NotificationDraft {
                target_user: owner.clone(),
                filename: current.filename.clone(),
                target_stage: Stage::Stage0,
                message: format!("{} has been sent back to you for review.", current.filename),
            });
            (AuditAction::SentBack, format!("Sent back to student: {}", owner))
        }
        Transition::ReplaceFile(upload) => {
            upload.check(max_upload_mb)?;
            next.payload = Some(upload.bytes.into());
            next.content = None;
            (
                AuditAction::FileReplaced,
                format!("Replaced with {}", upload.name),
            )
        }
        Transition::Submit(_) => unreachable!("handled above"),
    };
    next.filename = rename_for_stage(&current.filename, next.stage);

    Ok(Plan {
        audit: AuditEntry {
            time: version,
            user: actor.name.clone(),
            action,
            stage: Some(next.stage),
            filename: next.filename.clone(),
            notes,
        },
        record: next,
        supersede,
        notification,
    })
}

fn plan_submit(
    upload: Upload,
    current: Option<&Submission>,
    actor: &Actor,
    version: i64,
    max_upload_mb: u64,
) -> WorkflowResult<Plan> {
    upload.check(max_upload_mb)?;

    let mut next = match current {
        Some(existing) => {
            let state = existing.state();
            if !matches!(state, ReviewState::Draft { .. }) {
                return Err(WorkflowError::InvalidTransition {
                    action: "submit a document",
                    state,
                });
            }
            let mut next = existing.clone();
            next.filename = rename_for_stage(&existing.filename, Stage::Stage1);
            next
        }
        None => {
            let owner = normalize_name(&actor.name);
            Submission::new(submission_filename(&owner, Stage::Stage1), Stage::Stage1, version)
                .with_owner(owner)
        }
    };
    next.stage = Stage::Stage1;
    next.time = version;
    next.payload = Some(upload.bytes.into());
    next.content = None;

    let mut supersede = Supersede::default().with_stages(&[Stage::Stage0, Stage::Stage1]);
    supersede.replaced = current.map(|c| c.filename.clone());

    Ok(Plan {
        audit: AuditEntry {
            time: version,
            user: actor.name.clone(),
            action: AuditAction::Submitted,
            stage: Some(Stage::Stage1),
            filename: next.filename.clone(),
            notes: format!("Uploaded {}", upload.name),
        },
        record: next,
        supersede,
        notification: None,
    })
}
