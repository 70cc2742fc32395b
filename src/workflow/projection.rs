//! Per-actor, per-tab views over the deduplicated store.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::identity::owner_of;
use crate::db::{lenient_date, ReviewState, Submission};
use crate::store::current_view;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tab {
    #[serde(rename = "to-review")]
    ToReview,
    #[serde(rename = "returned")]
    Returned,
    /// What the actor has sent on to final review.
    #[serde(rename = "sent")]
    History,
    #[serde(rename = "sent-back")]
    ReturnedToStudent,
}

impl Tab {
    pub const ALL: [Tab; 4] = [
        Tab::ToReview,
        Tab::Returned,
        Tab::History,
        Tab::ReturnedToStudent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::ToReview => "to-review",
            Tab::Returned => "returned",
            Tab::History => "sent",
            Tab::ReturnedToStudent => "sent-back",
        }
    }

    /// Records shown under this tab cannot be acted on from it.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Tab::History)
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tab: {}", s))
    }
}

/// The single tab a record belongs to for `actor`, if any.
pub fn classify(record: &Submission, actor: &str) -> Option<Tab> {
    let sent_by_actor = record.routing.sent_by.as_deref() == Some(actor);
    match record.state() {
        ReviewState::Submitted | ReviewState::Approved => Some(Tab::ToReview),
        ReviewState::ReturnedFromReview { .. } => Some(Tab::Returned),
        ReviewState::Draft {
            sent_back_by: Some(by),
        } if by == actor => Some(Tab::ReturnedToStudent),
        ReviewState::Draft { .. } | ReviewState::InFinalReview { .. } if sent_by_actor => {
            Some(Tab::History)
        }
        _ => None,
    }
}

/// Records the actor has fully handed to final review; the only thing a
/// history clear may remove.
pub fn is_resolved_history(record: &Submission, actor: &str) -> bool {
    matches!(
        record.state(),
        ReviewState::InFinalReview { sent_by: Some(ref by) } if by == actor
    )
}

/// Free-text and date filters, saved per actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_from: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_to: Option<NaiveDate>,
}

impl ViewFilter {
    pub fn is_empty(&self) -> bool {
        non_blank(&self.user).is_none()
            && non_blank(&self.status).is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    pub fn matches(&self, record: &Submission) -> bool {
        if let Some(needle) = non_blank(&self.user) {
            let owner = owner_of(record).to_lowercase();
            if !owner.contains(&needle) && !record.filename.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(needle) = non_blank(&self.status) {
            let status = record
                .status
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(record.stage.as_str())
                .to_lowercase();
            if !status.contains(&needle) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if record.time < day_start_millis(from) {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if record.time >= day_start_millis(to + Duration::days(1)) {
                return false;
            }
        }
        true
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn day_start_millis(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(i64::MIN)
}

/// Deduplicate, keep one tab, then filter. Order follows the deduplicated
/// store; no sort is applied.
pub fn project(
    records: &[Submission],
    actor: &str,
    tab: Tab,
    filter: &ViewFilter,
) -> Vec<Submission> {
    current_view(records)
        .into_iter()
        .filter(|r| classify(r, actor) == Some(tab))
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

/// Badge counts: the same projection with filters left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCounts {
    pub to_review: usize,
    pub returned: usize,
    pub sent: usize,
    pub sent_back: usize,
}

pub fn tab_counts(records: &[Submission], actor: &str) -> TabCounts {
    let unfiltered = ViewFilter::default();
    let count = |tab| project(records, actor, tab, &unfiltered).len();
    TabCounts {
        to_review: count(Tab::ToReview),
        returned: count(Tab::Returned),
        sent: count(Tab::History),
        sent_back: count(Tab::ReturnedToStudent),
    }
}
